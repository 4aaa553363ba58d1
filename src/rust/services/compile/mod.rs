//! Source-to-module compilation through interchangeable backends.
//!
//! Every backend answers with the same [`CompileResult`]; transport,
//! timeout and protocol problems become failures too, so callers never
//! see an `Err` from [`Dispatcher::compile`].

pub mod backends;
pub mod diagnostics;
pub mod dispatcher;
pub mod worker;

#[cfg(test)]
pub(crate) mod test_support;

pub use backends::{BackendKind, CompileBackend, CompileMode};
pub use dispatcher::{Dispatcher, DispatcherConfig};
pub use worker::{CompileWorker, CompilerClient, WorkerStatus};

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::engine::runtime::CompiledModule;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CompileOptions {
    pub optimization_level: u8,
    pub sdl_enabled: bool,
    pub exported_functions: Vec<String>,
    pub additional_flags: Vec<String>,
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self {
            optimization_level: 2,
            sdl_enabled: false,
            exported_functions: vec!["hear_c_init".to_string(), "hear_c_next_sample".to_string()],
            additional_flags: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompileRequest {
    pub source: String,
    pub options: CompileOptions,
}

impl CompileRequest {
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            options: CompileOptions::default(),
        }
    }

    pub fn with_options(mut self, options: CompileOptions) -> Self {
        self.options = options;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// The compiler ran and rejected the source.
    Compile,
    Timeout,
    /// Toolchain assets could not be prepared and nothing to fall back to.
    AssetLoad,
    /// Connection refused, DNS, broken body.
    Transport,
    /// The service answered with something that is not a compile result.
    Protocol,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            FailureKind::Compile => "compile error",
            FailureKind::Timeout => "timeout",
            FailureKind::AssetLoad => "asset load error",
            FailureKind::Transport => "transport error",
            FailureKind::Protocol => "protocol error",
        };
        f.write_str(label)
    }
}

#[derive(Debug)]
pub struct CompileSuccess {
    pub artifact: CompiledModule,
    pub output: String,
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompileFailure {
    pub kind: FailureKind,
    pub error: String,
    pub error_details: Vec<String>,
    pub stdout: Option<String>,
    pub stderr: Option<String>,
}

impl CompileFailure {
    pub fn new(kind: FailureKind, error: impl Into<String>) -> Self {
        Self {
            kind,
            error: error.into(),
            error_details: Vec::new(),
            stdout: None,
            stderr: None,
        }
    }

    pub fn timeout(after: std::time::Duration) -> Self {
        Self::new(
            FailureKind::Timeout,
            format!("Compilation timeout after {} ms", after.as_millis()),
        )
    }

    pub fn with_details(mut self, details: Vec<String>) -> Self {
        self.error_details = details;
        self
    }
}

impl fmt::Display for CompileFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.error)
    }
}

#[derive(Debug)]
pub enum CompileResult {
    Success(CompileSuccess),
    Failure(CompileFailure),
}

impl CompileResult {
    pub fn failure(kind: FailureKind, error: impl Into<String>) -> Self {
        CompileResult::Failure(CompileFailure::new(kind, error))
    }

    pub fn is_success(&self) -> bool {
        matches!(self, CompileResult::Success(_))
    }

    pub fn failure_kind(&self) -> Option<FailureKind> {
        match self {
            CompileResult::Success(_) => None,
            CompileResult::Failure(failure) => Some(failure.kind),
        }
    }

    /// The JSON shape shared with the compile services, minus the binary.
    pub fn to_wire(&self) -> WireResponse {
        match self {
            CompileResult::Success(ok) => WireResponse {
                success: true,
                output: Some(ok.output.clone()),
                warnings: ok.warnings.clone(),
                ..WireResponse::default()
            },
            CompileResult::Failure(failure) => WireResponse {
                success: false,
                error: Some(failure.error.clone()),
                error_details: failure.error_details.clone(),
                stdout: failure.stdout.clone(),
                stderr: failure.stderr.clone(),
                ..WireResponse::default()
            },
        }
    }
}

/// Body of a compile service response.
///
/// `{success:true, output, warnings?, wasm?}` or
/// `{success:false, error, errorDetails?, stdout?, stderr?}`. Warnings and
/// details may be a single string or an array of strings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    #[serde(
        default,
        deserialize_with = "string_or_list",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub warnings: Vec<String>,
    #[serde(
        default,
        deserialize_with = "bytes_or_base64",
        skip_serializing_if = "Option::is_none"
    )]
    pub wasm: Option<Vec<u8>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(
        default,
        deserialize_with = "string_or_list",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub error_details: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stdout: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stderr: Option<String>,
}

/// Accepts `"text"`, `["a", "b"]` or `null`.
fn string_or_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    use serde::de::Error;
    use serde_json::Value;

    match Value::deserialize(deserializer)? {
        Value::Null => Ok(Vec::new()),
        Value::String(s) if s.is_empty() => Ok(Vec::new()),
        Value::String(s) => Ok(vec![s]),
        Value::Array(items) => items
            .into_iter()
            .map(|v| match v {
                Value::String(s) => Ok(s),
                other => Ok(other.to_string()),
            })
            .collect::<Result<Vec<_>, D::Error>>(),
        _ => Err(D::Error::custom("expected a string or an array of strings")),
    }
}

/// Accepts a base64 string, an array of bytes or `null`.
fn bytes_or_base64<'de, D>(deserializer: D) -> Result<Option<Vec<u8>>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    use base64::Engine as _;
    use base64::engine::general_purpose::STANDARD;
    use serde::de::Error;
    use serde_json::Value;

    match Value::deserialize(deserializer)? {
        Value::Null => Ok(None),
        Value::String(s) if s.is_empty() => Ok(None),
        Value::String(s) => STANDARD
            .decode(s.trim())
            .map(Some)
            .map_err(|e| D::Error::custom(format!("invalid base64 module: {e}"))),
        Value::Array(items) => items
            .into_iter()
            .map(|v| {
                v.as_u64()
                    .and_then(|n| u8::try_from(n).ok())
                    .ok_or_else(|| D::Error::custom("module bytes must be 0..=255"))
            })
            .collect::<Result<Vec<u8>, D::Error>>()
            .map(Some),
        _ => Err(D::Error::custom("expected a base64 string or a byte array")),
    }
}

#[cfg(test)]
#[path = "test_compile.rs"]
mod tests;
