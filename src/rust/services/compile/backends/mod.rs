pub mod http;
pub mod toolchain;

pub use http::{HttpBackend, HttpSettings, SourceClient};
pub use toolchain::{ToolchainAssets, ToolchainBackend, ToolchainSettings};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

use super::{CompileFailure, CompileRequest, CompileResult};

/// Global deadline for a compile routed through an HTTP backend.
pub const HTTP_DEADLINE: Duration = Duration::from_secs(60);
/// Global deadline for an in-process toolchain compile.
pub const TOOLCHAIN_DEADLINE: Duration = Duration::from_secs(300);

/// Requested compilation mode. `Auto` lets configuration decide.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CompileMode {
    #[default]
    Auto,
    #[serde(alias = "wasm-clang")]
    Toolchain,
    #[serde(alias = "serverless")]
    Remote,
    #[serde(alias = "local-server")]
    Local,
}

impl CompileMode {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "auto" => Some(CompileMode::Auto),
            "toolchain" | "wasm-clang" => Some(CompileMode::Toolchain),
            "remote" | "serverless" => Some(CompileMode::Remote),
            "local" | "local-server" => Some(CompileMode::Local),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendKind {
    Toolchain,
    Remote,
    Local,
}

impl BackendKind {
    /// Explicit mode > toolchain (if enabled) > remote (if enabled) > local.
    pub fn select(mode: CompileMode, toolchain_enabled: bool, remote_enabled: bool) -> Self {
        match mode {
            CompileMode::Toolchain => BackendKind::Toolchain,
            CompileMode::Remote => BackendKind::Remote,
            CompileMode::Local => BackendKind::Local,
            CompileMode::Auto if toolchain_enabled => BackendKind::Toolchain,
            CompileMode::Auto if remote_enabled => BackendKind::Remote,
            CompileMode::Auto => BackendKind::Local,
        }
    }

    /// Where a session goes when toolchain assets cannot be prepared.
    pub fn toolchain_fallback(remote_enabled: bool, local_enabled: bool) -> Option<Self> {
        if remote_enabled {
            Some(BackendKind::Remote)
        } else if local_enabled {
            Some(BackendKind::Local)
        } else {
            None
        }
    }

    pub fn deadline(self) -> Duration {
        match self {
            BackendKind::Toolchain => TOOLCHAIN_DEADLINE,
            BackendKind::Remote | BackendKind::Local => HTTP_DEADLINE,
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            BackendKind::Toolchain => "toolchain",
            BackendKind::Remote => "remote",
            BackendKind::Local => "local",
        })
    }
}

#[async_trait]
pub trait CompileBackend: Send + Sync {
    fn kind(&self) -> BackendKind;

    /// Gets the backend ready for its first compile. HTTP backends have
    /// nothing to do; the toolchain fetches its assets here.
    async fn prepare(&self) -> Result<(), CompileFailure> {
        Ok(())
    }

    async fn compile(&self, request: &CompileRequest) -> CompileResult;
}

#[cfg(test)]
#[path = "test_backends.rs"]
mod tests;
