use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Serialize;
use std::time::Duration;

use super::{BackendKind, CompileBackend};
use crate::engine::runtime::CompiledModule;
use crate::services::compile::{
    CompileFailure, CompileOptions, CompileRequest, CompileResult, CompileSuccess, FailureKind,
    WireResponse,
};

pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpSettings {
    /// Full URL the source is POSTed to.
    pub endpoint: String,
    /// Where to GET the module when the response carries no inline `wasm`.
    pub artifact_url: Option<String>,
    pub timeout: Duration,
}

impl HttpSettings {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            artifact_url: None,
            timeout: DEFAULT_HTTP_TIMEOUT,
        }
    }
}

#[derive(Serialize)]
struct RebuildBody<'a> {
    code: &'a str,
    options: WireOptions<'a>,
}

/// Options as sent on the wire. Compile workers read the short
/// `optimization`/`sdl` names, the dev server the long ones.
#[derive(Serialize)]
struct WireOptions<'a> {
    #[serde(flatten)]
    options: &'a CompileOptions,
    optimization: u8,
    sdl: bool,
}

impl<'a> From<&'a CompileOptions> for WireOptions<'a> {
    fn from(options: &'a CompileOptions) -> Self {
        Self {
            options,
            optimization: options.optimization_level,
            sdl: options.sdl_enabled,
        }
    }
}

/// Remote compile service or the local development server; both speak
/// the same request/response contract.
pub struct HttpBackend {
    kind: BackendKind,
    client: reqwest::Client,
    settings: HttpSettings,
}

impl HttpBackend {
    pub fn new(kind: BackendKind, settings: HttpSettings) -> Self {
        Self {
            kind,
            client: reqwest::Client::new(),
            settings,
        }
    }

    pub fn settings(&self) -> &HttpSettings {
        &self.settings
    }

    async fn exchange(&self, request: &CompileRequest) -> CompileResult {
        let body = RebuildBody {
            code: &request.source,
            options: WireOptions::from(&request.options),
        };
        let response = match self
            .client
            .post(&self.settings.endpoint)
            .json(&body)
            .send()
            .await
        {
            Ok(response) => response,
            Err(err) => return transport_failure(&self.settings.endpoint, err),
        };

        let status = response.status();
        let text = match response.text().await {
            Ok(text) => text,
            Err(err) => return transport_failure(&self.settings.endpoint, err),
        };

        let wire: WireResponse = match serde_json::from_str(&text) {
            Ok(wire) => wire,
            Err(_) => {
                return CompileResult::failure(
                    FailureKind::Protocol,
                    format!("HTTP {status}: unexpected response body: {}", snippet(&text)),
                );
            }
        };

        if !wire.success {
            return CompileResult::Failure(CompileFailure {
                kind: FailureKind::Compile,
                error: wire
                    .error
                    .unwrap_or_else(|| "Compilation failed".to_string()),
                error_details: wire.error_details,
                stdout: wire.stdout,
                stderr: wire.stderr,
            });
        }
        if !status.is_success() {
            return CompileResult::failure(
                FailureKind::Protocol,
                format!("HTTP {status} reported success"),
            );
        }

        let bytes = match wire.wasm {
            Some(bytes) => bytes,
            None => match self.fetch_artifact().await {
                Ok(bytes) => bytes,
                Err(failure) => return CompileResult::Failure(failure),
            },
        };

        match CompiledModule::from_bytes(bytes) {
            Ok(artifact) => CompileResult::Success(CompileSuccess {
                artifact,
                output: wire.output.unwrap_or_default(),
                warnings: wire.warnings,
            }),
            Err(err) => {
                CompileResult::failure(FailureKind::Protocol, format!("invalid module: {err}"))
            }
        }
    }

    async fn fetch_artifact(&self) -> Result<Vec<u8>, CompileFailure> {
        let Some(url) = self.settings.artifact_url.as_deref() else {
            return Err(CompileFailure::new(
                FailureKind::Protocol,
                "compile succeeded but no module was returned",
            ));
        };
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| CompileFailure::new(FailureKind::Transport, format!("{url}: {e}")))?;
        if !response.status().is_success() {
            return Err(CompileFailure::new(
                FailureKind::Transport,
                format!("Failed to fetch module: HTTP {}", response.status()),
            ));
        }
        let bytes = response
            .bytes()
            .await
            .map_err(|e| CompileFailure::new(FailureKind::Transport, format!("{url}: {e}")))?;
        Ok(bytes.to_vec())
    }
}

#[async_trait]
impl CompileBackend for HttpBackend {
    fn kind(&self) -> BackendKind {
        self.kind
    }

    async fn compile(&self, request: &CompileRequest) -> CompileResult {
        let timeout = self.settings.timeout;
        match tokio::time::timeout(timeout, self.exchange(request)).await {
            Ok(result) => result,
            Err(_) => CompileResult::Failure(CompileFailure::timeout(timeout)),
        }
    }
}

fn transport_failure(endpoint: &str, err: reqwest::Error) -> CompileResult {
    let kind = if err.is_timeout() {
        FailureKind::Timeout
    } else {
        FailureKind::Transport
    };
    CompileResult::failure(kind, format!("{endpoint}: {err}"))
}

fn snippet(text: &str) -> String {
    let trimmed = text.trim();
    match trimmed.char_indices().nth(120) {
        Some((cut, _)) => format!("{}...", &trimmed[..cut]),
        None => trimmed.to_string(),
    }
}

/// `GET /source` and `POST /update-source` on the local development server.
#[derive(Debug, Clone)]
pub struct SourceClient {
    client: reqwest::Client,
    base_url: String,
    timeout: Duration,
}

#[derive(Serialize)]
struct UpdateSourceBody<'a> {
    content: &'a str,
}

#[derive(serde::Deserialize)]
struct UpdateSourceReply {
    success: bool,
    #[serde(default)]
    error: Option<String>,
}

impl SourceClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            timeout,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub async fn fetch_source(&self) -> Result<String> {
        let url = format!("{}/source", self.base_url);
        let response = self
            .client
            .get(&url)
            .timeout(self.timeout)
            .send()
            .await
            .with_context(|| format!("failed to reach {url}"))?;
        if !response.status().is_success() {
            anyhow::bail!("Failed to fetch source: HTTP {}", response.status());
        }
        response
            .text()
            .await
            .with_context(|| format!("failed to read body from {url}"))
    }

    pub async fn update_source(&self, content: &str) -> Result<()> {
        let url = format!("{}/update-source", self.base_url);
        let response = self
            .client
            .post(&url)
            .timeout(self.timeout)
            .json(&UpdateSourceBody { content })
            .send()
            .await
            .with_context(|| format!("failed to reach {url}"))?;
        let status = response.status();
        let reply: UpdateSourceReply = response
            .json()
            .await
            .with_context(|| format!("invalid reply from {url} (HTTP {status})"))?;
        if !reply.success {
            anyhow::bail!(
                "Failed to update source: {}",
                reply.error.unwrap_or_else(|| format!("HTTP {status}"))
            );
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "test_http.rs"]
mod tests;
