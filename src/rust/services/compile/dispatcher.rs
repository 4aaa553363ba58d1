use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::sync::mpsc::UnboundedSender;

use super::backends::http::DEFAULT_HTTP_TIMEOUT;
use super::backends::{
    BackendKind, CompileBackend, CompileMode, HttpBackend, HttpSettings, SourceClient,
    ToolchainBackend, ToolchainSettings,
};
use super::{CompileFailure, CompileOptions, CompileRequest, CompileResult, FailureKind};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatcherConfig {
    pub mode: CompileMode,
    pub toolchain_enabled: bool,
    pub remote_enabled: bool,
    pub local_enabled: bool,
    pub toolchain: ToolchainSettings,
    pub remote: HttpSettings,
    /// Base URL of the local development server.
    pub local_url: String,
    pub local_artifact_path: Option<String>,
    pub local_timeout: Duration,
    pub options: CompileOptions,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            mode: CompileMode::Auto,
            toolchain_enabled: false,
            remote_enabled: false,
            local_enabled: true,
            toolchain: ToolchainSettings::new("", ToolchainSettings::default_cache_dir()),
            remote: HttpSettings::new(""),
            local_url: "http://localhost:3000".to_string(),
            local_artifact_path: Some("/build/index.wasm".to_string()),
            local_timeout: DEFAULT_HTTP_TIMEOUT,
            options: CompileOptions::default(),
        }
    }
}

impl DispatcherConfig {
    pub fn local_settings(&self) -> HttpSettings {
        let base = self.local_url.trim_end_matches('/');
        HttpSettings {
            endpoint: format!("{base}/rebuild"),
            artifact_url: self
                .local_artifact_path
                .as_deref()
                .map(|path| format!("{base}/{}", path.trim_start_matches('/'))),
            timeout: self.local_timeout,
        }
    }
}

/// Routes compile requests to the backend chosen for this session.
///
/// The backend is chosen once. If the toolchain cannot fetch its assets
/// the session moves to the fallback backend and stays there.
pub struct Dispatcher {
    config: DispatcherConfig,
    selected: BackendKind,
    active: Mutex<Option<Arc<dyn CompileBackend>>>,
    status: Option<UnboundedSender<String>>,
}

impl Dispatcher {
    pub fn new(config: DispatcherConfig) -> Self {
        let selected =
            BackendKind::select(config.mode, config.toolchain_enabled, config.remote_enabled);
        Self {
            config,
            selected,
            active: Mutex::new(None),
            status: None,
        }
    }

    /// Status lines ("Compiling...", fallback notices) go to `status`.
    pub fn with_status(mut self, status: UnboundedSender<String>) -> Self {
        self.status = Some(status);
        self
    }

    pub fn config(&self) -> &DispatcherConfig {
        &self.config
    }

    pub fn selected_kind(&self) -> BackendKind {
        self.selected
    }

    /// The backend actually serving this session, once resolved.
    pub async fn active_kind(&self) -> Option<BackendKind> {
        self.active.lock().await.as_ref().map(|backend| backend.kind())
    }

    pub fn source_client(&self) -> SourceClient {
        SourceClient::new(self.config.local_url.clone(), self.config.local_timeout)
    }

    /// Compiles with the session's default options.
    pub async fn compile_source(&self, source: impl Into<String>) -> CompileResult {
        let request = CompileRequest::new(source).with_options(self.config.options.clone());
        self.compile(request).await
    }

    pub async fn compile(&self, request: CompileRequest) -> CompileResult {
        let backend = match self.session_backend().await {
            Ok(backend) => backend,
            Err(failure) => return CompileResult::Failure(failure),
        };
        self.report("Compiling...");
        backend.compile(&request).await
    }

    async fn session_backend(&self) -> Result<Arc<dyn CompileBackend>, CompileFailure> {
        let mut active = self.active.lock().await;
        if let Some(backend) = active.as_ref() {
            return Ok(backend.clone());
        }

        self.report(format!("Initializing compiler (mode: {})...", self.selected));
        let primary = self.build(self.selected);
        let backend = match primary.prepare().await {
            Ok(()) => primary,
            Err(failure) if self.selected == BackendKind::Toolchain => {
                let fallback = BackendKind::toolchain_fallback(
                    self.config.remote_enabled,
                    self.config.local_enabled,
                );
                match fallback {
                    Some(kind) => {
                        self.report(format!(
                            "Toolchain unavailable ({}), falling back to {kind}",
                            failure.error
                        ));
                        let backend = self.build(kind);
                        backend.prepare().await?;
                        backend
                    }
                    None => {
                        return Err(CompileFailure::new(
                            FailureKind::AssetLoad,
                            format!("toolchain unavailable: {}", failure.error),
                        ));
                    }
                }
            }
            Err(failure) => return Err(failure),
        };

        self.report("Compiler ready!");
        *active = Some(backend.clone());
        Ok(backend)
    }

    fn build(&self, kind: BackendKind) -> Arc<dyn CompileBackend> {
        match kind {
            BackendKind::Toolchain => Arc::new(ToolchainBackend::new(self.config.toolchain.clone())),
            BackendKind::Remote => Arc::new(HttpBackend::new(kind, self.config.remote.clone())),
            BackendKind::Local => Arc::new(HttpBackend::new(kind, self.config.local_settings())),
        }
    }

    fn report(&self, message: impl Into<String>) {
        if let Some(status) = &self.status {
            let _ = status.send(message.into());
        }
    }
}

#[cfg(test)]
#[path = "test_dispatcher.rs"]
mod tests;
