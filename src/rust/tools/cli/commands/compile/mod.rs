use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Args;

use crate::platform::config::AppConfig;
use crate::services::compile::{CompileMode, CompileRequest, CompileResult, Dispatcher};
use crate::tools::cli::commands::play::parse_mode;
use crate::tools::cli::state::CliContext;
use crate::tools::logger::Logger;

#[derive(Debug, Clone, Args)]
pub struct CompileCommand {
    /// Path to the source file (overrides config)
    #[arg(long = "input")]
    pub input: Option<PathBuf>,

    /// Where to write the module (overrides config)
    #[arg(long = "out")]
    pub out: Option<PathBuf>,

    /// Compile backend: auto, toolchain, remote or local (overrides config)
    #[arg(long, value_parser = parse_mode)]
    pub mode: Option<CompileMode>,
}

impl CompileCommand {
    pub async fn execute(&self, ctx: &CliContext) -> Result<()> {
        let logger = ctx.logger();
        let (cwd, mut config) = ctx.project()?;
        if let Some(mode) = self.mode {
            config.compilation.mode = mode;
        }

        let input = self.input.clone().unwrap_or_else(|| config.entry_path(&cwd));
        let out = self.out.clone().unwrap_or_else(|| config.output_path(&cwd));

        let bytes = compile_file(&logger, &config, &input).await?;

        if let Some(parent) = out.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)
                    .with_context(|| format!("failed to create {}", parent.display()))?;
            }
        }
        fs::write(&out, &bytes).with_context(|| format!("failed to write {}", out.display()))?;
        logger.success(format!("Wrote {} ({} bytes)", out.display(), bytes.len()));
        Ok(())
    }
}

/// One-shot compile through the configured backend. Returns the module
/// bytes, or the failure once it has been logged.
pub(crate) async fn compile_file(
    logger: &Arc<Logger>,
    config: &AppConfig,
    input: &Path,
) -> Result<Vec<u8>> {
    let source = fs::read_to_string(input)
        .with_context(|| format!("failed to read {}", input.display()))?;

    let (status_tx, mut status_rx) = tokio::sync::mpsc::unbounded_channel::<String>();
    let dispatcher = Dispatcher::new(config.dispatcher_config()).with_status(status_tx);
    let status = {
        let logger = logger.clone();
        tokio::spawn(async move {
            while let Some(message) = status_rx.recv().await {
                logger.debug(message);
            }
        })
    };

    logger.action(format!("Compiling {}", input.display()));
    let result = dispatcher
        .compile(CompileRequest::new(source).with_options(config.compile_options()))
        .await;
    drop(dispatcher);
    let _ = status.await;

    logger.log_compile_result(&result);
    match result {
        CompileResult::Success(ok) => Ok(ok.artifact.into_bytes()),
        CompileResult::Failure(failure) => Err(anyhow::anyhow!("{failure}")),
    }
}
