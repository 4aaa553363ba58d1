use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use clap::Args;

use crate::services::compile::CompileMode;
use crate::services::live::{LiveRequest, LiveSession};
use crate::tools::cli::state::CliContext;

#[derive(Debug, Clone, Args)]
pub struct PlayCommand {
    /// Path to the source file (overrides config)
    #[arg(long = "input")]
    pub input: Option<PathBuf>,

    /// Recompile and hot-swap the module whenever the source is saved
    #[arg(long)]
    pub watch: bool,

    /// Compile backend: auto, toolchain, remote or local (overrides config)
    #[arg(long, value_parser = parse_mode)]
    pub mode: Option<CompileMode>,

    /// Volume level (0.0 to 1.0)
    #[arg(long)]
    pub volume: Option<f32>,

    /// Stop after this many seconds instead of waiting for Ctrl-C
    #[arg(long)]
    pub seconds: Option<f64>,
}

pub(crate) fn parse_mode(raw: &str) -> Result<CompileMode, String> {
    CompileMode::parse(raw).ok_or_else(|| {
        format!("unknown compile mode '{raw}' (expected auto, toolchain, remote or local)")
    })
}

pub async fn execute(command: PlayCommand, ctx: &CliContext) -> Result<()> {
    let logger = ctx.logger();
    let (cwd, mut config) = ctx.project()?;

    if let Some(mode) = command.mode {
        config.compilation.mode = mode;
    }
    if let Some(volume) = command.volume {
        config.audio.volume = volume;
    }

    let entry = command
        .input
        .clone()
        .unwrap_or_else(|| config.entry_path(&cwd));
    if !entry.exists() {
        logger.error(format!("Source file not found: {}", entry.display()));
        anyhow::bail!("missing source file {}", entry.display());
    }

    let duration = command
        .seconds
        .filter(|s| s.is_finite() && *s > 0.0)
        .map(Duration::from_secs_f64);

    LiveSession::new(logger, config)
        .run(LiveRequest {
            entry,
            watch: command.watch,
            duration,
        })
        .await
}
