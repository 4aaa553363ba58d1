use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Subcommand};

use crate::services::compile::Dispatcher;
use crate::tools::cli::state::CliContext;

#[derive(Debug, Clone, Args)]
pub struct SourceCommand {
    #[command(subcommand)]
    pub action: SourceAction,
}

#[derive(Debug, Clone, Subcommand)]
pub enum SourceAction {
    /// Download the server's current source into a file
    Pull {
        /// Destination (defaults to the configured entry)
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Upload a file as the server's current source
    Push {
        /// Source file (defaults to the configured entry)
        #[arg(long)]
        input: Option<PathBuf>,
    },
}

impl SourceCommand {
    pub async fn execute(&self, ctx: &CliContext) -> Result<()> {
        let logger = ctx.logger();
        let (cwd, config) = ctx.project()?;
        let client = Dispatcher::new(config.dispatcher_config()).source_client();

        match &self.action {
            SourceAction::Pull { out } => {
                let path = out.clone().unwrap_or_else(|| config.entry_path(&cwd));
                let content = client.fetch_source().await?;
                if let Some(parent) = path.parent() {
                    if !parent.as_os_str().is_empty() {
                        fs::create_dir_all(parent)?;
                    }
                }
                fs::write(&path, &content)
                    .with_context(|| format!("failed to write {}", path.display()))?;
                logger.success(format!(
                    "Pulled {} bytes from {} into {}",
                    content.len(),
                    client.base_url(),
                    path.display()
                ));
            }
            SourceAction::Push { input } => {
                let path = input.clone().unwrap_or_else(|| config.entry_path(&cwd));
                let content = fs::read_to_string(&path)
                    .with_context(|| format!("failed to read {}", path.display()))?;
                client.update_source(&content).await?;
                logger.success(format!(
                    "Pushed {} to {}",
                    path.display(),
                    client.base_url()
                ));
            }
        }
        Ok(())
    }
}
