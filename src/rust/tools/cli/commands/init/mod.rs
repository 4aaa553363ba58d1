use anyhow::Result;
use clap::Args;
use std::fs;
use std::path::Path;

use crate::platform::config::{AppConfig, TOML_CONFIG};
use crate::tools::cli::state::CliContext;

const USER_TEMPLATE: &str = include_str!("../../../../../assets/user.h");

#[derive(Debug, Clone, Args)]
pub struct InitCommand {
    /// Project name (creates new directory) or use current directory if not specified
    #[arg(short, long)]
    pub name: Option<String>,

    /// Overwrite an existing config and source file
    #[arg(long)]
    pub force: bool,
}

impl InitCommand {
    pub async fn execute(&self, ctx: &CliContext) -> Result<()> {
        let logger = ctx.logger();

        let current_dir = std::env::current_dir()?;

        let (target_path, project_name) = if let Some(name) = &self.name {
            let path = current_dir.join(name);
            (path, name.clone())
        } else {
            let name = current_dir
                .file_name()
                .unwrap_or_default()
                .to_string_lossy()
                .to_string();
            (current_dir.clone(), name)
        };

        if target_path.exists() && self.name.is_some() && !self.force {
            logger.error(format!("Directory '{}' already exists", project_name));
            anyhow::bail!("Target directory already exists");
        }
        if target_path.join(TOML_CONFIG).exists() && !self.force {
            logger.error(format!(
                "'{}' already contains {} (use --force to overwrite)",
                project_name, TOML_CONFIG
            ));
            anyhow::bail!("Project already initialized");
        }

        logger.action(format!("Initializing '{}' project...", project_name));
        fs::create_dir_all(&target_path)?;
        let config = AppConfig::default();
        scaffold_project(&target_path, &config)?;

        logger.success(format!(
            "Project '{}' initialized successfully at '{}'",
            project_name,
            target_path.display()
        ));

        logger.info("Next steps:");
        if self.name.is_some() {
            logger.info(format!("  cd {}", project_name));
        }
        logger.info(format!("  edit {}", config.paths.entry.display()));
        logger.info("  hearc play --watch");

        Ok(())
    }
}

fn scaffold_project(path: &Path, config: &AppConfig) -> Result<()> {
    config.write_toml(path.join(TOML_CONFIG))?;

    let entry = config.entry_path(path);
    if let Some(parent) = entry.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(&entry, USER_TEMPLATE)?;

    if let Some(parent) = config.output_path(path).parent() {
        fs::create_dir_all(parent)?;
    }
    Ok(())
}
