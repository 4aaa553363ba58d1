use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;

use crate::platform::config::AppConfig;
use crate::tools::logger::Logger;

#[derive(Clone)]
pub struct CliContext {
    logger: Arc<Logger>,
}

impl CliContext {
    pub fn new(verbose: bool) -> Self {
        Self {
            logger: Arc::new(Logger::new().with_verbose(verbose)),
        }
    }

    pub fn logger(&self) -> Arc<Logger> {
        Arc::clone(&self.logger)
    }

    /// Project root and the configuration found there.
    pub fn project(&self) -> Result<(PathBuf, AppConfig)> {
        let cwd = std::env::current_dir()?;
        let config = AppConfig::load(&cwd)?;
        if let Some(path) = AppConfig::find(&cwd) {
            self.logger
                .debug(format!("Using config {}", path.display()));
        }
        Ok((cwd, config))
    }
}
