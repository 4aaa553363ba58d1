#![cfg(feature = "cli")]

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc::{self, Receiver};
use tokio::time::timeout;

use crate::tools::logger::Logger;

#[derive(Debug, Clone)]
pub struct WatchOptions {
    /// Quiet period after the last event before a change is reported.
    pub debounce: Duration,
    pub poll_interval: Duration,
}

impl Default for WatchOptions {
    fn default() -> Self {
        Self {
            debounce: Duration::from_millis(250),
            poll_interval: Duration::from_millis(500),
        }
    }
}

/// Watches one source file.
///
/// The parent directory is watched instead of the file itself: editors
/// that save by rename would otherwise detach the watch after one save.
pub struct FileWatcher {
    logger: Arc<Logger>,
}

impl FileWatcher {
    pub fn new(logger: Arc<Logger>) -> Self {
        Self { logger }
    }

    pub fn watch(&self, path: impl AsRef<Path>, options: WatchOptions) -> Result<FileWatchStream> {
        let path = path.as_ref().to_path_buf();
        let file_name = path
            .file_name()
            .map(OsString::from)
            .with_context(|| format!("not a file path: {}", path.display()))?;
        let directory = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };

        let (tx, rx) = mpsc::channel(64);
        let config = Config::default().with_poll_interval(options.poll_interval);
        let logger = self.logger.clone();
        let target = file_name.clone();

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) => {
                    if is_relevant(&event.kind) && touches(&event, &target) {
                        // A full queue already holds a pending change.
                        let _ = tx.try_send(());
                    }
                }
                Err(err) => logger.error(format!("Watch error: {err}")),
            },
            config,
        )?;

        watcher
            .watch(&directory, RecursiveMode::NonRecursive)
            .with_context(|| format!("failed to watch {}", directory.display()))?;

        Ok(FileWatchStream {
            path,
            receiver: rx,
            _watcher: watcher,
            debounce: options.debounce,
        })
    }
}

fn is_relevant(kind: &EventKind) -> bool {
    matches!(
        kind,
        EventKind::Modify(_) | EventKind::Create(_) | EventKind::Any
    )
}

fn touches(event: &Event, file_name: &OsString) -> bool {
    event.paths.is_empty()
        || event
            .paths
            .iter()
            .any(|p| p.file_name().map(|n| n == file_name.as_os_str()).unwrap_or(false))
}

pub struct FileWatchStream {
    path: PathBuf,
    receiver: Receiver<()>,
    _watcher: RecommendedWatcher,
    debounce: Duration,
}

impl FileWatchStream {
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Waits for the next save. A burst of events is collapsed into a
    /// single change once the file has been quiet for the debounce period.
    pub async fn next_change(&mut self) -> Option<PathBuf> {
        self.receiver.recv().await?;
        loop {
            match timeout(self.debounce, self.receiver.recv()).await {
                Ok(Some(())) => continue,
                Ok(None) => return None,
                Err(_) => return Some(self.path.clone()),
            }
        }
    }
}

#[cfg(test)]
#[path = "test_watch.rs"]
mod tests;
