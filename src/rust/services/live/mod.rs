#![cfg(feature = "cli")]

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use tokio::select;

use crate::engine::audio::output::AudioOutput;
use crate::engine::bridge::{ControlSender, EventReceiver};
use crate::engine::processor::Processor;
use crate::platform::config::AppConfig;
use crate::services::compile::{
    CompileOptions, CompileRequest, CompileResult, CompilerClient, Dispatcher, WorkerStatus,
};
use crate::services::watch::file::{FileWatcher, WatchOptions};
use crate::tools::logger::Logger;

#[derive(Debug, Clone)]
pub struct LiveRequest {
    pub entry: PathBuf,
    /// Recompile and hot-swap on every save.
    pub watch: bool,
    /// Stop after this long instead of waiting for Ctrl-C.
    pub duration: Option<Duration>,
}

/// Compiles a source file and hands the module to a running processor.
#[derive(Clone)]
pub struct ModuleLoader {
    logger: Arc<Logger>,
    compiler: CompilerClient,
    options: CompileOptions,
    control: ControlSender,
}

impl ModuleLoader {
    pub fn new(
        logger: Arc<Logger>,
        compiler: CompilerClient,
        options: CompileOptions,
        control: ControlSender,
    ) -> Self {
        Self {
            logger,
            compiler,
            options,
            control,
        }
    }

    /// On a failed compile nothing is sent, so whatever is playing keeps
    /// playing.
    pub async fn load(&self, path: &Path) -> Result<()> {
        let source = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("failed to read {}", path.display()))?;

        self.logger.action(format!("Compiling {}", path.display()));
        let started = Instant::now();
        let request = CompileRequest::new(source).with_options(self.options.clone());
        let result = self.compiler.compile(request).await;
        self.logger.log_compile_result(&result);

        match result {
            CompileResult::Success(ok) => {
                self.logger.debug(format!(
                    "compile took {}",
                    format_duration(started.elapsed())
                ));
                if !self.control.send_init(ok.artifact) {
                    anyhow::bail!("processor is no longer running");
                }
                Ok(())
            }
            CompileResult::Failure(failure) => Err(anyhow::anyhow!("{failure}")),
        }
    }
}

/// Plays a source file on the default output device.
pub struct LiveSession {
    logger: Arc<Logger>,
    config: AppConfig,
}

impl LiveSession {
    pub fn new(logger: Arc<Logger>, config: AppConfig) -> Self {
        Self { logger, config }
    }

    pub async fn run(&self, request: LiveRequest) -> Result<()> {
        let config = &self.config;
        let Processor {
            port,
            driver,
            service,
        } = Processor::new(config.sample_rate()).context("failed to create audio processor")?;
        let (control, events) = port.into_parts();
        tokio::spawn(service.run());
        tokio::spawn(forward_events(self.logger.clone(), events));

        let (compiler, status) =
            CompilerClient::spawn(Dispatcher::new(config.dispatcher_config()));
        tokio::spawn(forward_status(self.logger.clone(), status));

        let output = AudioOutput::start(driver, config.channels(), config.buffer_size())
            .context("failed to start audio output")?;
        output.set_volume(config.volume());
        self.logger.info(format!(
            "Audio output: {} Hz, {} ch, {} frames per block",
            config.sample_rate(),
            config.channels(),
            config.buffer_size()
        ));

        let loader = ModuleLoader::new(
            self.logger.clone(),
            compiler,
            config.compile_options(),
            control,
        );

        if let Err(err) = loader.load(&request.entry).await {
            if !request.watch {
                output.stop();
                return Err(err);
            }
            self.logger
                .warn("Initial compile failed; waiting for the next save");
        }

        let deadline = async {
            match request.duration {
                Some(duration) => tokio::time::sleep(duration).await,
                None => std::future::pending().await,
            }
        };
        tokio::pin!(deadline);

        if request.watch {
            let watcher = FileWatcher::new(self.logger.clone());
            let mut stream = watcher
                .watch(
                    &request.entry,
                    WatchOptions {
                        debounce: config.debounce(),
                        ..WatchOptions::default()
                    },
                )
                .context("failed to initialise file watcher")?;
            self.logger
                .watch(format!("Watching {}", request.entry.display()));

            loop {
                select! {
                    change = stream.next_change() => match change {
                        Some(path) => {
                            self.logger.watch(format!("Change detected: {}", path.display()));
                            // failures are already logged; the old module keeps playing
                            let _ = loader.load(&path).await;
                        }
                        None => {
                            self.logger.warn("Watch stream ended; stopping");
                            break;
                        }
                    },
                    _ = tokio::signal::ctrl_c() => break,
                    _ = &mut deadline => break,
                }
            }
        } else {
            self.logger.info("Playing. Press Ctrl-C to stop.");
            select! {
                _ = tokio::signal::ctrl_c() => {}
                _ = &mut deadline => {}
            }
        }

        output.stop();
        self.logger.success("Playback stopped.");
        Ok(())
    }
}

pub async fn forward_events(logger: Arc<Logger>, mut events: EventReceiver) {
    while let Some(event) = events.recv().await {
        logger.log_event(&event);
    }
}

pub async fn forward_status(
    logger: Arc<Logger>,
    mut status: tokio::sync::mpsc::UnboundedReceiver<WorkerStatus>,
) {
    while let Some(WorkerStatus { message }) = status.recv().await {
        logger.debug(message);
    }
}

fn format_duration(duration: Duration) -> String {
    if duration.as_secs() >= 1 {
        format!("{:.2}s", duration.as_secs_f64())
    } else {
        let ms = duration.as_secs_f64() * 1000.0;
        if ms >= 100.0 {
            format!("{:.0}ms", ms)
        } else {
            format!("{:.1}ms", ms)
        }
    }
}

#[cfg(test)]
#[path = "test_live.rs"]
mod tests;
