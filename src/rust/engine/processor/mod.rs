//! Wires the bridge, bootstrapper and sample driver into one processor.
//!
//! `Processor::new` hands back three pieces that live on different
//! threads: the [`ProcessorPort`] stays with the controller, the
//! [`SampleDriver`] moves into the audio callback and the [`InitService`]
//! runs on the async runtime, turning `init` messages into installed
//! instances.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::mpsc::Receiver;
use std::time::Duration;

use tokio::task::JoinSet;
use wasmtime::Engine;

use crate::engine::audio::{InstanceSlot, SampleDriver, retire_channel};
use crate::engine::bridge::{
    ControlMessage, ControlReceiver, ControlSender, EventReceiver, EventSender, ProcessorEvent,
    control_channel, event_channel,
};
use crate::engine::runtime::{Bootstrapper, CompiledModule, ExecutionInstance, InitError};

/// How often retired instances are collected while the service is idle.
const RETIRE_SWEEP: Duration = Duration::from_millis(250);

/// Controller-side handle: send modules in, read events out.
pub struct ProcessorPort {
    control: ControlSender,
    events: EventReceiver,
}

impl ProcessorPort {
    /// Queues a module for installation. Returns false once the init
    /// service has shut down.
    pub fn init(&self, module: CompiledModule) -> bool {
        self.control.send_init(module)
    }

    pub fn control(&self) -> ControlSender {
        self.control.clone()
    }

    pub async fn next_event(&mut self) -> Option<ProcessorEvent> {
        self.events.recv().await
    }

    pub fn events_mut(&mut self) -> &mut EventReceiver {
        &mut self.events
    }

    /// Splits the port so events can be consumed on their own task.
    pub fn into_parts(self) -> (ControlSender, EventReceiver) {
        (self.control, self.events)
    }
}

pub struct Processor {
    pub port: ProcessorPort,
    pub driver: SampleDriver,
    pub service: InitService,
}

impl Processor {
    pub fn new(sample_rate: u32) -> anyhow::Result<Self> {
        Self::with_engine(Engine::default(), sample_rate)
    }

    pub fn with_engine(engine: Engine, sample_rate: u32) -> anyhow::Result<Self> {
        let (event_tx, event_rx) = event_channel();
        let (control_tx, control_rx) = control_channel();
        let (retire_tx, retire_rx) = retire_channel();
        let slot = Arc::new(InstanceSlot::new());

        let driver = SampleDriver::new(slot.clone(), retire_tx, event_tx.clone(), sample_rate);
        let installer = Installer {
            bootstrapper: Bootstrapper::with_engine(engine, event_tx.clone())?,
            slot,
            events: event_tx,
            latest: Arc::new(AtomicU64::new(0)),
        };

        Ok(Self {
            port: ProcessorPort {
                control: control_tx,
                events: event_rx,
            },
            driver,
            service: InitService {
                control: control_rx,
                installer,
                retired: retire_rx,
                collected: Arc::new(AtomicUsize::new(0)),
            },
        })
    }
}

/// What became of one bootstrap attempt.
#[derive(Debug)]
pub enum InstallOutcome {
    Installed,
    /// A newer `init` was issued while this one was bootstrapping.
    Stale,
    Failed(InitError),
}

/// Bootstraps a module and, if it is still the latest request, hands it
/// to the audio thread.
#[derive(Clone)]
pub struct Installer {
    bootstrapper: Bootstrapper,
    slot: Arc<InstanceSlot>,
    events: EventSender,
    latest: Arc<AtomicU64>,
}

impl Installer {
    /// Issues the generation for a freshly received `init`.
    pub fn next_generation(&self) -> u64 {
        self.latest.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn latest_generation(&self) -> u64 {
        self.latest.load(Ordering::SeqCst)
    }

    /// Failures post exactly one error event and leave whatever is already
    /// installed untouched. Stale completions are dropped silently.
    pub async fn install(&self, module: CompiledModule, generation: u64) -> InstallOutcome {
        match self.bootstrapper.bootstrap(module, generation).await {
            Ok(instance) => match self.slot.offer_if_latest(instance, &self.latest) {
                Ok(superseded) => {
                    drop(superseded);
                    self.events.post(ProcessorEvent::Ready);
                    InstallOutcome::Installed
                }
                Err(stale) => {
                    drop(stale);
                    InstallOutcome::Stale
                }
            },
            Err(err) => {
                self.events.post(ProcessorEvent::error(err.to_string()));
                InstallOutcome::Failed(err)
            }
        }
    }
}

/// Async half of the processor.
pub struct InitService {
    control: ControlReceiver,
    installer: Installer,
    retired: Receiver<ExecutionInstance>,
    collected: Arc<AtomicUsize>,
}

impl InitService {
    pub fn installer(&self) -> Installer {
        self.installer.clone()
    }

    /// Running total of swapped-out instances dropped by this service.
    pub fn collected_counter(&self) -> Arc<AtomicUsize> {
        self.collected.clone()
    }

    /// Serves `init` messages until every [`ControlSender`] is dropped.
    /// Bootstraps run concurrently; in-flight ones finish before return.
    pub async fn run(mut self) {
        let mut tasks = JoinSet::new();
        let mut sweep = tokio::time::interval(RETIRE_SWEEP);

        loop {
            tokio::select! {
                message = self.control.recv() => match message {
                    Some(ControlMessage::Init { module }) => {
                        let installer = self.installer.clone();
                        let generation = installer.next_generation();
                        tasks.spawn(async move { installer.install(module, generation).await });
                    }
                    None => break,
                },
                Some(_) = tasks.join_next(), if !tasks.is_empty() => {
                    self.collect_retired();
                }
                _ = sweep.tick() => {
                    self.collect_retired();
                }
            }
        }

        while tasks.join_next().await.is_some() {}
        self.collect_retired();
    }

    /// Drops instances the audio thread has swapped out.
    fn collect_retired(&self) -> usize {
        let mut count = 0;
        while let Ok(instance) = self.retired.try_recv() {
            drop(instance);
            count += 1;
        }
        self.collected.fetch_add(count, Ordering::Relaxed);
        count
    }
}

#[cfg(test)]
#[path = "test_processor.rs"]
mod tests;
