use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, SyncSender};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use crate::engine::bridge::{EventSender, ProcessorEvent};
use crate::engine::runtime::{ExecutionInstance, NEXT_SAMPLE_EXPORT};

/// A perf event is posted on every N-th processed buffer.
pub const PERF_REPORT_INTERVAL: u64 = 500;

/// Replaced instances waiting to be dropped off the audio thread.
const RETIRE_CAPACITY: usize = 4;

/// Handoff point between the init service and the audio thread.
///
/// The controller side may block on the lock; the audio side only ever
/// uses `try_lock` and skips the pickup when contended.
#[derive(Default)]
pub struct InstanceSlot {
    pending: Mutex<Option<ExecutionInstance>>,
}

impl InstanceSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `instance` for the next pickup, returning a previously
    /// pending instance the driver never saw.
    pub fn offer(&self, instance: ExecutionInstance) -> Option<ExecutionInstance> {
        match self.pending.lock() {
            Ok(mut guard) => guard.replace(instance),
            Err(poisoned) => poisoned.into_inner().replace(instance),
        }
    }

    /// Like [`offer`](Self::offer), but only while `instance` belongs to the
    /// latest issued generation. The check runs under the slot lock, so a
    /// slow bootstrap can never overwrite a newer one.
    pub fn offer_if_latest(
        &self,
        instance: ExecutionInstance,
        latest: &AtomicU64,
    ) -> Result<Option<ExecutionInstance>, ExecutionInstance> {
        let mut guard = match self.pending.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if instance.generation() != latest.load(Ordering::SeqCst) {
            return Err(instance);
        }
        Ok(guard.replace(instance))
    }

    pub fn has_pending(&self) -> bool {
        self.pending
            .lock()
            .map(|guard| guard.is_some())
            .unwrap_or(false)
    }

    fn try_take(&self) -> Option<ExecutionInstance> {
        self.pending.try_lock().ok().and_then(|mut guard| guard.take())
    }
}

/// Bounded channel carrying replaced instances back to the controller.
pub fn retire_channel() -> (SyncSender<ExecutionInstance>, Receiver<ExecutionInstance>) {
    mpsc::sync_channel(RETIRE_CAPACITY)
}

/// Running timing totals for the active instance.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PerfStats {
    pub call_count: u64,
    pub total_ms: f64,
    pub max_ms: f64,
}

impl PerfStats {
    /// Accumulates one buffer; returns true when a report is due.
    fn record(&mut self, elapsed_ms: f64) -> bool {
        self.call_count += 1;
        self.total_ms += elapsed_ms;
        if elapsed_ms > self.max_ms {
            self.max_ms = elapsed_ms;
        }
        self.call_count % PERF_REPORT_INTERVAL == 0
    }

    pub fn average_ms(&self) -> f64 {
        if self.call_count == 0 {
            0.0
        } else {
            self.total_ms / self.call_count as f64
        }
    }
}

/// Audio-callback state machine.
///
/// Runs on the real-time thread: no blocking, no I/O, and no allocation
/// on the steady-state path. Only non-blocking event posts leave it.
pub struct SampleDriver {
    slot: Arc<InstanceSlot>,
    retired: SyncSender<ExecutionInstance>,
    events: EventSender,
    active: Option<ExecutionInstance>,
    faulted: bool,
    perf: PerfStats,
    sample_rate: u32,
}

impl SampleDriver {
    pub fn new(
        slot: Arc<InstanceSlot>,
        retired: SyncSender<ExecutionInstance>,
        events: EventSender,
        sample_rate: u32,
    ) -> Self {
        Self {
            slot,
            retired,
            events,
            active: None,
            faulted: false,
            perf: PerfStats::default(),
            sample_rate,
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn is_ready(&self) -> bool {
        self.active.is_some()
    }

    pub fn active_generation(&self) -> Option<u64> {
        self.active.as_ref().map(ExecutionInstance::generation)
    }

    pub fn perf(&self) -> PerfStats {
        self.perf
    }

    /// Renders one host buffer. `outputs` holds one slice per channel, all
    /// of the same length. Channels are expected to be pre-cleared by the
    /// host; frames the module does not produce are left untouched.
    ///
    /// Always returns `true`: the processor never asks to be stopped.
    pub fn process(&mut self, outputs: &mut [&mut [f32]]) -> bool {
        self.pickup();

        if self.faulted {
            return true;
        }
        let Some(instance) = self.active.as_mut() else {
            return true;
        };
        if !instance.has_sample_entry() {
            return true;
        }
        let Some((first, rest)) = outputs.split_first_mut() else {
            return true;
        };

        let frames = first.len();
        let started = Instant::now();
        for frame in 0..frames {
            match instance.next_sample() {
                Some(Ok(sample)) => {
                    first[frame] = sample;
                    for channel in rest.iter_mut() {
                        if let Some(out) = channel.get_mut(frame) {
                            *out = sample;
                        }
                    }
                }
                Some(Err(trap)) => {
                    self.faulted = true;
                    self.events.post(ProcessorEvent::error(format!(
                        "{NEXT_SAMPLE_EXPORT} trapped: {}",
                        trap.root_cause()
                    )));
                    break;
                }
                None => break,
            }
        }
        let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;

        if self.perf.record(elapsed_ms) {
            self.events.post(ProcessorEvent::Perf {
                avg_ms: self.perf.average_ms(),
                max_ms: self.perf.max_ms,
                buffer_size: frames,
                sample_rate: self.sample_rate,
            });
        }
        true
    }

    fn pickup(&mut self) {
        let Some(next) = self.slot.try_take() else {
            return;
        };
        if let Some(old) = self.active.replace(next) {
            // A full retire queue means the old instance is dropped here.
            let _ = self.retired.try_send(old);
        }
        self.perf = PerfStats::default();
        self.faulted = false;
    }
}

#[cfg(test)]
#[path = "test_driver.rs"]
mod tests;
