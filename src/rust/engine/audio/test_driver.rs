use super::*;
use crate::engine::bridge::{EventReceiver, event_channel};
use crate::engine::runtime::Bootstrapper;
use crate::engine::test_fixtures::{self, module};

struct Rig {
    driver: SampleDriver,
    slot: Arc<InstanceSlot>,
    retired: Receiver<ExecutionInstance>,
    boot: Bootstrapper,
    events: EventReceiver,
}

impl Rig {
    fn new() -> Self {
        let (tx, events) = event_channel();
        let slot = Arc::new(InstanceSlot::new());
        let (retire_tx, retired) = retire_channel();
        let driver = SampleDriver::new(slot.clone(), retire_tx, tx.clone(), 48_000);
        let boot = Bootstrapper::new(tx).unwrap();
        Self {
            driver,
            slot,
            retired,
            boot,
            events,
        }
    }

    fn install(&self, wat: &str, generation: u64) {
        let instance = self.boot.bootstrap_blocking(module(wat), generation).unwrap();
        assert!(self.slot.offer(instance).is_none());
    }

    fn render(&mut self, frames: usize, channels: usize) -> Vec<Vec<f32>> {
        let mut buffers = vec![vec![0.0f32; frames]; channels];
        {
            let mut outputs: Vec<&mut [f32]> =
                buffers.iter_mut().map(|b| b.as_mut_slice()).collect();
            assert!(self.driver.process(&mut outputs));
        }
        buffers
    }

    fn perf_events(&mut self) -> Vec<ProcessorEvent> {
        self.events
            .drain()
            .into_iter()
            .filter(|e| matches!(e, ProcessorEvent::Perf { .. }))
            .collect()
    }
}

#[test]
fn test_not_ready_leaves_buffers_untouched() {
    let mut rig = Rig::new();
    let mut left = vec![9.0f32; 8];
    let mut right = vec![9.0f32; 8];
    for _ in 0..1_000 {
        let mut outputs: Vec<&mut [f32]> = vec![left.as_mut_slice(), right.as_mut_slice()];
        assert!(rig.driver.process(&mut outputs));
    }
    assert!(left.iter().chain(right.iter()).all(|&s| s == 9.0));
    assert!(!rig.driver.is_ready());
    assert!(rig.perf_events().is_empty());
}

#[test]
fn test_calls_entry_once_per_frame_and_replicates_mono() {
    let mut rig = Rig::new();
    rig.install(test_fixtures::COUNTER, 1);

    let buffers_count = 5;
    let frames = 16;
    let mut expected = 0.0f32;
    for _ in 0..buffers_count {
        let buffers = rig.render(frames, 3);
        for frame in 0..frames {
            expected += 1.0;
            assert_eq!(buffers[0][frame], expected);
            assert_eq!(buffers[1][frame], buffers[0][frame]);
            assert_eq!(buffers[2][frame], buffers[0][frame]);
        }
    }
    // one call per frame: the counter reached N * L
    assert_eq!(expected, (buffers_count * frames) as f32);
    assert_eq!(rig.driver.perf().call_count, buffers_count as u64);
}

#[test]
fn test_single_channel_output_is_supported() {
    let mut rig = Rig::new();
    rig.install(&test_fixtures::constant(0.5), 1);
    let buffers = rig.render(4, 1);
    assert_eq!(buffers[0], vec![0.5; 4]);
}

#[test]
fn test_perf_reported_every_500_buffers() {
    let mut rig = Rig::new();
    rig.install(&test_fixtures::constant(0.1), 1);

    for call in 1..=1_200u64 {
        rig.render(4, 2);
        let reports = rig.perf_events();
        if call % PERF_REPORT_INTERVAL == 0 {
            assert_eq!(reports.len(), 1, "expected a report at call {call}");
            match &reports[0] {
                ProcessorEvent::Perf {
                    avg_ms,
                    max_ms,
                    buffer_size,
                    sample_rate,
                } => {
                    let stats = rig.driver.perf();
                    assert_eq!(stats.call_count, call);
                    assert_eq!(*avg_ms, stats.total_ms / call as f64);
                    assert!(*max_ms >= *avg_ms);
                    assert_eq!(*buffer_size, 4);
                    assert_eq!(*sample_rate, 48_000);
                }
                other => panic!("unexpected {other:?}"),
            }
        } else {
            assert!(reports.is_empty(), "unexpected report at call {call}");
        }
    }
}

#[test]
fn test_missing_entry_point_produces_nothing() {
    let mut rig = Rig::new();
    rig.install(test_fixtures::NO_SAMPLE_ENTRY, 1);
    let mut left = vec![3.0f32; 4];
    {
        let mut outputs: Vec<&mut [f32]> = vec![left.as_mut_slice()];
        assert!(rig.driver.process(&mut outputs));
    }
    assert!(rig.driver.is_ready());
    assert_eq!(left, vec![3.0; 4]);
}

#[test]
fn test_new_instance_replaces_old_and_resets_perf() {
    let mut rig = Rig::new();
    rig.install(&test_fixtures::constant(0.1), 1);
    rig.render(4, 2);
    rig.render(4, 2);
    assert_eq!(rig.driver.perf().call_count, 2);

    rig.install(&test_fixtures::constant(0.2), 2);
    let buffers = rig.render(4, 2);
    assert_eq!(buffers[0], vec![0.2; 4]);
    assert_eq!(rig.driver.active_generation(), Some(2));
    assert_eq!(rig.driver.perf().call_count, 1);

    let retired = rig.retired.try_recv().unwrap();
    assert_eq!(retired.generation(), 1);
}

#[test]
fn test_trap_silences_instance_and_reports_once() {
    let mut rig = Rig::new();
    rig.install(test_fixtures::TRAPS_ON_THIRD_SAMPLE, 1);

    let first = rig.render(4, 2);
    assert_eq!(first[0], vec![0.5, 0.5, 0.0, 0.0]);
    assert_eq!(first[1], first[0]);

    let second = rig.render(4, 2);
    assert_eq!(second[0], vec![0.0; 4]);

    let errors: Vec<_> = rig
        .events
        .drain()
        .into_iter()
        .filter(|e| matches!(e, ProcessorEvent::Error { .. }))
        .collect();
    assert_eq!(errors.len(), 1);

    // a fresh instance clears the fault
    rig.install(&test_fixtures::constant(0.3), 2);
    assert_eq!(rig.render(2, 1)[0], vec![0.3, 0.3]);
}

#[test]
fn test_contended_slot_defers_pickup() {
    let mut rig = Rig::new();
    rig.install(&test_fixtures::constant(0.4), 1);
    {
        let _guard = rig.slot.pending.lock().unwrap();
        let mut left = vec![0.0f32; 2];
        let mut outputs: Vec<&mut [f32]> = vec![left.as_mut_slice()];
        assert!(rig.driver.process(&mut outputs));
        assert!(!rig.driver.is_ready());
    }
    assert_eq!(rig.render(2, 1)[0], vec![0.4, 0.4]);
}
