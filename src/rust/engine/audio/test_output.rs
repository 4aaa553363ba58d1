use super::*;
use crate::engine::processor::Processor;
use crate::engine::test_fixtures::{self, module};

#[test]
fn test_source_is_silent_until_ready() {
    let processor = Processor::new(22_050).unwrap();
    let mut source = DriverSource::new(processor.driver, 2, 8);

    assert_eq!(source.channels(), 2);
    assert_eq!(source.sample_rate(), 22_050);
    assert!(source.total_duration().is_none());
    let samples: Vec<f32> = source.by_ref().take(32).collect();
    assert_eq!(samples, vec![0.0; 32]);
}

#[tokio::test]
async fn test_source_interleaves_driver_output() {
    let Processor {
        driver, service, ..
    } = Processor::new(48_000).unwrap();
    let installer = service.installer();
    let generation = installer.next_generation();
    installer.install(module(test_fixtures::COUNTER), generation).await;

    let mut source = DriverSource::new(driver, 2, 4);
    let samples: Vec<f32> = source.by_ref().take(16).collect();
    // counter 1..=8, each frame duplicated on both channels
    let expected: Vec<f32> = (1..=8).flat_map(|v| [v as f32, v as f32]).collect();
    assert_eq!(samples, expected);
    assert_eq!(source.driver().perf().call_count, 2);
}

#[test]
fn test_degenerate_shapes_are_clamped() {
    let processor = Processor::new(8_000).unwrap();
    let source = DriverSource::new(processor.driver, 0, 0);
    assert_eq!(source.channels(), 1);
    assert_eq!(source.block_size(), 1);

    let processor = Processor::new(8_000).unwrap();
    let source = DriverSource::new(processor.driver, 12, 4);
    assert_eq!(source.channels(), MAX_CHANNELS);
}

#[tokio::test]
async fn test_surround_layout_repeats_mono_output() {
    let Processor {
        driver, service, ..
    } = Processor::new(48_000).unwrap();
    let installer = service.installer();
    let generation = installer.next_generation();
    installer.install(module(test_fixtures::COUNTER), generation).await;

    let mut source = DriverSource::new(driver, 6, 2);
    let samples: Vec<f32> = source.by_ref().take(24).collect();
    let expected: Vec<f32> = (1..=4).flat_map(|v| [v as f32; 6]).collect();
    assert_eq!(samples, expected);
}
