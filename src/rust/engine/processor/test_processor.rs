use std::sync::atomic::Ordering;
use std::time::Duration;

use super::*;
use crate::engine::test_fixtures::{self, module};

async fn expect_event(port: &mut ProcessorPort) -> ProcessorEvent {
    tokio::time::timeout(Duration::from_secs(10), port.next_event())
        .await
        .expect("event within timeout")
        .expect("event channel open")
}

fn render(driver: &mut SampleDriver, frames: usize) -> Vec<f32> {
    let mut mono = vec![0.0f32; frames];
    {
        let mut outputs: Vec<&mut [f32]> = vec![mono.as_mut_slice()];
        assert!(driver.process(&mut outputs));
    }
    mono
}

#[tokio::test]
async fn test_init_posts_ready_and_driver_plays() {
    let Processor {
        mut port,
        mut driver,
        service,
    } = Processor::new(44_100).unwrap();
    let handle = tokio::spawn(service.run());

    assert!(port.init(module(&test_fixtures::constant(0.5))));
    assert_eq!(expect_event(&mut port).await, ProcessorEvent::Ready);
    assert_eq!(render(&mut driver, 4), vec![0.5; 4]);
    assert_eq!(driver.active_generation(), Some(1));

    drop(port);
    tokio::time::timeout(Duration::from_secs(10), handle)
        .await
        .unwrap()
        .unwrap();
}

#[tokio::test]
async fn test_failed_init_keeps_previous_instance() {
    let Processor {
        mut port,
        mut driver,
        service,
    } = Processor::new(44_100).unwrap();
    tokio::spawn(service.run());

    port.init(module(&test_fixtures::constant(0.5)));
    assert_eq!(expect_event(&mut port).await, ProcessorEvent::Ready);
    render(&mut driver, 2);

    port.init(module(test_fixtures::INIT_TRAPS));
    match expect_event(&mut port).await {
        ProcessorEvent::Error { message } => assert!(message.starts_with("init() failed")),
        other => panic!("unexpected {other:?}"),
    }

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(port.events_mut().drain().is_empty(), "no ready after failure");
    assert_eq!(render(&mut driver, 3), vec![0.5; 3]);
    assert_eq!(driver.active_generation(), Some(1));
}

#[tokio::test]
async fn test_instantiation_failure_reports_one_error() {
    let Processor {
        mut port,
        mut driver,
        service,
    } = Processor::new(44_100).unwrap();
    tokio::spawn(service.run());

    port.init(module(test_fixtures::UNKNOWN_IMPORT));
    assert!(matches!(
        expect_event(&mut port).await,
        ProcessorEvent::Error { .. }
    ));
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(port.events_mut().drain().is_empty());
    assert!(!driver.is_ready());
    render(&mut driver, 2);
    assert!(!driver.is_ready());
}

#[tokio::test]
async fn test_stale_completion_is_discarded() {
    let Processor {
        mut port,
        mut driver,
        service,
    } = Processor::new(44_100).unwrap();
    let installer = service.installer();

    let older = installer.next_generation();
    let newer = installer.next_generation();
    assert_eq!(installer.latest_generation(), newer);

    let outcome = installer
        .install(module(&test_fixtures::constant(0.1)), older)
        .await;
    assert!(matches!(outcome, InstallOutcome::Stale));
    assert!(port.events_mut().drain().is_empty());
    assert!(!driver.is_ready());

    let outcome = installer
        .install(module(&test_fixtures::constant(0.2)), newer)
        .await;
    assert!(matches!(outcome, InstallOutcome::Installed));
    assert_eq!(port.events_mut().drain(), vec![ProcessorEvent::Ready]);
    assert_eq!(render(&mut driver, 2), vec![0.2; 2]);
}

#[tokio::test]
async fn test_stale_failure_is_still_reported() {
    let Processor {
        mut port, service, ..
    } = Processor::new(44_100).unwrap();
    let installer = service.installer();

    let older = installer.next_generation();
    installer.next_generation();
    let outcome = installer
        .install(module(test_fixtures::INIT_TRAPS), older)
        .await;
    assert!(matches!(
        outcome,
        InstallOutcome::Failed(InitError::UserInit(_))
    ));
    assert_eq!(port.events_mut().drain().len(), 1);
}

#[tokio::test]
async fn test_swapped_out_instances_are_collected() {
    let Processor {
        mut driver,
        service,
        ..
    } = Processor::new(44_100).unwrap();
    let installer = service.installer();

    let first = installer.next_generation();
    installer
        .install(module(&test_fixtures::constant(0.1)), first)
        .await;
    render(&mut driver, 1);

    let second = installer.next_generation();
    installer
        .install(module(&test_fixtures::constant(0.2)), second)
        .await;
    render(&mut driver, 1);

    assert_eq!(service.collect_retired(), 1);
    assert_eq!(service.collect_retired(), 0);
}

#[tokio::test]
async fn test_running_service_sweeps_retired_instances() {
    let Processor {
        port,
        mut driver,
        service,
    } = Processor::new(44_100).unwrap();
    let installer = service.installer();
    let collected = service.collected_counter();
    let handle = tokio::spawn(service.run());

    for value in [0.1, 0.2] {
        let generation = installer.next_generation();
        installer
            .install(module(&test_fixtures::constant(value)), generation)
            .await;
        render(&mut driver, 1);
    }
    assert_eq!(collected.load(Ordering::Relaxed), 0);

    // no init traffic, so only the periodic sweep can pick it up
    tokio::time::sleep(RETIRE_SWEEP * 3).await;
    assert_eq!(collected.load(Ordering::Relaxed), 1);

    drop(port);
    tokio::time::timeout(Duration::from_secs(10), handle)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(collected.load(Ordering::Relaxed), 1);
}
