use super::*;
use crate::engine::bridge::event_channel;
use crate::engine::test_fixtures::{self, module};

#[test]
fn test_bootstrap_runs_start_then_init_then_resolves_entry() {
    let (tx, mut rx) = event_channel();
    let boot = Bootstrapper::new(tx).unwrap();

    let mut instance = boot
        .bootstrap_blocking(module(test_fixtures::COUNTER), 7)
        .unwrap();

    assert_eq!(instance.generation(), 7);
    assert_eq!(instance.startup(), &StartupOutcome::Exited);
    assert!(instance.has_sample_entry());
    assert_eq!(instance.memory_len(), 65_536);
    // init() set the step to 1.0, so the counter starts at 1.0
    assert_eq!(instance.next_sample().unwrap().unwrap(), 1.0);
    assert_eq!(instance.next_sample().unwrap().unwrap(), 2.0);
    assert_eq!(rx.drain(), vec![ProcessorEvent::log("banner\n")]);
}

#[test]
fn test_start_trap_is_a_warning_not_a_failure() {
    let (tx, mut rx) = event_channel();
    let boot = Bootstrapper::new(tx).unwrap();

    let mut instance = boot
        .bootstrap_blocking(module(test_fixtures::START_TRAPS), 1)
        .unwrap();

    assert!(matches!(instance.startup(), StartupOutcome::Warned(_)));
    assert_eq!(instance.next_sample().unwrap().unwrap(), 0.25);
    let events = rx.drain();
    assert_eq!(events.len(), 1);
    match &events[0] {
        ProcessorEvent::Log { text } => {
            assert!(text.starts_with("Warning: _start() threw: "));
            assert!(text.ends_with('\n'));
        }
        other => panic!("unexpected event {other:?}"),
    }
}

#[test]
fn test_nonzero_exit_during_start_is_a_warning() {
    let (tx, _rx) = event_channel();
    let boot = Bootstrapper::new(tx).unwrap();

    let instance = boot
        .bootstrap_blocking(module(test_fixtures::START_EXITS_NONZERO), 1)
        .unwrap();

    assert_eq!(
        instance.startup(),
        &StartupOutcome::Warned(StartupWarning {
            message: "module exited with code 2".to_string()
        })
    );
}

#[test]
fn test_user_init_failure_fails_bootstrap() {
    let (tx, _rx) = event_channel();
    let boot = Bootstrapper::new(tx).unwrap();

    let err = boot
        .bootstrap_blocking(module(test_fixtures::INIT_TRAPS), 1)
        .unwrap_err();
    assert!(matches!(err, InitError::UserInit(_)));
}

#[test]
fn test_missing_sample_entry_still_bootstraps() {
    let (tx, _rx) = event_channel();
    let boot = Bootstrapper::new(tx).unwrap();

    let mut instance = boot
        .bootstrap_blocking(module(test_fixtures::NO_SAMPLE_ENTRY), 1)
        .unwrap();
    assert_eq!(instance.startup(), &StartupOutcome::Completed);
    assert!(!instance.has_sample_entry());
    assert!(instance.next_sample().is_none());
}

#[test]
fn test_unknown_import_is_an_instantiation_error() {
    let (tx, _rx) = event_channel();
    let boot = Bootstrapper::new(tx).unwrap();

    let err = boot
        .bootstrap_blocking(module(test_fixtures::UNKNOWN_IMPORT), 1)
        .unwrap_err();
    assert!(matches!(err, InitError::Instantiation(_)));
}

#[test]
fn test_malformed_body_is_an_instantiation_error() {
    let (tx, _rx) = event_channel();
    let boot = Bootstrapper::new(tx).unwrap();

    let mut bytes = b"\0asm\x01\0\0\0".to_vec();
    bytes.extend_from_slice(&[0xff, 0x13, 0x37]);
    let err = boot
        .bootstrap_blocking(CompiledModule::from_bytes(bytes).unwrap(), 1)
        .unwrap_err();
    assert!(matches!(err, InitError::Instantiation(_)));
}

#[tokio::test]
async fn test_async_bootstrap_matches_blocking() {
    let (tx, _rx) = event_channel();
    let boot = Bootstrapper::new(tx).unwrap();

    let mut instance = boot
        .bootstrap(module(&test_fixtures::constant(0.75)), 3)
        .await
        .unwrap();
    assert_eq!(instance.generation(), 3);
    assert_eq!(instance.next_sample().unwrap().unwrap(), 0.75);
}
