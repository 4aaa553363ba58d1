use super::*;

#[test]
fn test_perf_event_wire_shape() {
    let event = ProcessorEvent::Perf {
        avg_ms: 0.5,
        max_ms: 1.25,
        buffer_size: 128,
        sample_rate: 48_000,
    };
    let value: serde_json::Value = serde_json::from_str(&event.to_json()).unwrap();
    assert_eq!(value["type"], "perf");
    assert_eq!(value["avgMs"], 0.5);
    assert_eq!(value["maxMs"], 1.25);
    assert_eq!(value["bufferSize"], 128);
    assert_eq!(value["sampleRate"], 48_000);
}

#[test]
fn test_log_event_uses_stdout_tag_and_accepts_log() {
    let event = ProcessorEvent::log("hello\n");
    assert_eq!(event.to_json(), r#"{"type":"stdout","text":"hello\n"}"#);

    let parsed: ProcessorEvent = serde_json::from_str(r#"{"type":"log","text":"hi"}"#).unwrap();
    assert_eq!(parsed, ProcessorEvent::log("hi"));
}

#[test]
fn test_ready_and_error_wire_shape() {
    assert_eq!(ProcessorEvent::Ready.to_json(), r#"{"type":"ready"}"#);
    assert_eq!(
        ProcessorEvent::error("boom").to_json(),
        r#"{"type":"error","message":"boom"}"#
    );
}

#[test]
fn test_events_arrive_in_send_order() {
    let (tx, mut rx) = event_channel();
    tx.post(ProcessorEvent::log("a"));
    tx.post(ProcessorEvent::Ready);
    tx.post(ProcessorEvent::log("b"));

    assert_eq!(
        rx.drain(),
        vec![
            ProcessorEvent::log("a"),
            ProcessorEvent::Ready,
            ProcessorEvent::log("b"),
        ]
    );
}

#[test]
fn test_post_after_receiver_dropped_is_silent() {
    let (tx, rx) = event_channel();
    drop(rx);
    assert!(!tx.is_connected());
    tx.post(ProcessorEvent::Ready);
}
