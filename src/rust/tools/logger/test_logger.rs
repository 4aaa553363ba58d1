use super::*;

#[test]
fn test_plain_line_format() {
    assert_eq!(
        render_plain_line(LogLevel::Warning, "careful"),
        "[Hear-C] [WARN] careful"
    );
    assert_eq!(
        render_plain_line(LogLevel::Print, "Init called!"),
        "[Hear-C] [PRINT] Init called!"
    );
}

#[test]
fn test_module_output_becomes_print_lines() {
    let lines = event_lines(&ProcessorEvent::log("Init called!\nsecond\n"));
    assert_eq!(
        lines,
        vec![
            (LogLevel::Print, "Init called!".to_string()),
            (LogLevel::Print, "second".to_string()),
        ]
    );
    assert!(event_lines(&ProcessorEvent::log("\n")).is_empty());
}

#[test]
fn test_startup_warning_is_a_warning() {
    let lines = event_lines(&ProcessorEvent::log(
        "Warning: _start() threw: wasm trap: unreachable\n",
    ));
    assert_eq!(lines.len(), 1);
    assert_eq!(lines[0].0, LogLevel::Warning);
}

#[test]
fn test_ready_error_and_perf_levels() {
    assert_eq!(
        event_lines(&ProcessorEvent::Ready),
        vec![(LogLevel::Success, "Module ready".to_string())]
    );
    assert_eq!(
        event_lines(&ProcessorEvent::error("init() failed: trap"))[0].0,
        LogLevel::Error
    );

    let perf = event_lines(&ProcessorEvent::Perf {
        avg_ms: 0.25,
        max_ms: 1.5,
        buffer_size: 128,
        sample_rate: 44_100,
    });
    assert_eq!(perf[0].0, LogLevel::Debug);
    assert_eq!(
        perf[0].1,
        "perf: avg 0.250 ms, max 1.500 ms (128 frames @ 44100 Hz, budget 2.90 ms)"
    );
}

#[test]
fn test_verbose_flag() {
    assert!(!Logger::new().is_verbose());
    assert!(Logger::new().with_verbose(true).is_verbose());
}

#[cfg(not(feature = "cli"))]
#[test]
fn test_plain_lines_without_terminal_colors() {
    for level in [
        LogLevel::Success,
        LogLevel::Error,
        LogLevel::Info,
        LogLevel::Warning,
        LogLevel::Watch,
        LogLevel::Debug,
        LogLevel::Print,
        LogLevel::Action,
    ] {
        let line = render_plain_line(level, "message");
        assert!(line.starts_with("[Hear-C] ["));
        assert!(line.ends_with("] message"));
        assert!(!line.contains('\u{1b}'));
    }
    Logger::new().with_verbose(true).debug("plain output");
}
