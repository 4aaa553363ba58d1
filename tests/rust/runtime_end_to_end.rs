use std::time::Duration;

use hear_c::engine::bridge::ProcessorEvent;
use hear_c::engine::processor::Processor;
use hear_c::engine::runtime::CompiledModule;

const HARNESS_LIKE: &str = r#"
(module
  (import "wasi_unstable" "fd_write" (func $fd_write (param i32 i32 i32 i32) (result i32)))
  (import "wasi_unstable" "proc_exit" (func $exit (param i32)))
  (memory (export "memory") 1)
  (data (i32.const 16) "\40\00\00\00\0d\00\00\00")
  (data (i32.const 64) "Init called!\n")
  (global $level (mut f32) (f32.const 0))
  (func (export "_start") (call $exit (i32.const 0)))
  (func (export "hear_c_init")
    (drop (call $fd_write (i32.const 1) (i32.const 16) (i32.const 1) (i32.const 32)))
    (global.set $level (f32.const 0.75)))
  (func (export "hear_c_next_sample") (result f32) (global.get $level)))
"#;

#[tokio::test]
async fn module_plays_after_ready_and_prints_during_init() {
    let Processor {
        mut port,
        mut driver,
        service,
    } = Processor::new(44_100).unwrap();
    tokio::spawn(service.run());

    let mut silent = [0.0f32; 8];
    driver.process(&mut [silent.as_mut_slice()]);
    assert_eq!(silent, [0.0; 8]);

    let module = CompiledModule::from_bytes(wat::parse_str(HARNESS_LIKE).unwrap()).unwrap();
    assert!(port.init(module));

    let mut printed = String::new();
    loop {
        let event = tokio::time::timeout(Duration::from_secs(10), port.next_event())
            .await
            .expect("event in time")
            .expect("processor alive");
        match event {
            ProcessorEvent::Log { text } => printed.push_str(&text),
            ProcessorEvent::Ready => break,
            other => panic!("unexpected event {other:?}"),
        }
    }
    assert!(printed.contains("Init called!"));

    let mut left = [0.0f32; 8];
    let mut right = [0.0f32; 8];
    driver.process(&mut [left.as_mut_slice(), right.as_mut_slice()]);
    assert_eq!(left, [0.75; 8]);
    assert_eq!(right, [0.75; 8]);
}
