//! WebAssembly text fixtures shaped like harness output.

use crate::engine::runtime::CompiledModule;

/// Prints a banner from `_start`, exits cleanly, counts up from 1.0 per
/// sample after `init()` has set the step.
pub const COUNTER: &str = r#"
(module
  (import "wasi_unstable" "fd_write" (func $fd_write (param i32 i32 i32 i32) (result i32)))
  (import "wasi_unstable" "proc_exit" (func $exit (param i32)))
  (memory (export "memory") 1)
  (data (i32.const 16) "\40\00\00\00\07\00\00\00")
  (data (i32.const 64) "banner\n")
  (global $step (mut f32) (f32.const 0))
  (global $value (mut f32) (f32.const 0))
  (func (export "_start")
    (drop (call $fd_write (i32.const 1) (i32.const 16) (i32.const 1) (i32.const 32)))
    (call $exit (i32.const 0)))
  (func (export "hear_c_init")
    (global.set $step (f32.const 1)))
  (func (export "hear_c_next_sample") (result f32)
    (global.set $value (f32.add (global.get $value) (global.get $step)))
    (global.get $value))
)
"#;

/// Always produces the same constant sample.
pub fn constant(value: f32) -> String {
    format!(
        r#"
(module
  (memory (export "memory") 1)
  (func (export "hear_c_next_sample") (result f32) (f32.const {value})))
"#
    )
}

pub const INIT_TRAPS: &str = r#"
(module
  (memory (export "memory") 1)
  (func (export "hear_c_init") unreachable)
  (func (export "hear_c_next_sample") (result f32) (f32.const 0.5)))
"#;

pub const START_TRAPS: &str = r#"
(module
  (memory (export "memory") 1)
  (func (export "_start") unreachable)
  (func (export "hear_c_next_sample") (result f32) (f32.const 0.25)))
"#;

pub const START_EXITS_NONZERO: &str = r#"
(module
  (import "wasi_unstable" "proc_exit" (func $exit (param i32)))
  (memory (export "memory") 1)
  (func (export "_start") (call $exit (i32.const 2)))
  (func (export "hear_c_next_sample") (result f32) (f32.const 0.25)))
"#;

pub const NO_SAMPLE_ENTRY: &str = r#"
(module
  (memory (export "memory") 1)
  (func (export "_start")))
"#;

pub const UNKNOWN_IMPORT: &str = r#"
(module
  (import "env" "emscripten_set_main_loop" (func (param i32 i32 i32)))
  (memory (export "memory") 1))
"#;

/// Traps on the third sample.
pub const TRAPS_ON_THIRD_SAMPLE: &str = r#"
(module
  (memory (export "memory") 1)
  (global $count (mut i32) (i32.const 0))
  (func (export "hear_c_next_sample") (result f32)
    (global.set $count (i32.add (global.get $count) (i32.const 1)))
    (if (i32.eq (global.get $count) (i32.const 3)) (then unreachable))
    (f32.const 0.5)))
"#;

pub fn module(wat: &str) -> CompiledModule {
    CompiledModule::from_bytes(wat::parse_str(wat).expect("fixture parses"))
        .expect("fixture header")
}
