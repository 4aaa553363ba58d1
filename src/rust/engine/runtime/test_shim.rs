use super::*;
use crate::engine::bridge::{EventReceiver, event_channel};
use wasmtime::{Engine, Instance, Module, Store};

const SHIM_PROBE: &str = r#"
(module
  (import "wasi_unstable" "fd_write" (func $fd_write (param i32 i32 i32 i32) (result i32)))
  (import "wasi_unstable" "fd_read" (func $fd_read (param i32 i32 i32 i32) (result i32)))
  (import "wasi_unstable" "random_get" (func $random_get (param i32 i32) (result i32)))
  (import "wasi_unstable" "clock_time_get" (func $clock (param i32 i64 i32) (result i32)))
  (import "wasi_unstable" "args_sizes_get" (func $args_sizes (param i32 i32) (result i32)))
  (import "wasi_unstable" "environ_sizes_get" (func $env_sizes (param i32 i32) (result i32)))
  (import "wasi_unstable" "fd_prestat_get" (func $prestat (param i32 i32) (result i32)))
  (import "wasi_unstable" "fd_prestat_dir_name" (func $dir_name (param i32 i32 i32) (result i32)))
  (import "wasi_unstable" "path_open"
    (func $path_open (param i32 i32 i32 i32 i32 i64 i64 i32 i32) (result i32)))
  (import "wasi_unstable" "proc_exit" (func $exit (param i32)))
  (memory (export "memory") 1)
  ;; two iovecs at 16: (64, 3) and (80, 3)
  (data (i32.const 16) "\40\00\00\00\03\00\00\00\50\00\00\00\03\00\00\00")
  (data (i32.const 64) "hel")
  (data (i32.const 80) "lo\n")
  (data (i32.const 100) "\ff\ff\ff\ff\ff\ff\ff\ff\ff\ff\ff\ff\ff\ff\ff\ff")
  (func (export "write") (param i32) (result i32)
    (call $fd_write (local.get 0) (i32.const 16) (i32.const 2) (i32.const 32)))
  (func (export "write_oob") (result i32)
    (call $fd_write (i32.const 1) (i32.const 65530) (i32.const 2) (i32.const 32)))
  (func (export "read") (result i32)
    (call $fd_read (i32.const 0) (i32.const 16) (i32.const 1) (i32.const 108)))
  (func (export "random") (param i32 i32) (result i32)
    (call $random_get (local.get 0) (local.get 1)))
  (func (export "clock") (result i32)
    (call $clock (i32.const 0) (i64.const 1) (i32.const 40)))
  (func (export "args") (result i32)
    (call $args_sizes (i32.const 100) (i32.const 104)))
  (func (export "environ") (result i32)
    (call $env_sizes (i32.const 108) (i32.const 112)))
  (func (export "prestat") (param i32) (result i32)
    (call $prestat (local.get 0) (i32.const 48)))
  (func (export "dir_name") (param i32) (result i32)
    (call $dir_name (local.get 0) (i32.const 48) (i32.const 4)))
  (func (export "open") (param i32 i32) (result i32)
    (call $path_open (local.get 0) (i32.const 0) (local.get 1) (i32.const 4)
      (i32.const 0) (i64.const 0) (i64.const 0) (i32.const 0) (i32.const 48)))
  (func (export "exit") (param i32)
    (call $exit (local.get 0)))
)
"#;

struct Probe {
    store: Store<ShimState>,
    instance: Instance,
    events: EventReceiver,
}

impl Probe {
    fn new(wat: &str) -> Self {
        let engine = Engine::default();
        let mut linker = Linker::new(&engine);
        add_to_linker(&mut linker).unwrap();
        let module = Module::new(&engine, wat).unwrap();
        let (tx, events) = event_channel();
        let mut store = Store::new(&engine, ShimState::new(tx));
        let instance = linker.instantiate(&mut store, &module).unwrap();
        Self {
            store,
            instance,
            events,
        }
    }

    fn call0(&mut self, name: &str) -> i32 {
        let func = self
            .instance
            .get_typed_func::<(), i32>(&mut self.store, name)
            .unwrap();
        func.call(&mut self.store, ()).unwrap()
    }

    fn call1(&mut self, name: &str, arg: i32) -> i32 {
        let func = self
            .instance
            .get_typed_func::<i32, i32>(&mut self.store, name)
            .unwrap();
        func.call(&mut self.store, arg).unwrap()
    }

    fn call2(&mut self, name: &str, a: i32, b: i32) -> i32 {
        let func = self
            .instance
            .get_typed_func::<(i32, i32), i32>(&mut self.store, name)
            .unwrap();
        func.call(&mut self.store, (a, b)).unwrap()
    }

    fn bytes(&mut self, offset: usize, len: usize) -> Vec<u8> {
        let memory = self
            .instance
            .get_memory(&mut self.store, "memory")
            .unwrap();
        memory.data(&self.store)[offset..offset + len].to_vec()
    }

    fn u32_at(&mut self, offset: usize) -> u32 {
        let raw = self.bytes(offset, 4);
        u32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]])
    }
}

#[test]
fn test_fd_write_stdout_forwards_text_and_count() {
    let mut probe = Probe::new(SHIM_PROBE);
    assert_eq!(probe.call1("write", 1), ERRNO_SUCCESS);
    assert_eq!(probe.u32_at(32), 6);
    assert_eq!(probe.events.drain(), vec![ProcessorEvent::log("hello\n")]);
}

#[test]
fn test_fd_write_stderr_is_forwarded_too() {
    let mut probe = Probe::new(SHIM_PROBE);
    assert_eq!(probe.call1("write", 2), ERRNO_SUCCESS);
    assert_eq!(probe.events.drain(), vec![ProcessorEvent::log("hello\n")]);
}

#[test]
fn test_fd_write_other_fd_counts_but_stays_silent() {
    let mut probe = Probe::new(SHIM_PROBE);
    assert_eq!(probe.call1("write", 5), ERRNO_SUCCESS);
    assert_eq!(probe.u32_at(32), 6);
    assert!(probe.events.drain().is_empty());
}

#[test]
fn test_fd_write_out_of_bounds_iovec_traps_guest() {
    let mut probe = Probe::new(SHIM_PROBE);
    let func = probe
        .instance
        .get_typed_func::<(), i32>(&mut probe.store, "write_oob")
        .unwrap();
    assert!(func.call(&mut probe.store, ()).is_err());
}

#[test]
fn test_fd_write_without_memory_reports_errno() {
    let wat = r#"
    (module
      (import "wasi_unstable" "fd_write" (func $fd_write (param i32 i32 i32 i32) (result i32)))
      (func (export "write") (result i32)
        (call $fd_write (i32.const 1) (i32.const 0) (i32.const 0) (i32.const 0))))
    "#;
    let mut probe = Probe::new(wat);
    assert_eq!(probe.call0("write"), ERRNO_NO_MEMORY);
}

#[test]
fn test_fd_read_reports_zero_bytes() {
    let mut probe = Probe::new(SHIM_PROBE);
    assert_eq!(probe.call0("read"), ERRNO_SUCCESS);
    assert_eq!(probe.u32_at(108), 0);
}

#[test]
fn test_args_and_environ_are_empty() {
    let mut probe = Probe::new(SHIM_PROBE);
    assert_eq!(probe.call0("args"), ERRNO_SUCCESS);
    assert_eq!(probe.call0("environ"), ERRNO_SUCCESS);
    assert_eq!(probe.bytes(100, 16), vec![0u8; 16]);
}

#[test]
fn test_random_get_is_not_seeded() {
    let mut probe = Probe::new(SHIM_PROBE);
    assert_eq!(probe.call2("random", 200, 16), ERRNO_SUCCESS);
    let first = probe.bytes(200, 16);
    assert_eq!(probe.call2("random", 200, 16), ERRNO_SUCCESS);
    let second = probe.bytes(200, 16);
    assert_ne!(first, second);
}

#[test]
fn test_clock_time_get_writes_wall_clock_nanos() {
    let mut probe = Probe::new(SHIM_PROBE);
    let before = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_nanos() as u64;
    assert_eq!(probe.call0("clock"), ERRNO_SUCCESS);
    let raw = probe.bytes(40, 8);
    let written = u64::from_le_bytes(raw.try_into().unwrap());
    assert!(written >= before);
    assert!(written - before < 60_000_000_000);
}

#[test]
fn test_filesystem_calls_always_fail() {
    let mut probe = Probe::new(SHIM_PROBE);
    for fd in [-1, 0, 3, 4, 1024] {
        assert_eq!(probe.call1("prestat", fd), ERRNO_BADF);
        assert_eq!(probe.call1("dir_name", fd), ERRNO_NOENT);
        assert_eq!(probe.call2("open", fd, 64), ERRNO_NOENT);
    }
}

#[test]
fn test_proc_exit_unwinds_guest_and_records_code() {
    let mut probe = Probe::new(SHIM_PROBE);
    let func = probe
        .instance
        .get_typed_func::<i32, ()>(&mut probe.store, "exit")
        .unwrap();
    let err = func.call(&mut probe.store, 3).unwrap_err();
    assert_eq!(err.downcast_ref::<ModuleExit>(), Some(&ModuleExit(3)));
    assert_eq!(probe.store.data().exit_code(), Some(3));
}

#[test]
fn test_preview1_namespace_is_linked() {
    let wat = r#"
    (module
      (import "wasi_snapshot_preview1" "fd_write"
        (func $fd_write (param i32 i32 i32 i32) (result i32)))
      (memory (export "memory") 1)
      (data (i32.const 16) "\40\00\00\00\02\00\00\00")
      (data (i32.const 64) "ok")
      (func (export "write") (result i32)
        (call $fd_write (i32.const 1) (i32.const 16) (i32.const 1) (i32.const 32))))
    "#;
    let mut probe = Probe::new(wat);
    assert_eq!(probe.call0("write"), ERRNO_SUCCESS);
    assert_eq!(probe.events.drain(), vec![ProcessorEvent::log("ok")]);
}
