//! Minimal system-call shim for compiled audio modules.
//!
//! Only the WASI calls that libc startup and a banner-printing `main`
//! need are provided. There is no filesystem, no arguments and no
//! environment; stdout/stderr are forwarded to the controller as log
//! events.
//!
//! ## Memory convention
//!
//! Pointers are `u32` offsets into the module's exported `memory`. The
//! export is looked up again on every call because `memory.grow` may
//! replace the backing buffer between calls. Out-of-range pointers fault
//! the guest (trap) instead of touching host memory.

use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result, anyhow};
use thiserror::Error;
use wasmtime::{Caller, Linker, Memory};

use super::MEMORY_EXPORT;
use crate::engine::bridge::{EventSender, ProcessorEvent};

/// Import modules the shim answers to. Older toolchains emit the first.
pub const SHIM_NAMESPACES: [&str; 2] = ["wasi_unstable", "wasi_snapshot_preview1"];

pub const ERRNO_SUCCESS: i32 = 0;
/// Returned when a pointer-taking call runs before memory is exported.
pub const ERRNO_NO_MEMORY: i32 = 1;
pub const ERRNO_BADF: i32 = 8;
pub const ERRNO_NOENT: i32 = 28;

const STDOUT: i32 = 1;
const STDERR: i32 = 2;
const IOVEC_SIZE: u32 = 8;

/// Raised by `proc_exit` to unwind the guest without touching the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("module exited with code {0}")]
pub struct ModuleExit(pub i32);

/// Host state stored inside each instance's `Store`.
pub struct ShimState {
    events: EventSender,
    exit_code: Option<i32>,
}

impl ShimState {
    pub fn new(events: EventSender) -> Self {
        Self {
            events,
            exit_code: None,
        }
    }

    pub fn events(&self) -> &EventSender {
        &self.events
    }

    pub fn exit_code(&self) -> Option<i32> {
        self.exit_code
    }
}

/// Registers every shim call under each supported namespace.
pub fn add_to_linker(linker: &mut Linker<ShimState>) -> Result<()> {
    for namespace in SHIM_NAMESPACES {
        register(linker, namespace)
            .with_context(|| format!("failed to register shim under '{namespace}'"))?;
    }
    Ok(())
}

fn register(linker: &mut Linker<ShimState>, ns: &str) -> Result<()> {
    linker.func_wrap(ns, "proc_exit", proc_exit)?;
    linker.func_wrap(ns, "fd_write", fd_write)?;
    linker.func_wrap(ns, "fd_read", fd_read)?;
    linker.func_wrap(ns, "args_sizes_get", zero_pair)?;
    linker.func_wrap(ns, "args_get", |_: i32, _: i32| ERRNO_SUCCESS)?;
    linker.func_wrap(ns, "environ_sizes_get", zero_pair)?;
    linker.func_wrap(ns, "environ_get", |_: i32, _: i32| ERRNO_SUCCESS)?;
    linker.func_wrap(ns, "random_get", random_get)?;
    linker.func_wrap(ns, "clock_time_get", clock_time_get)?;
    linker.func_wrap(ns, "poll_oneoff", |_: i32, _: i32, _: i32, _: i32| {
        ERRNO_SUCCESS
    })?;
    linker.func_wrap(ns, "fd_seek", |_: i32, _: i64, _: i32, _: i32| ERRNO_SUCCESS)?;
    linker.func_wrap(ns, "fd_close", |_: i32| ERRNO_SUCCESS)?;
    linker.func_wrap(ns, "fd_fdstat_get", |_: i32, _: i32| ERRNO_SUCCESS)?;
    linker.func_wrap(ns, "fd_prestat_get", |_: i32, _: i32| ERRNO_BADF)?;
    linker.func_wrap(ns, "fd_prestat_dir_name", |_: i32, _: i32, _: i32| {
        ERRNO_NOENT
    })?;
    linker.func_wrap(
        ns,
        "path_open",
        |_: i32, _: i32, _: i32, _: i32, _: i32, _: i64, _: i64, _: i32, _: i32| ERRNO_NOENT,
    )?;
    Ok(())
}

fn proc_exit(mut caller: Caller<'_, ShimState>, code: i32) -> Result<()> {
    caller.data_mut().exit_code = Some(code);
    Err(ModuleExit(code).into())
}

fn fd_write(
    mut caller: Caller<'_, ShimState>,
    fd: i32,
    iovs: i32,
    iovs_len: i32,
    nwritten_out: i32,
) -> Result<i32> {
    let Some(memory) = resolve_memory(&mut caller) else {
        return Ok(ERRNO_NO_MEMORY);
    };

    let mut text = Vec::new();
    let mut total: u32 = 0;
    for index in 0..iovs_len as u32 {
        let record = (iovs as u32)
            .checked_add(index * IOVEC_SIZE)
            .ok_or_else(|| anyhow!("fd_write: iovec table out of bounds"))?;
        let ptr = read_u32(&memory, &caller, record)?;
        let len = read_u32(&memory, &caller, record + 4)?;
        let data = memory.data(&caller);
        let chunk = data
            .get(ptr as usize..ptr as usize + len as usize)
            .ok_or_else(|| anyhow!("fd_write: buffer out of bounds"))?;
        text.extend_from_slice(chunk);
        total = total.wrapping_add(len);
    }

    write_bytes(&memory, &mut caller, nwritten_out as u32, &total.to_le_bytes())?;

    if (fd == STDOUT || fd == STDERR) && !text.is_empty() {
        let text = String::from_utf8_lossy(&text).into_owned();
        caller.data().events.post(ProcessorEvent::log(text));
    }
    Ok(ERRNO_SUCCESS)
}

fn fd_read(
    mut caller: Caller<'_, ShimState>,
    _fd: i32,
    _iovs: i32,
    _iovs_len: i32,
    nread_out: i32,
) -> Result<i32> {
    if let Some(memory) = resolve_memory(&mut caller) {
        write_bytes(&memory, &mut caller, nread_out as u32, &0u32.to_le_bytes())?;
    }
    Ok(ERRNO_SUCCESS)
}

/// Shared by `args_sizes_get` and `environ_sizes_get`: zero entries, zero bytes.
fn zero_pair(mut caller: Caller<'_, ShimState>, count_out: i32, size_out: i32) -> Result<i32> {
    if let Some(memory) = resolve_memory(&mut caller) {
        write_bytes(&memory, &mut caller, count_out as u32, &0u32.to_le_bytes())?;
        write_bytes(&memory, &mut caller, size_out as u32, &0u32.to_le_bytes())?;
    }
    Ok(ERRNO_SUCCESS)
}

fn random_get(mut caller: Caller<'_, ShimState>, buf: i32, buf_len: i32) -> Result<i32> {
    if let Some(memory) = resolve_memory(&mut caller) {
        let start = buf as u32 as usize;
        let end = start + buf_len as u32 as usize;
        let target = memory
            .data_mut(&mut caller)
            .get_mut(start..end)
            .ok_or_else(|| anyhow!("random_get: buffer out of bounds"))?;
        getrandom::getrandom(target).map_err(|e| anyhow!("random_get: {e}"))?;
    }
    Ok(ERRNO_SUCCESS)
}

fn clock_time_get(
    mut caller: Caller<'_, ShimState>,
    _clock_id: i32,
    _precision: i64,
    time_out: i32,
) -> Result<i32> {
    if let Some(memory) = resolve_memory(&mut caller) {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or(0);
        write_bytes(&memory, &mut caller, time_out as u32, &now.to_le_bytes())?;
    }
    Ok(ERRNO_SUCCESS)
}

fn resolve_memory(caller: &mut Caller<'_, ShimState>) -> Option<Memory> {
    caller
        .get_export(MEMORY_EXPORT)
        .and_then(|export| export.into_memory())
}

fn read_u32(memory: &Memory, caller: &Caller<'_, ShimState>, offset: u32) -> Result<u32> {
    let mut raw = [0u8; 4];
    memory
        .read(caller, offset as usize, &mut raw)
        .map_err(|_| anyhow!("read of 4 bytes at {offset:#x} out of bounds"))?;
    Ok(u32::from_le_bytes(raw))
}

fn write_bytes(
    memory: &Memory,
    caller: &mut Caller<'_, ShimState>,
    offset: u32,
    bytes: &[u8],
) -> Result<()> {
    memory
        .write(caller, offset as usize, bytes)
        .map_err(|_| anyhow!("write of {} bytes at {offset:#x} out of bounds", bytes.len()))
}

#[cfg(test)]
#[path = "test_shim.rs"]
mod tests;
