//! Guest runtime: the syscall shim offered to compiled modules and the
//! bootstrapper that turns a compiled module into a running instance.

pub mod loader;
pub mod shim;

pub use loader::{Bootstrapper, ExecutionInstance, InitError, StartupOutcome, StartupWarning};
pub use shim::{ModuleExit, ShimState};

use thiserror::Error;

/// Export names of the module ABI produced by the harness.
pub const MEMORY_EXPORT: &str = "memory";
pub const START_EXPORT: &str = "_start";
pub const USER_INIT_EXPORT: &str = "hear_c_init";
pub const NEXT_SAMPLE_EXPORT: &str = "hear_c_next_sample";

const WASM_MAGIC: [u8; 4] = [0x00, 0x61, 0x73, 0x6d];
const WASM_VERSION: [u8; 4] = [0x01, 0x00, 0x00, 0x00];

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ModuleError {
    #[error("compiled module is empty")]
    Empty,
    #[error("compiled module is truncated ({0} bytes)")]
    Truncated(usize),
    #[error("not a WebAssembly binary (bad magic)")]
    BadMagic,
    #[error("unsupported WebAssembly version")]
    BadVersion,
}

/// Opaque compiled artifact handed from a compile backend to the processor.
///
/// Only the header is checked here; full validation happens when the
/// bootstrapper compiles it.
#[derive(Debug)]
pub struct CompiledModule {
    bytes: Vec<u8>,
}

impl CompiledModule {
    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self, ModuleError> {
        if bytes.is_empty() {
            return Err(ModuleError::Empty);
        }
        if bytes.len() < 8 {
            return Err(ModuleError::Truncated(bytes.len()));
        }
        if bytes[0..4] != WASM_MAGIC {
            return Err(ModuleError::BadMagic);
        }
        if bytes[4..8] != WASM_VERSION {
            return Err(ModuleError::BadVersion);
        }
        Ok(Self { bytes })
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }
}

#[cfg(test)]
#[path = "test_module.rs"]
mod tests;
