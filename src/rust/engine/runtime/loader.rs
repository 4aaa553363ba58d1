use std::fmt;
use std::sync::Arc;

use thiserror::Error;
use wasmtime::{Engine, Instance, Linker, Memory, Module, Store, TypedFunc};

use super::shim::{self, ModuleExit, ShimState};
use super::{CompiledModule, MEMORY_EXPORT, NEXT_SAMPLE_EXPORT, START_EXPORT, USER_INIT_EXPORT};
use crate::engine::bridge::{EventSender, ProcessorEvent};

/// Reasons a bootstrap attempt installs nothing.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum InitError {
    /// Malformed binary or an import the shim does not provide.
    #[error("failed to instantiate module: {0}")]
    Instantiation(String),
    /// The user's `init()` trapped or exited.
    #[error("init() failed: {0}")]
    UserInit(String),
    #[error("bootstrap task aborted: {0}")]
    Aborted(String),
}

/// A non-fatal failure of the module's `_start`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartupWarning {
    pub message: String,
}

impl fmt::Display for StartupWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Warning: _start() threw: {}", self.message)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StartupOutcome {
    /// The module has no `_start` export.
    Skipped,
    /// `_start` returned normally.
    Completed,
    /// `_start` called `proc_exit(0)`.
    Exited,
    Warned(StartupWarning),
}

/// A live module bound to its store, memory and per-sample entry point.
pub struct ExecutionInstance {
    store: Store<ShimState>,
    memory: Option<Memory>,
    next_sample: Option<TypedFunc<(), f32>>,
    generation: u64,
    startup: StartupOutcome,
}

impl ExecutionInstance {
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn startup(&self) -> &StartupOutcome {
        &self.startup
    }

    pub fn has_sample_entry(&self) -> bool {
        self.next_sample.is_some()
    }

    /// Calls the per-sample entry point once. `None` when the module does
    /// not export one.
    #[inline]
    pub fn next_sample(&mut self) -> Option<wasmtime::Result<f32>> {
        let func = self.next_sample.as_ref()?;
        Some(func.call(&mut self.store, ()))
    }

    /// Current size of the module's linear memory in bytes.
    pub fn memory_len(&self) -> usize {
        self.memory
            .map(|memory| memory.data_size(&self.store))
            .unwrap_or(0)
    }
}

impl fmt::Debug for ExecutionInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutionInstance")
            .field("generation", &self.generation)
            .field("startup", &self.startup)
            .field("has_sample_entry", &self.has_sample_entry())
            .field("memory_len", &self.memory_len())
            .finish()
    }
}

/// Turns compiled modules into running instances.
///
/// Holds its own engine and shim linker; nothing here is process-global.
#[derive(Clone)]
pub struct Bootstrapper {
    engine: Engine,
    linker: Arc<Linker<ShimState>>,
    events: EventSender,
}

impl Bootstrapper {
    pub fn new(events: EventSender) -> anyhow::Result<Self> {
        Self::with_engine(Engine::default(), events)
    }

    pub fn with_engine(engine: Engine, events: EventSender) -> anyhow::Result<Self> {
        let mut linker = Linker::new(&engine);
        shim::add_to_linker(&mut linker)?;
        Ok(Self {
            engine,
            linker: Arc::new(linker),
            events,
        })
    }

    /// Runs the bootstrap on tokio's blocking pool.
    pub async fn bootstrap(
        &self,
        module: CompiledModule,
        generation: u64,
    ) -> Result<ExecutionInstance, InitError> {
        let this = self.clone();
        tokio::task::spawn_blocking(move || this.bootstrap_blocking(module, generation))
            .await
            .map_err(|e| InitError::Aborted(e.to_string()))?
    }

    /// Instantiate, `_start`, `init()`, resolve the sample entry point.
    /// The order matters: `init()` may rely on state set up by `_start`.
    pub fn bootstrap_blocking(
        &self,
        module: CompiledModule,
        generation: u64,
    ) -> Result<ExecutionInstance, InitError> {
        let compiled = Module::new(&self.engine, module.as_bytes())
            .map_err(|e| InitError::Instantiation(format!("{e:#}")))?;

        let mut store = Store::new(&self.engine, ShimState::new(self.events.clone()));
        let instance = self
            .linker
            .instantiate(&mut store, &compiled)
            .map_err(|e| InitError::Instantiation(format!("{e:#}")))?;
        let memory = instance.get_memory(&mut store, MEMORY_EXPORT);

        let startup = self.run_start(&mut store, &instance);
        if let StartupOutcome::Warned(warning) = &startup {
            self.events.post(ProcessorEvent::log(format!("{warning}\n")));
        }

        if let Some(init) = instance.get_func(&mut store, USER_INIT_EXPORT) {
            let init = init
                .typed::<(), ()>(&store)
                .map_err(|e| InitError::UserInit(format!("{e:#}")))?;
            init.call(&mut store, ())
                .map_err(|e| InitError::UserInit(e.root_cause().to_string()))?;
        }

        let next_sample = match instance.get_func(&mut store, NEXT_SAMPLE_EXPORT) {
            None => None,
            Some(func) => match func.typed::<(), f32>(&store) {
                Ok(typed) => Some(typed),
                Err(e) => {
                    self.events.post(ProcessorEvent::log(format!(
                        "Warning: {NEXT_SAMPLE_EXPORT} ignored: {e}\n"
                    )));
                    None
                }
            },
        };

        Ok(ExecutionInstance {
            store,
            memory,
            next_sample,
            generation,
            startup,
        })
    }

    fn run_start(&self, store: &mut Store<ShimState>, instance: &Instance) -> StartupOutcome {
        let Some(start) = instance.get_func(&mut *store, START_EXPORT) else {
            return StartupOutcome::Skipped;
        };
        let start = match start.typed::<(), ()>(&*store) {
            Ok(start) => start,
            Err(e) => {
                return StartupOutcome::Warned(StartupWarning {
                    message: e.to_string(),
                });
            }
        };
        match start.call(&mut *store, ()) {
            Ok(()) => StartupOutcome::Completed,
            Err(e) => match e.downcast_ref::<ModuleExit>() {
                Some(ModuleExit(0)) => StartupOutcome::Exited,
                _ => StartupOutcome::Warned(StartupWarning {
                    message: e.root_cause().to_string(),
                }),
            },
        }
    }
}

#[cfg(test)]
#[path = "test_loader.rs"]
mod tests;
