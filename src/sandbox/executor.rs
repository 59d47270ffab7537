//! Execution host for verified assemblies.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use wasmtime::{Engine, Linker, Module, Store, Trap, UpdateDeadline};

use crate::compilation::session::CancelHandle;
use crate::error::{Result, SandboxError};
use crate::macros::{debug, info};
use crate::policy::enforcement::VerifiedAssembly;
use crate::sandbox::cache::{ModuleCache, SharedEngine};
use crate::sandbox::config::SandboxConfig;
use crate::sandbox::flow::FlowEvent;
use crate::sandbox::host_api::{self, HostTrap};
use crate::sandbox::limits::{Interruption, StoreData, StoreLimiterExt};

/// Name of the guest entry point.
pub const ENTRY_POINT: &str = "_start";

/// How a guest run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionStatus {
    /// The entry point returned.
    Completed,
    /// The guest raised an exception or a guard rejected an operation.
    Faulted {
        /// Description of the fault.
        description: String,
    },
}

/// Measurements taken during one run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecutionMetadata {
    /// Wall-clock time spent in the guest.
    pub duration: Duration,
    /// Fuel consumed, when fuel metering is on.
    pub fuel_consumed: Option<u64>,
    /// Largest linear memory size seen, in bytes.
    pub peak_memory: u64,
    /// Whether console output was cut at the limit.
    pub output_truncated: bool,
    /// Flow events dropped at the limit.
    pub flow_events_dropped: usize,
}

/// Result of running a verified assembly.
#[derive(Debug, Clone)]
pub struct ExecutionResult {
    /// Captured console output.
    pub stdout: String,
    /// Flow events in the order the guest produced them.
    pub flow: Vec<FlowEvent>,
    /// How the run ended.
    pub status: ExecutionStatus,
    /// Measurements.
    pub metadata: ExecutionMetadata,
}

impl ExecutionResult {
    /// Check if the guest ran to completion.
    pub fn is_success(&self) -> bool {
        self.status == ExecutionStatus::Completed
    }
}

/// Runs verified assemblies inside Wasm stores with memory, fuel and
/// wall-clock limits.
///
/// The host links only the imports that enforcement verified, with the guards
/// attached to each call site. Compiled modules are cached by content.
pub struct ExecutionHost {
    config: SandboxConfig,
    engine: SharedEngine,
    cache: ModuleCache,
}

impl std::fmt::Debug for ExecutionHost {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionHost")
            .field("config", &self.config)
            .field("cache", &self.cache)
            .finish()
    }
}

impl ExecutionHost {
    /// Create a host with its own engine.
    pub fn new(config: SandboxConfig) -> Result<Self> {
        let engine = SharedEngine::new(config.max_fuel.is_some())?;
        Ok(Self::with_engine(config, engine))
    }

    /// Create a host over an existing engine.
    ///
    /// The engine must have epoch interruption enabled, and fuel metering when
    /// `config.max_fuel` is set.
    pub fn with_engine(config: SandboxConfig, engine: SharedEngine) -> Self {
        let cache = ModuleCache::with_capacity(config.module_cache_capacity);
        Self {
            config,
            engine,
            cache,
        }
    }

    /// The host configuration.
    pub fn config(&self) -> &SandboxConfig {
        &self.config
    }

    /// The engine modules are compiled with.
    pub fn engine(&self) -> &SharedEngine {
        &self.engine
    }

    /// The compiled module cache.
    pub fn cache(&self) -> &ModuleCache {
        &self.cache
    }

    /// Compile `bytes`, or reuse the module compiled from identical bytes.
    pub fn load_module(&self, bytes: &[u8]) -> Result<Arc<Module>> {
        self.cache.get_or_compile(&self.engine, bytes)
    }

    /// Run the entry point of `assembly`.
    pub async fn execute(&self, assembly: &VerifiedAssembly) -> Result<ExecutionResult> {
        self.execute_with_cancel(assembly, &CancelHandle::default()).await
    }

    /// Run the entry point of `assembly`, stopping early if `cancel` fires.
    pub async fn execute_with_cancel(
        &self,
        assembly: &VerifiedAssembly,
        cancel: &CancelHandle,
    ) -> Result<ExecutionResult> {
        let module = self.load_module(assembly.streams().binary())?;
        let linker = host_api::link(&self.engine, &module, assembly)?;

        let config = self.config.clone();
        let timeout = config.timeout;
        let epoch_interval = config.epoch_tick_interval;
        let deadline = Instant::now() + timeout;
        let interrupted = Arc::new(AtomicBool::new(cancel.is_cancelled()));
        info!(surface = assembly.surface_version(), ?timeout, "executing verified assembly");

        let ticker = spawn_epoch_ticker(self.engine.arc(), epoch_interval);
        let exec_engine = self.engine.arc();
        let exec_interrupted = Arc::clone(&interrupted);
        let run = tokio::task::spawn_blocking(move || {
            Self::run_guest(&exec_engine, &module, &linker, &config, deadline, exec_interrupted)
        });

        let result = tokio::select! {
            joined = run => joined.unwrap_or_else(|e| {
                Err(SandboxError::ExecutionFailed(format!("guest task failed: {e}")))
            }),
            _ = tokio::time::sleep_until(tokio::time::Instant::from_std(deadline)) => {
                Err(SandboxError::Timeout(timeout))
            }
            _ = cancel.cancelled() => {
                interrupted.store(true, Ordering::Release);
                Err(SandboxError::Cancelled)
            }
        };
        ticker.abort();
        // Wake a guest that may still be running so it observes the interrupt.
        self.engine.increment_epoch();

        result
    }

    fn run_guest(
        engine: &Engine,
        module: &Module,
        linker: &Linker<StoreData>,
        config: &SandboxConfig,
        deadline: Instant,
        interrupted: Arc<AtomicBool>,
    ) -> Result<ExecutionResult> {
        let started = Instant::now();
        let mut store = Store::new(engine, StoreData::new(config, deadline, interrupted));
        store.configure_limiter();

        store.set_epoch_deadline(1);
        store.epoch_deadline_callback(|mut context| match context.data_mut().check_interrupt() {
            Some(_) => Err(anyhow::Error::new(HostTrap::Interrupted)),
            None => Ok(UpdateDeadline::Continue(1)),
        });

        if let Some(fuel) = config.max_fuel {
            store
                .set_fuel(fuel)
                .map_err(|e| SandboxError::RuntimeInit(e.context("engine has fuel metering disabled")))?;
        }

        let instance = match linker.instantiate(&mut store, module) {
            Ok(instance) => instance,
            Err(_) if store.data().limiter.exceeded() => {
                return Err(SandboxError::MemoryLimitExceeded(format!(
                    "initial memory above {} bytes",
                    config.max_memory
                )))
            }
            Err(e) => return Err(SandboxError::ModuleLoad(e.context("instantiation failed"))),
        };
        let start = instance
            .get_typed_func::<(), ()>(&mut store, ENTRY_POINT)
            .map_err(|e| SandboxError::ModuleLoad(e.context(format!("no usable `{ENTRY_POINT}` export"))))?;

        let status = match start.call(&mut store, ()) {
            Ok(()) => ExecutionStatus::Completed,
            Err(e) => Self::classify_trap(&mut store, config, e)?,
        };

        let fuel_consumed = config
            .max_fuel
            .map(|max| max.saturating_sub(store.get_fuel().unwrap_or(0)));
        let data = store.into_data();
        let metadata = ExecutionMetadata {
            duration: started.elapsed(),
            fuel_consumed,
            peak_memory: data.limiter.peak_memory(),
            output_truncated: data.output.is_truncated(),
            flow_events_dropped: data.flow.dropped(),
        };
        debug!(?status, duration = ?metadata.duration, "guest finished");

        Ok(ExecutionResult {
            stdout: data.output.to_string_lossy(),
            flow: data.flow.into_events(),
            status,
            metadata,
        })
    }

    /// Map a trap to a host error, or to a fault status for guest-level exceptions.
    fn classify_trap(
        store: &mut Store<StoreData>,
        config: &SandboxConfig,
        error: anyhow::Error,
    ) -> Result<ExecutionStatus> {
        match store.data().interruption() {
            Some(Interruption::Deadline) => return Err(SandboxError::Timeout(config.timeout)),
            Some(Interruption::Cancelled) => return Err(SandboxError::Cancelled),
            None => {}
        }
        if store.data().limiter.exceeded() {
            return Err(SandboxError::MemoryLimitExceeded(format!(
                "guest grew memory past {} bytes",
                config.max_memory
            )));
        }
        if let Some(Trap::OutOfFuel) = error.downcast_ref::<Trap>() {
            return Err(SandboxError::OutOfFuel {
                consumed: config.max_fuel,
            });
        }

        let description = match error.downcast_ref::<HostTrap>() {
            // Already recorded in the flow stream by the host member.
            Some(HostTrap::GuardRejected(description) | HostTrap::GuestException(description)) => {
                description.clone()
            }
            Some(HostTrap::Interrupted) => return Err(SandboxError::Cancelled),
            None => {
                let description = match error.downcast_ref::<Trap>() {
                    Some(trap) => trap.to_string(),
                    None => format!("{error:#}"),
                };
                let flow = &mut store.data_mut().flow;
                let line = flow.current_line();
                flow.record(FlowEvent::ExceptionObserved {
                    line,
                    description: description.clone(),
                });
                description
            }
        };
        Ok(ExecutionStatus::Faulted { description })
    }
}

/// Advance the engine epoch every `interval` until aborted.
fn spawn_epoch_ticker(engine: Arc<Engine>, interval: Duration) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticks = tokio::time::interval(interval);
        loop {
            ticks.tick().await;
            engine.increment_epoch();
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compilation::assembly::{AssemblyStreams, CompiledAssembly};
    use crate::policy::enforcement::PolicyEnforcer;

    fn verify(wat: &str, host: &ExecutionHost) -> VerifiedAssembly {
        let module = host.load_module(wat.as_bytes()).unwrap();
        let references = host_api::describe_imports(&module);
        PolicyEnforcer::global()
            .enforce(CompiledAssembly::new(AssemblyStreams::new(wat), references))
            .unwrap()
    }

    #[tokio::test]
    async fn test_console_output() {
        let host = ExecutionHost::new(SandboxConfig::default()).unwrap();
        let assembly = verify(
            r#"(module
                (import "System.Console" "WriteLine" (func $println (param i32 i32)))
                (memory (export "memory") 1)
                (data (i32.const 0) "hi")
                (func (export "_start") (call $println (i32.const 0) (i32.const 2))))"#,
            &host,
        );

        let result = host.execute(&assembly).await.unwrap();
        assert!(result.is_success());
        assert_eq!(result.stdout, "hi\n");
    }

    #[tokio::test]
    async fn test_guest_trap_is_a_fault() {
        let host = ExecutionHost::new(SandboxConfig::default()).unwrap();
        let assembly = verify(
            r#"(module
                (import "CodeLab.Runtime.Internal.Flow" "ReportLineStart" (func $line (param i32)))
                (func (export "_start") (call $line (i32.const 4)) unreachable))"#,
            &host,
        );

        let result = host.execute(&assembly).await.unwrap();
        assert!(matches!(result.status, ExecutionStatus::Faulted { .. }));
        assert_eq!(result.flow.len(), 2);
        assert_eq!(result.flow[1].line(), 4);
        assert!(result.flow[1].is_exception());
    }

    #[tokio::test]
    async fn test_missing_entry_point() {
        let host = ExecutionHost::new(SandboxConfig::default()).unwrap();
        let assembly = verify("(module)", &host);
        let error = host.execute(&assembly).await.unwrap_err();
        assert!(matches!(error, SandboxError::ModuleLoad(_)));
    }
}
