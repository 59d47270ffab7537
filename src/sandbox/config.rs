//! Execution host limits.

use std::time::Duration;

/// Bounds applied to every guest run by an [`ExecutionHost`](crate::sandbox::ExecutionHost).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SandboxConfig {
    /// Wall-clock budget of one run.
    pub timeout: Duration,
    /// Linear memory ceiling in bytes.
    pub max_memory: u64,
    /// Instruction budget; `None` leaves fuel metering off.
    pub max_fuel: Option<u64>,
    /// How often the engine epoch advances while a guest runs.
    pub epoch_tick_interval: Duration,
    /// Flow events kept per run; later events are counted and dropped.
    pub max_flow_events: usize,
    /// Console bytes kept before output is truncated.
    pub max_output_bytes: usize,
    /// Compiled modules kept by the host's module cache.
    pub module_cache_capacity: usize,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            max_memory: 64 * 1024 * 1024,
            max_fuel: None,
            epoch_tick_interval: Duration::from_millis(10),
            max_flow_events: 10_000,
            max_output_bytes: 64 * 1024,
            module_cache_capacity: 64,
        }
    }
}

impl SandboxConfig {
    /// Start from the defaults and override selected limits.
    pub fn builder() -> SandboxConfigBuilder {
        SandboxConfigBuilder::default()
    }
}

/// Overrides on top of [`SandboxConfig::default`]; unset fields keep their default.
#[derive(Debug, Clone, Default)]
pub struct SandboxConfigBuilder {
    timeout: Option<Duration>,
    max_memory: Option<u64>,
    max_fuel: Option<u64>,
    epoch_tick_interval: Option<Duration>,
    max_flow_events: Option<usize>,
    max_output_bytes: Option<usize>,
    module_cache_capacity: Option<usize>,
}

impl SandboxConfigBuilder {
    /// Set the wall-clock budget of one run.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Set the linear memory ceiling in bytes.
    pub fn max_memory(mut self, bytes: u64) -> Self {
        self.max_memory = Some(bytes);
        self
    }

    /// Turn on fuel metering with the given budget.
    pub fn max_fuel(mut self, fuel: u64) -> Self {
        self.max_fuel = Some(fuel);
        self
    }

    /// Set how often the engine epoch advances.
    pub fn epoch_tick_interval(mut self, interval: Duration) -> Self {
        self.epoch_tick_interval = Some(interval);
        self
    }

    /// Cap the flow events kept per run. A final exception always survives the cap.
    pub fn max_flow_events(mut self, events: usize) -> Self {
        self.max_flow_events = Some(events);
        self
    }

    /// Set how many console bytes a run keeps.
    pub fn max_output_bytes(mut self, bytes: usize) -> Self {
        self.max_output_bytes = Some(bytes);
        self
    }

    /// Set how many compiled modules the cache keeps.
    pub fn module_cache_capacity(mut self, modules: usize) -> Self {
        self.module_cache_capacity = Some(modules);
        self
    }

    /// Build the config, filling unset fields from the defaults.
    pub fn build(self) -> SandboxConfig {
        let defaults = SandboxConfig::default();
        SandboxConfig {
            timeout: self.timeout.unwrap_or(defaults.timeout),
            max_memory: self.max_memory.unwrap_or(defaults.max_memory),
            max_fuel: self.max_fuel.or(defaults.max_fuel),
            epoch_tick_interval: self.epoch_tick_interval.unwrap_or(defaults.epoch_tick_interval),
            max_flow_events: self.max_flow_events.unwrap_or(defaults.max_flow_events),
            max_output_bytes: self.max_output_bytes.unwrap_or(defaults.max_output_bytes),
            module_cache_capacity: self
                .module_cache_capacity
                .unwrap_or(defaults.module_cache_capacity),
        }
    }
}
