//! Resource limiting and per-execution store state.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use wasmtime::{ResourceLimiter, Store};

use crate::sandbox::config::SandboxConfig;
use crate::sandbox::flow::FlowRecorder;
use crate::sandbox::io::OutputCapture;

/// Table elements a guest may allocate.
const TABLE_CEILING: usize = 10_000;

/// Memory and table ceilings for one store.
///
/// Growth past a ceiling is refused rather than trapped, so the guest sees a
/// failed `memory.grow`; the executor checks [`SandboxLimiter::exceeded`]
/// afterwards to report the refusal as a memory limit error.
pub struct SandboxLimiter {
    memory_ceiling: usize,
    peak_memory: usize,
    exceeded: bool,
}

impl SandboxLimiter {
    pub fn new(memory_ceiling: u64) -> Self {
        Self {
            memory_ceiling: usize::try_from(memory_ceiling).unwrap_or(usize::MAX),
            peak_memory: 0,
            exceeded: false,
        }
    }

    /// Whether any growth request was refused.
    pub fn exceeded(&self) -> bool {
        self.exceeded
    }

    /// Largest linear memory size granted so far, in bytes.
    pub fn peak_memory(&self) -> u64 {
        self.peak_memory as u64
    }

    fn admit(&mut self, desired: usize, ceiling: usize) -> bool {
        if desired > ceiling {
            self.exceeded = true;
            return false;
        }
        true
    }
}

impl ResourceLimiter for SandboxLimiter {
    fn memory_growing(&mut self, _current: usize, desired: usize, _maximum: Option<usize>) -> anyhow::Result<bool> {
        let granted = self.admit(desired, self.memory_ceiling);
        if granted {
            self.peak_memory = self.peak_memory.max(desired);
        }
        Ok(granted)
    }

    fn table_growing(&mut self, _current: usize, desired: usize, _maximum: Option<usize>) -> anyhow::Result<bool> {
        Ok(self.admit(desired, TABLE_CEILING))
    }
}

/// Why the host stopped the guest.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interruption {
    /// The wall-clock deadline passed.
    Deadline,
    /// The owning session was cancelled.
    Cancelled,
}

/// State owned by one store, and so by one execution.
pub struct StoreData {
    /// The resource limiter.
    pub limiter: SandboxLimiter,
    /// Console output written by the guest.
    pub output: OutputCapture,
    /// Flow events reported by the guest.
    pub flow: FlowRecorder,
    deadline: Instant,
    cancelled: Arc<AtomicBool>,
    interruption: Option<Interruption>,
}

impl StoreData {
    /// Create store data for one execution.
    pub fn new(config: &SandboxConfig, deadline: Instant, cancelled: Arc<AtomicBool>) -> Self {
        Self {
            limiter: SandboxLimiter::new(config.max_memory),
            output: OutputCapture::new(config.max_output_bytes),
            flow: FlowRecorder::new(config.max_flow_events),
            deadline,
            cancelled,
            interruption: None,
        }
    }

    /// Wall-clock deadline of the execution.
    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    /// Check cancellation and the deadline, remembering the first interruption seen.
    pub fn check_interrupt(&mut self) -> Option<Interruption> {
        if self.interruption.is_none() {
            if self.cancelled.load(Ordering::Acquire) {
                self.interruption = Some(Interruption::Cancelled);
            } else if Instant::now() >= self.deadline {
                self.interruption = Some(Interruption::Deadline);
            }
        }
        self.interruption
    }

    /// The interruption that stopped the guest, if any.
    pub fn interruption(&self) -> Option<Interruption> {
        self.interruption
    }
}

/// Extension trait for Store to configure resource limiting.
pub trait StoreLimiterExt {
    /// Configure the store with resource limiting enabled.
    fn configure_limiter(&mut self);
}

impl StoreLimiterExt for Store<StoreData> {
    fn configure_limiter(&mut self) {
        self.limiter(|data| &mut data.limiter);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_peak_memory_tracks_largest_grant() {
        let mut limiter = SandboxLimiter::new(4 * 65536);

        assert!(limiter.memory_growing(0, 65536, None).unwrap());
        assert!(limiter.memory_growing(65536, 3 * 65536, None).unwrap());
        assert!(!limiter.exceeded());
        assert_eq!(limiter.peak_memory(), 3 * 65536);
    }

    #[test]
    fn test_growth_past_ceiling_is_refused() {
        let mut limiter = SandboxLimiter::new(65536);

        assert!(!limiter.memory_growing(0, 2 * 65536, None).unwrap());
        assert!(limiter.exceeded());
        assert_eq!(limiter.peak_memory(), 0);
        assert!(!limiter.table_growing(0, TABLE_CEILING + 1, None).unwrap());
    }

    #[test]
    fn test_cancellation_wins_over_deadline() {
        let cancelled = Arc::new(AtomicBool::new(true));
        let past = Instant::now() - Duration::from_millis(1);
        let mut data = StoreData::new(&SandboxConfig::default(), past, cancelled);

        assert_eq!(data.check_interrupt(), Some(Interruption::Cancelled));
        assert_eq!(data.interruption(), Some(Interruption::Cancelled));
    }

    #[test]
    fn test_deadline_interrupts() {
        let cancelled = Arc::new(AtomicBool::new(false));
        let config = SandboxConfig::default();
        let mut data = StoreData::new(&config, Instant::now() + Duration::from_secs(60), cancelled);
        assert_eq!(data.check_interrupt(), None);

        data.deadline = Instant::now();
        assert_eq!(data.check_interrupt(), Some(Interruption::Deadline));
    }
}
