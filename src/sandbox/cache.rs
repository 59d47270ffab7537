//! Compiled module caching and engine sharing.
//!
//! Modules are keyed by the exact bytes they were compiled from, so a
//! recompiled submission with identical output reuses the compiled module.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, RwLock};

use wasmtime::{Engine, Module};

use crate::error::{Result, SandboxError};
use crate::macros::debug;

#[derive(Default)]
struct Entries {
    modules: HashMap<Arc<[u8]>, Arc<Module>>,
    order: VecDeque<Arc<[u8]>>,
}

/// A thread-safe, bounded cache of compiled modules.
///
/// When full, the oldest module is evicted first. A module is only valid for
/// the engine it was compiled with, so each cache belongs to one engine.
pub struct ModuleCache {
    entries: RwLock<Entries>,
    capacity: usize,
}

impl std::fmt::Debug for ModuleCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModuleCache")
            .field("len", &self.len())
            .field("capacity", &self.capacity)
            .finish()
    }
}

impl ModuleCache {
    /// Create an empty cache holding at most `capacity` modules.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: RwLock::new(Entries::default()),
            capacity,
        }
    }

    /// Get a cached module or compile `bytes` if not present.
    ///
    /// `bytes` may be a binary module or, for tooling and tests, its text form.
    pub fn get_or_compile(&self, engine: &Engine, bytes: &[u8]) -> Result<Arc<Module>> {
        if let Some(module) = self.get(bytes) {
            debug!(bytes = bytes.len(), "module cache hit");
            return Ok(module);
        }

        // Compile outside any lock.
        let module = Module::new(engine, bytes)
            .map(Arc::new)
            .map_err(|e| SandboxError::ModuleLoad(e.context("failed to compile module")))?;
        if self.capacity == 0 {
            return Ok(module);
        }

        let mut entries = self.write()?;
        // Another thread might have compiled the same bytes meanwhile.
        if let Some(existing) = entries.modules.get(bytes) {
            return Ok(Arc::clone(existing));
        }
        while entries.order.len() >= self.capacity {
            if let Some(oldest) = entries.order.pop_front() {
                entries.modules.remove(&oldest);
            }
        }
        let key: Arc<[u8]> = Arc::from(bytes);
        entries.order.push_back(Arc::clone(&key));
        entries.modules.insert(key, Arc::clone(&module));
        Ok(module)
    }

    /// Cached module for `bytes`, if any.
    pub fn get(&self, bytes: &[u8]) -> Option<Arc<Module>> {
        let entries = self.entries.read().ok()?;
        entries.modules.get(bytes).map(Arc::clone)
    }

    /// Whether `bytes` has a compiled module in the cache.
    pub fn contains(&self, bytes: &[u8]) -> bool {
        self.get(bytes).is_some()
    }

    /// Drop every cached module.
    pub fn clear(&self) {
        if let Ok(mut entries) = self.entries.write() {
            entries.modules.clear();
            entries.order.clear();
        }
    }

    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.modules.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Maximum number of cached modules.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    fn write(&self) -> Result<std::sync::RwLockWriteGuard<'_, Entries>> {
        self.entries
            .write()
            .map_err(|_| SandboxError::ExecutionFailed("module cache lock poisoned".into()))
    }
}

/// Reference-counted wasmtime engine shared by a host, its ticker task and
/// its blocking run tasks.
///
/// Epoch interruption is always on; fuel metering only when a fuel budget is
/// configured, since metering slows every guest down.
#[derive(Clone)]
pub struct SharedEngine(Arc<Engine>);

impl std::fmt::Debug for SharedEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("SharedEngine").finish_non_exhaustive()
    }
}

impl SharedEngine {
    pub fn new(metered: bool) -> Result<Self> {
        let mut config = wasmtime::Config::new();
        config.epoch_interruption(true).consume_fuel(metered);
        Engine::new(&config)
            .map(|engine| Self(Arc::new(engine)))
            .map_err(SandboxError::RuntimeInit)
    }

    pub fn arc(&self) -> Arc<Engine> {
        Arc::clone(&self.0)
    }
}

impl std::ops::Deref for SharedEngine {
    type Target = Engine;

    fn deref(&self) -> &Engine {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EMPTY: &[u8] = b"(module)";
    const WITH_MEMORY: &[u8] = b"(module (memory 1))";

    #[test]
    fn test_starts_empty_and_clears() {
        let engine = SharedEngine::new(false).unwrap();
        let cache = ModuleCache::with_capacity(4);
        assert!(cache.is_empty());
        assert_eq!(cache.capacity(), 4);

        cache.get_or_compile(&engine, EMPTY).unwrap();
        cache.clear();
        assert!(cache.get(EMPTY).is_none());
    }

    #[test]
    fn test_reuses_identical_bytes() {
        let engine = SharedEngine::new(false).unwrap();
        let cache = ModuleCache::with_capacity(4);

        let first = cache.get_or_compile(&engine, EMPTY).unwrap();
        let second = cache.get_or_compile(&engine, EMPTY).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_evicts_oldest() {
        let engine = SharedEngine::new(false).unwrap();
        let cache = ModuleCache::with_capacity(1);

        cache.get_or_compile(&engine, EMPTY).unwrap();
        cache.get_or_compile(&engine, WITH_MEMORY).unwrap();
        assert_eq!(cache.len(), 1);
        assert!(!cache.contains(EMPTY));
        assert!(cache.contains(WITH_MEMORY));
    }

    #[test]
    fn test_invalid_module() {
        let engine = SharedEngine::new(false).unwrap();
        let error = ModuleCache::with_capacity(1)
            .get_or_compile(&engine, b"not a module")
            .unwrap_err();
        assert!(matches!(error, SandboxError::ModuleLoad(_)));
    }

    #[test]
    fn test_clones_share_one_engine() {
        let engine = SharedEngine::new(true).unwrap();
        let ticker = engine.clone();
        assert!(Arc::ptr_eq(&engine.arc(), &ticker.arc()));
    }
}
