//! Compiled-plan cache keyed by `(device id, strategy id, problem signature)`.
//!
//! The cache is an explicit object: each dispatcher is handed one, and tests
//! build isolated instances. Compiled kernels belong to the device that built
//! them, so dispatchers for different devices may share a cache without ever
//! seeing each other's entries. Every key owns a single slot, created on first
//! request; concurrent requests for the same key share the slot, so only one
//! of them compiles while the others block until the entry is installed. A
//! failed compilation leaves the slot empty and the next request retries.
//!
//! Eviction is left to the owner: entries live until [`KernelCache::remove`]
//! or [`KernelCache::clear`].

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use fusekit_device::{CompiledKernel, CompletionToken, DeviceHandle};
use once_cell::sync::OnceCell;
use papaya::HashMap;
use tracing::debug;

use crate::error::Result;
use crate::problem::ProblemSignature;
use crate::solver::{InvokeParams, Invoker};

/// Compiled kernels of one plan together with their invoker.
pub struct CachedKernelEntry {
    device: String,
    strategy: String,
    signature: ProblemSignature,
    kernels: Vec<Arc<dyn CompiledKernel>>,
    invoker: Invoker,
    workspace_bytes: usize,
}

impl CachedKernelEntry {
    pub fn new(
        device: impl Into<String>,
        strategy: impl Into<String>,
        signature: ProblemSignature,
        kernels: Vec<Arc<dyn CompiledKernel>>,
        invoker: Invoker,
        workspace_bytes: usize,
    ) -> Self {
        Self { device: device.into(), strategy: strategy.into(), signature, kernels, invoker, workspace_bytes }
    }

    /// Id of the device the kernels were compiled for.
    pub fn device(&self) -> &str {
        &self.device
    }

    pub fn strategy(&self) -> &str {
        &self.strategy
    }

    pub fn signature(&self) -> &ProblemSignature {
        &self.signature
    }

    /// Compiled kernels in recipe order.
    pub fn kernels(&self) -> &[Arc<dyn CompiledKernel>] {
        &self.kernels
    }

    pub fn workspace_bytes(&self) -> usize {
        self.workspace_bytes
    }

    pub fn invoke(&self, device: &dyn DeviceHandle, params: InvokeParams<'_>) -> Result<CompletionToken> {
        (self.invoker)(device, params)
    }
}

impl fmt::Debug for CachedKernelEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CachedKernelEntry")
            .field("device", &self.device)
            .field("strategy", &self.strategy)
            .field("signature", &self.signature)
            .field("kernels", &self.kernels)
            .field("workspace_bytes", &self.workspace_bytes)
            .finish_non_exhaustive()
    }
}

/// `(device id, strategy id, signature)`.
type CacheKey = (String, String, ProblemSignature);

type Slot = Arc<OnceCell<Arc<CachedKernelEntry>>>;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    /// Requests that compiled; equal to the number of successful compilations.
    pub misses: u64,
}

#[derive(Default)]
pub struct KernelCache {
    slots: HashMap<CacheKey, Slot>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl KernelCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn key(device: &str, strategy: &str, signature: &ProblemSignature) -> CacheKey {
        (device.to_string(), strategy.to_string(), signature.clone())
    }

    fn slot(&self, device: &str, strategy: &str, signature: &ProblemSignature) -> Slot {
        let guard = self.slots.guard();
        let key = Self::key(device, strategy, signature);
        Arc::clone(self.slots.get_or_insert_with(key, || Arc::new(OnceCell::new()), &guard))
    }

    pub fn lookup(
        &self,
        device: &str,
        strategy: &str,
        signature: &ProblemSignature,
    ) -> Option<Arc<CachedKernelEntry>> {
        let guard = self.slots.guard();
        let key = Self::key(device, strategy, signature);
        self.slots.get(&key, &guard).and_then(|slot| slot.get().cloned())
    }

    /// Install `entry` unless the key already holds one; returns whichever
    /// entry ends up installed.
    pub fn insert(&self, entry: CachedKernelEntry) -> Arc<CachedKernelEntry> {
        let slot = self.slot(&entry.device, &entry.strategy, &entry.signature);
        Arc::clone(slot.get_or_init(move || Arc::new(entry)))
    }

    /// Cached entry for the key, compiling it with `compile` on a miss.
    ///
    /// At most one `compile` runs per key at a time; callers racing on the
    /// same key wait for it and then share its result.
    pub fn get_or_compile<F>(
        &self,
        device: &str,
        strategy: &str,
        signature: &ProblemSignature,
        compile: F,
    ) -> Result<Arc<CachedKernelEntry>>
    where
        F: FnOnce() -> Result<CachedKernelEntry>,
    {
        let slot = self.slot(device, strategy, signature);
        let mut compiled = false;
        let entry = slot.get_or_try_init(|| {
            compiled = true;
            compile().map(Arc::new)
        })?;

        if compiled {
            self.misses.fetch_add(1, Ordering::Relaxed);
            debug!(device, strategy, %signature, "kernel cache miss");
        } else {
            self.hits.fetch_add(1, Ordering::Relaxed);
            debug!(device, strategy, %signature, "kernel cache hit");
        }
        Ok(Arc::clone(entry))
    }

    pub fn remove(
        &self,
        device: &str,
        strategy: &str,
        signature: &ProblemSignature,
    ) -> Option<Arc<CachedKernelEntry>> {
        let guard = self.slots.guard();
        let key = Self::key(device, strategy, signature);
        self.slots.remove(&key, &guard).and_then(|slot| slot.get().cloned())
    }

    /// Number of installed entries; slots whose compilation failed are not counted.
    pub fn len(&self) -> usize {
        let guard = self.slots.guard();
        self.slots.iter(&guard).filter(|(_, slot)| slot.get().is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        let guard = self.slots.guard();
        self.slots.clear(&guard);
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats { hits: self.hits.load(Ordering::Relaxed), misses: self.misses.load(Ordering::Relaxed) }
    }
}

impl fmt::Debug for KernelCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KernelCache").field("entries", &self.len()).field("stats", &self.stats()).finish()
    }
}
