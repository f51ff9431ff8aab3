//! Two-tier LRU pool of per-session sandboxes.
//!
//! The pool hands out [`Sandbox`]es by [`SandboxKey`]. At most `capacity`
//! entries are *active*; admitting past that soft-evicts the least recently
//! used active entry into the *evicted* tier without touching its container,
//! so a returning caller finds its filesystem intact. Containers are only
//! destroyed by the idle sweep, by explicit removal, or by clearing the pool.
//!
//! # Concurrency
//!
//! Tier bookkeeping sits behind one async mutex that is never held across a
//! daemon call. Operations that create or destroy a container additionally
//! hold a per-key admission lock, so one key never has two containers being
//! provisioned, or one being provisioned while another is torn down.
//!
//! Pool state is process-local. Several processes sharing one daemon each
//! keep their own pool and can race on the same container name.
//!
//! The evicted tier has no cap: under sustained capacity pressure it grows
//! until something calls [`SandboxPool::cleanup_idle_sandboxes`] (see
//! [`Reaper`]).

mod entry;
mod reaper;

use entry::PoolEntry;
pub use entry::{PoolEntryInfo, SandboxKey, Tier};
pub use reaper::{Reaper, ReaperConfig, ReaperStats};

use lru::LruCache;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError};
use std::time::Duration;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, info, warn};

use crate::sandbox::{ContainerRuntime, Result, Sandbox, SandboxConfig, SandboxError};

/// Both tiers, most recently used last.
struct Tiers {
    active: LruCache<SandboxKey, PoolEntry>,
    evicted: LruCache<SandboxKey, PoolEntry>,
}

impl Tiers {
    fn new() -> Self {
        Self {
            active: LruCache::unbounded(),
            evicted: LruCache::unbounded(),
        }
    }

    /// Return the sandbox for a known key, touching it and reviving it from
    /// the evicted tier if needed.
    fn lookup(&mut self, key: &SandboxKey, capacity: usize) -> Option<Sandbox> {
        if let Some(entry) = self.active.get_mut(key) {
            entry.touch();
            return Some(entry.sandbox.clone());
        }

        let mut entry = self.evicted.pop(key)?;
        entry.touch();
        let sandbox = entry.sandbox.clone();
        debug!(key = %key, "Reviving evicted sandbox");
        self.insert(key.clone(), entry, capacity);
        Some(sandbox)
    }

    /// Insert at the most recently used position, soft-evicting to make room.
    fn insert(&mut self, key: SandboxKey, entry: PoolEntry, capacity: usize) {
        while self.active.len() >= capacity {
            if !self.evict_lru() {
                break;
            }
        }
        self.active.push(key, entry);
    }

    /// Move the least recently used active entry to the evicted tier.
    fn evict_lru(&mut self) -> bool {
        match self.active.pop_lru() {
            Some((key, entry)) => {
                debug!(key = %key, "Soft-evicting least recently used sandbox");
                self.evicted.push(key, entry);
                true
            }
            None => false,
        }
    }

    fn remove(&mut self, key: &SandboxKey) -> Option<PoolEntry> {
        self.active.pop(key).or_else(|| self.evicted.pop(key))
    }

    fn tier_of(&self, key: &SandboxKey) -> Option<Tier> {
        if self.active.contains(key) {
            Some(Tier::Active)
        } else if self.evicted.contains(key) {
            Some(Tier::Evicted)
        } else {
            None
        }
    }

    fn keys(&self) -> Vec<SandboxKey> {
        self.active
            .iter()
            .chain(self.evicted.iter())
            .map(|(k, _)| k.clone())
            .collect()
    }
}

type AdmissionTable = std::sync::Mutex<HashMap<SandboxKey, Arc<Mutex<()>>>>;

/// Exclusive right to create or destroy the container for one key.
///
/// The table slot is dropped with the last holder.
struct AdmissionGuard<'a> {
    table: &'a AdmissionTable,
    key: SandboxKey,
    slot: Arc<Mutex<()>>,
    lock: Option<OwnedMutexGuard<()>>,
}

impl Drop for AdmissionGuard<'_> {
    fn drop(&mut self) {
        self.lock.take();
        let mut table = self.table.lock().unwrap_or_else(PoisonError::into_inner);
        // One reference in the table, one here: nobody else is waiting.
        if Arc::strong_count(&self.slot) == 2 {
            table.remove(&self.key);
        }
    }
}

/// Bounded working set of per-session sandboxes.
pub struct SandboxPool {
    runtime: Arc<dyn ContainerRuntime>,
    capacity: usize,
    tiers: Mutex<Tiers>,
    admissions: AdmissionTable,
}

impl std::fmt::Debug for SandboxPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SandboxPool")
            .field("capacity", &self.capacity)
            .finish_non_exhaustive()
    }
}

impl SandboxPool {
    /// Create an empty pool. `capacity` bounds the active tier and must be at least 1.
    pub fn new(runtime: Arc<dyn ContainerRuntime>, capacity: usize) -> Result<Self> {
        if capacity == 0 {
            return Err(SandboxError::invalid_argument("pool capacity must be >= 1"));
        }
        info!(capacity, "Creating sandbox pool");
        Ok(Self {
            runtime,
            capacity,
            tiers: Mutex::new(Tiers::new()),
            admissions: std::sync::Mutex::new(HashMap::new()),
        })
    }

    /// Get the sandbox for `key`, reusing, reviving or creating it.
    ///
    /// `config` is only consulted for keys the pool does not know; it is an
    /// [`SandboxError::InvalidArgument`] to omit it then. Daemon failures
    /// while provisioning are returned as-is and not retried.
    pub async fn get_sandbox(
        &self,
        key: &SandboxKey,
        config: Option<&SandboxConfig>,
    ) -> Result<Sandbox> {
        if let Some(sandbox) = self.tiers.lock().await.lookup(key, self.capacity) {
            return Ok(sandbox);
        }

        let Some(config) = config else {
            return Err(SandboxError::invalid_argument(format!(
                "sandbox {key} not found and no config provided"
            )));
        };
        if config.agent_name != key.agent_name || config.session_id != key.session_id {
            return Err(SandboxError::invalid_argument(format!(
                "config for {}:{} does not match key {key}",
                config.agent_name, config.session_id
            )));
        }

        let _admission = self.admit(key).await;

        // Another caller may have admitted this key while we waited.
        if let Some(sandbox) = self.tiers.lock().await.lookup(key, self.capacity) {
            return Ok(sandbox);
        }

        let sandbox = Sandbox::create(Arc::clone(&self.runtime), config).await?;

        let mut tiers = self.tiers.lock().await;
        tiers.insert(
            key.clone(),
            PoolEntry::new(key, sandbox.clone()),
            self.capacity,
        );
        info!(
            key = %key,
            container = %sandbox.container_name(),
            active = tiers.active.len(),
            evicted = tiers.evicted.len(),
            "Sandbox admitted"
        );
        Ok(sandbox)
    }

    /// Mark an active sandbox as just used. Evicted or unknown keys are ignored.
    pub async fn mark_sandbox(&self, key: &SandboxKey) {
        if let Some(entry) = self.tiers.lock().await.active.get_mut(key) {
            entry.touch();
        }
    }

    /// Remove a sandbox from whichever tier holds it and destroy its container.
    ///
    /// Returns whether the key was pooled.
    pub async fn remove_sandbox(&self, key: &SandboxKey) -> bool {
        let _admission = self.admit(key).await;
        let Some(entry) = self.tiers.lock().await.remove(key) else {
            return false;
        };
        entry.sandbox.close().await;
        info!(key = %key, "Sandbox removed");
        true
    }

    /// Destroy evicted sandboxes idle for longer than `idle_timeout`.
    ///
    /// Active entries are never reclaimed here. Entries whose container could
    /// not be removed stay evicted for the next sweep. Returns how many were
    /// reclaimed.
    pub async fn cleanup_idle_sandboxes(&self, idle_timeout: Duration) -> usize {
        let candidates: Vec<SandboxKey> = {
            let tiers = self.tiers.lock().await;
            tiers
                .evicted
                .iter()
                .filter(|(_, entry)| entry.is_idle(idle_timeout))
                .map(|(key, _)| key.clone())
                .collect()
        };
        self.reclaim_evicted(candidates, "idle").await
    }

    /// Destroy every evicted sandbox regardless of idle time.
    pub async fn cleanup_all_evicted(&self) -> usize {
        let candidates: Vec<SandboxKey> = {
            let tiers = self.tiers.lock().await;
            tiers.evicted.iter().map(|(key, _)| key.clone()).collect()
        };
        self.reclaim_evicted(candidates, "all-evicted").await
    }

    async fn reclaim_evicted(&self, candidates: Vec<SandboxKey>, sweep: &str) -> usize {
        if candidates.is_empty() {
            return 0;
        }

        let mut reclaimed = 0;
        let mut failed = 0;

        for key in candidates {
            let _admission = self.admit(&key).await;
            // Revived since the scan.
            let Some(entry) = self.tiers.lock().await.evicted.pop(&key) else {
                continue;
            };

            if entry.sandbox.close().await {
                reclaimed += 1;
            } else {
                failed += 1;
                warn!(key = %key, "Could not reclaim sandbox, keeping it for the next sweep");
                self.tiers.lock().await.evicted.push(key, entry);
            }
        }

        info!(sweep, reclaimed, failed, "Evicted sandbox sweep finished");
        reclaimed
    }

    /// Forget every entry in both tiers.
    ///
    /// With `close_containers`, every container is destroyed as well.
    /// Without it the containers keep running and are no longer tracked by
    /// anything in this process. Returns how many entries were dropped.
    pub async fn clear_pool(&self, close_containers: bool) -> usize {
        if !close_containers {
            let mut tiers = self.tiers.lock().await;
            let count = tiers.active.len() + tiers.evicted.len();
            tiers.active.clear();
            tiers.evicted.clear();
            warn!(count, "Pool cleared without closing containers");
            return count;
        }

        let keys = self.tiers.lock().await.keys();
        let mut count = 0;
        for key in keys {
            let _admission = self.admit(&key).await;
            let Some(entry) = self.tiers.lock().await.remove(&key) else {
                continue;
            };
            entry.sandbox.close().await;
            count += 1;
        }
        info!(count, "Pool cleared");
        count
    }

    /// Wait for exclusive create/destroy rights on `key`.
    async fn admit(&self, key: &SandboxKey) -> AdmissionGuard<'_> {
        let slot = {
            let mut table = self
                .admissions
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            Arc::clone(table.entry(key.clone()).or_default())
        };
        let lock = Arc::clone(&slot).lock_owned().await;
        AdmissionGuard {
            table: &self.admissions,
            key: key.clone(),
            slot,
            lock: Some(lock),
        }
    }

    // -------------------------------------------------------------------------
    // Introspection
    // -------------------------------------------------------------------------

    /// Maximum number of active entries.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of active entries.
    pub async fn active_len(&self) -> usize {
        self.tiers.lock().await.active.len()
    }

    /// Number of soft-evicted entries.
    pub async fn evicted_len(&self) -> usize {
        self.tiers.lock().await.evicted.len()
    }

    /// True if admitting a new key would soft-evict.
    pub async fn is_full(&self) -> bool {
        self.tiers.lock().await.active.len() >= self.capacity
    }

    /// True if either tier holds `key`.
    pub async fn has_sandbox(&self, key: &SandboxKey) -> bool {
        self.tiers.lock().await.tier_of(key).is_some()
    }

    /// Which tier holds `key`, if any.
    pub async fn tier_of(&self, key: &SandboxKey) -> Option<Tier> {
        self.tiers.lock().await.tier_of(key)
    }

    /// Every entry, active tier first, each tier from least to most recently used.
    pub async fn snapshot(&self) -> Vec<PoolEntryInfo> {
        let tiers = self.tiers.lock().await;
        tiers
            .active
            .iter()
            .rev()
            .map(|(_, e)| e.info(Tier::Active))
            .chain(tiers.evicted.iter().rev().map(|(_, e)| e.info(Tier::Evicted)))
            .collect()
    }
}
