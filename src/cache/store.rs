//! In-process store with LRU eviction and a store-wide TTL

use crate::cache::{
    backend::StorageBackend,
    clock::{Clock, SystemClock},
    entry::CacheEntry,
    types::{CacheStats, Fingerprint},
};
use crate::error::{CacheError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, info};

/// Capacity-bounded, TTL-aware LRU map.
///
/// Capacity and TTL are fixed at construction. An entry disappears when it is
/// pushed out by capacity pressure or when it is read at or after
/// `inserted_at + ttl`; callers cannot tell the two apart.
#[derive(Debug)]
pub struct InProcessStore {
    capacity: usize,
    ttl: Duration,
    clock: Arc<dyn Clock>,
    inner: RwLock<StoreInner>,
}

#[derive(Debug)]
struct StoreInner {
    /// Main storage: fingerprint -> slot
    slots: HashMap<Fingerprint, Slot>,

    /// Recency index: last-use tick -> fingerprint, least recently used first
    recency: BTreeMap<u64, Fingerprint>,

    next_tick: u64,

    stats: CacheStats,
}

#[derive(Debug)]
struct Slot {
    entry: CacheEntry,
    expires_at: DateTime<Utc>,
    last_used: u64,
}

impl StoreInner {
    fn tick(&mut self) -> u64 {
        let tick = self.next_tick;
        self.next_tick += 1;
        tick
    }

    fn insert(&mut self, key: Fingerprint, entry: CacheEntry, expires_at: DateTime<Utc>) {
        let last_used = self.tick();
        self.slots.insert(
            key,
            Slot {
                entry,
                expires_at,
                last_used,
            },
        );
        self.recency.insert(last_used, key);
        self.stats.entries = self.slots.len();
    }

    fn remove(&mut self, key: Fingerprint) -> Option<Slot> {
        let slot = self.slots.remove(&key)?;
        self.recency.remove(&slot.last_used);
        self.stats.entries = self.slots.len();
        Some(slot)
    }

    fn touch(&mut self, key: Fingerprint) {
        let tick = self.tick();
        if let Some(slot) = self.slots.get_mut(&key) {
            self.recency.remove(&slot.last_used);
            slot.last_used = tick;
            self.recency.insert(tick, key);
        }
    }

    fn evict_lru(&mut self) -> Option<Fingerprint> {
        let (_, victim) = self.recency.pop_first()?;
        self.slots.remove(&victim);
        self.stats.entries = self.slots.len();
        Some(victim)
    }
}

impl InProcessStore {
    /// Create a store driven by the system clock
    pub fn new(capacity: usize, ttl: Duration) -> Result<Self> {
        Self::with_clock(capacity, ttl, Arc::new(SystemClock))
    }

    /// Create a store driven by the given clock
    pub fn with_clock(capacity: usize, ttl: Duration, clock: Arc<dyn Clock>) -> Result<Self> {
        if capacity == 0 {
            return Err(CacheError::Config(
                "capacity must be greater than 0".to_string(),
            ));
        }

        info!(capacity, ttl_secs = ttl.as_secs_f64(), "initializing in-process store");

        Ok(Self {
            capacity,
            ttl,
            clock,
            inner: RwLock::new(StoreInner {
                slots: HashMap::with_capacity(capacity),
                recency: BTreeMap::new(),
                next_tick: 0,
                stats: CacheStats::default(),
            }),
        })
    }

    /// Maximum number of entries
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Store-wide time-to-live
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    fn deadline(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        chrono::Duration::from_std(self.ttl)
            .ok()
            .and_then(|ttl| now.checked_add_signed(ttl))
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }

    /// Look up an entry, refreshing its recency
    pub async fn get(&self, key: Fingerprint) -> Option<CacheEntry> {
        let now = self.clock.now();
        let mut inner = self.inner.write().await;

        let expires_at = match inner.slots.get(&key).map(|slot| slot.expires_at) {
            Some(at) => at,
            None => {
                inner.stats.misses += 1;
                return None;
            }
        };

        if now >= expires_at {
            debug!(fingerprint = %key, "in-process entry expired");
            inner.remove(key);
            inner.stats.misses += 1;
            inner.stats.evictions_ttl += 1;
            return None;
        }

        inner.touch(key);
        inner.stats.hits += 1;
        inner.slots.get(&key).map(|slot| slot.entry.clone())
    }

    /// Insert or replace an entry. Always accepted; may evict the LRU entry.
    pub async fn set(&self, key: Fingerprint, entry: CacheEntry) -> bool {
        let expires_at = self.deadline(self.clock.now());
        let mut inner = self.inner.write().await;

        if let Some(slot) = inner.slots.get_mut(&key) {
            slot.entry = entry;
            slot.expires_at = expires_at;
            inner.touch(key);
            return true;
        }

        while inner.slots.len() >= self.capacity {
            match inner.evict_lru() {
                Some(victim) => {
                    debug!(fingerprint = %victim, "evicting least recently used entry");
                    inner.stats.evictions_capacity += 1;
                }
                None => break,
            }
        }

        inner.insert(key, entry, expires_at);
        true
    }

    /// Remove an entry, reporting whether it was present
    pub async fn delete(&self, key: Fingerprint) -> bool {
        let mut inner = self.inner.write().await;
        let removed = inner.remove(key).is_some();
        if removed {
            inner.stats.removals += 1;
        }
        removed
    }

    /// Remove the entry only if it is the one created at `created_at`.
    ///
    /// A newer write under the same key is left in place.
    pub async fn delete_if_created(&self, key: Fingerprint, created_at: DateTime<Utc>) -> bool {
        let mut inner = self.inner.write().await;
        let matches = inner
            .slots
            .get(&key)
            .is_some_and(|slot| slot.entry.created_at == created_at);
        if !matches {
            return false;
        }

        inner.remove(key);
        inner.stats.removals += 1;
        true
    }

    /// Drop every entry whose TTL has run out. Returns how many were removed.
    pub async fn purge_expired(&self) -> usize {
        let now = self.clock.now();
        let mut inner = self.inner.write().await;

        let expired: Vec<Fingerprint> = inner
            .slots
            .iter()
            .filter(|(_, slot)| now >= slot.expires_at)
            .map(|(key, _)| *key)
            .collect();

        for key in &expired {
            inner.remove(*key);
        }
        inner.stats.evictions_ttl += expired.len() as u64;

        if !expired.is_empty() {
            debug!(count = expired.len(), "purged expired in-process entries");
        }
        expired.len()
    }

    /// Remove all entries
    pub async fn clear(&self) {
        let mut inner = self.inner.write().await;
        let count = inner.slots.len();
        inner.slots.clear();
        inner.recency.clear();
        inner.stats.entries = 0;
        inner.stats.removals += count as u64;
        info!(count, "cleared in-process store");
    }

    /// Number of entries currently held (including not-yet-purged expired ones)
    pub async fn len(&self) -> usize {
        self.inner.read().await.slots.len()
    }

    /// Whether the store holds no entries
    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.slots.is_empty()
    }

    /// Snapshot of the store counters
    pub async fn stats(&self) -> CacheStats {
        self.inner.read().await.stats.clone()
    }
}

#[async_trait]
impl StorageBackend for InProcessStore {
    async fn get(&self, key: Fingerprint) -> Option<CacheEntry> {
        InProcessStore::get(self, key).await
    }

    async fn set(&self, key: Fingerprint, entry: CacheEntry) -> bool {
        InProcessStore::set(self, key, entry).await
    }

    async fn delete(&self, key: Fingerprint) -> bool {
        InProcessStore::delete(self, key).await
    }

    async fn delete_if_created(&self, key: Fingerprint, created_at: DateTime<Utc>) -> bool {
        InProcessStore::delete_if_created(self, key, created_at).await
    }
}
