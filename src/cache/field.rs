//! The field cache: invoke-or-serve around a resolver callback

use crate::cache::{
    backend::{Backend, StorageBackend},
    clock::{Clock, SystemClock},
    config::CacheConfig,
    entry::CacheEntry,
    key::{derive_key, CacheIdentity, DerivedKey, FieldContext},
    types::Fingerprint,
};
use crate::error::Result;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

/// Counters kept by a [`FieldCache`]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldCacheStats {
    /// Calls served from the backend
    pub hits: u64,

    /// Cacheable calls that had to compute
    pub misses: u64,

    /// Calls that skipped the cache entirely
    pub bypasses: u64,

    /// Results written to the backend
    pub stores: u64,

    /// Entries found past their max-age and evicted on read
    pub expired: u64,

    /// Computations that failed (never cached)
    pub failures: u64,
}

impl FieldCacheStats {
    /// Share of cacheable calls served from the backend, as a percentage
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            (self.hits as f64 / total as f64) * 100.0
        }
    }
}

impl fmt::Display for FieldCacheStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "FieldCacheStats {{ hits: {}, misses: {}, hit_rate: {:.2}%, bypasses: {}, stores: {}, expired: {}, failures: {} }}",
            self.hits,
            self.misses,
            self.hit_rate(),
            self.bypasses,
            self.stores,
            self.expired,
            self.failures
        )
    }
}

#[derive(Debug, Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    bypasses: AtomicU64,
    stores: AtomicU64,
    expired: AtomicU64,
    failures: AtomicU64,
}

impl Counters {
    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot(&self) -> FieldCacheStats {
        FieldCacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            bypasses: self.bypasses.load(Ordering::Relaxed),
            stores: self.stores.load(Ordering::Relaxed),
            expired: self.expired.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
        }
    }
}

/// Memoizes resolver results in a [`StorageBackend`].
///
/// Guarantees at most one computation per live fingerprint *per caller that
/// observes the stored entry*: concurrent callers racing on the same
/// fingerprint can all miss and all compute, and the last write wins. There
/// is no single-flight de-duplication.
///
/// All caching failures degrade to "compute and return"; only the resolver's
/// own error is ever returned.
#[derive(Debug)]
pub struct FieldCache<B = Backend> {
    backend: B,
    clock: Arc<dyn Clock>,
    counters: Counters,
}

impl FieldCache<Backend> {
    /// Build a field cache from configuration.
    ///
    /// Only the backend is constructed. Installing a log subscriber is left to
    /// the host, e.g. with [`crate::logging::init_tracing`] and
    /// `config.log_level`.
    pub async fn from_config(config: &CacheConfig) -> Result<Self> {
        config.validate()?;
        let backend = Backend::from_config(config).await?;
        Ok(Self::new(backend))
    }
}

impl<B: StorageBackend> FieldCache<B> {
    /// Wrap a backend, using the system clock
    pub fn new(backend: B) -> Self {
        Self::with_clock(backend, Arc::new(SystemClock))
    }

    /// Wrap a backend with an explicit clock
    pub fn with_clock(backend: B, clock: Arc<dyn Clock>) -> Self {
        Self {
            backend,
            clock,
            counters: Counters::default(),
        }
    }

    /// The backend this cache owns
    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Snapshot of the counters
    pub fn stats(&self) -> FieldCacheStats {
        self.counters.snapshot()
    }

    /// Serve a field from the cache, or compute and store it.
    ///
    /// * `max_age` of `None` (no caching policy) or `Some(0)` bypasses the
    ///   cache and just awaits `compute`.
    /// * Calls whose key cannot be derived are bypassed the same way.
    /// * A live entry is returned without calling `compute`.
    /// * On a miss, `compute` runs once. Its error is returned unchanged and
    ///   nothing is stored; its value is stored with `max_age` and returned.
    ///
    /// Dropping the returned future cancels the in-flight computation and
    /// writes nothing.
    pub async fn handle<O, F, Fut, E>(
        &self,
        ctx: &FieldContext,
        object: Option<&O>,
        max_age: Option<u32>,
        compute: F,
    ) -> std::result::Result<Value, E>
    where
        O: CacheIdentity + ?Sized,
        F: FnOnce() -> Fut,
        Fut: Future<Output = std::result::Result<Value, E>>,
    {
        let Some(max_age) = max_age.filter(|secs| *secs > 0) else {
            Counters::bump(&self.counters.bypasses);
            return compute().await;
        };

        let Some(key) = derive_key(ctx, object) else {
            debug!(
                object_type = %ctx.object_type,
                field = %ctx.field_name,
                "field not cacheable, bypassing"
            );
            Counters::bump(&self.counters.bypasses);
            return compute().await;
        };

        if let Some(payload) = self.read_live(&key).await {
            Counters::bump(&self.counters.hits);
            debug!(fingerprint = %key.fingerprint, key = %key.diagnostic, "cache hit");
            return Ok(payload);
        }

        Counters::bump(&self.counters.misses);
        debug!(fingerprint = %key.fingerprint, key = %key.diagnostic, "cache miss");

        let value = match compute().await {
            Ok(value) => value,
            Err(e) => {
                Counters::bump(&self.counters.failures);
                return Err(e);
            }
        };

        let entry = CacheEntry::new(key.fingerprint, max_age, self.clock.now(), value.clone());
        if self.backend.set(key.fingerprint, entry).await {
            Counters::bump(&self.counters.stores);
            debug!(fingerprint = %key.fingerprint, key = %key.diagnostic, max_age, "cache set");
        } else {
            warn!(fingerprint = %key.fingerprint, key = %key.diagnostic, "backend rejected write");
        }

        Ok(value)
    }

    /// Read-only probe: the live cached value for this call, if any
    pub async fn lookup<O>(&self, ctx: &FieldContext, object: Option<&O>) -> Option<Value>
    where
        O: CacheIdentity + ?Sized,
    {
        let key = derive_key(ctx, object)?;
        self.read_live(&key).await
    }

    /// Drop the cached value for this call. Returns whether something was removed.
    pub async fn invalidate<O>(&self, ctx: &FieldContext, object: Option<&O>) -> bool
    where
        O: CacheIdentity + ?Sized,
    {
        match derive_key(ctx, object) {
            Some(key) => {
                debug!(fingerprint = %key.fingerprint, key = %key.diagnostic, "invalidating");
                self.backend.delete(key.fingerprint).await
            }
            None => false,
        }
    }

    /// Drop the entry stored under a known fingerprint
    pub async fn evict(&self, fingerprint: Fingerprint) -> bool {
        self.backend.delete(fingerprint).await
    }

    async fn read_live(&self, key: &DerivedKey) -> Option<Value> {
        let entry = self.backend.get(key.fingerprint).await?;

        if entry.is_live_at(self.clock.now()) {
            return Some(entry.payload);
        }

        Counters::bump(&self.counters.expired);
        debug!(
            fingerprint = %key.fingerprint,
            key = %key.diagnostic,
            created_at = %entry.created_at,
            max_age = entry.max_age,
            "cache entry past max-age, evicting"
        );
        // A fresh write may have landed since the read; only drop what we saw
        self.backend
            .delete_if_created(key.fingerprint, entry.created_at)
            .await;
        None
    }
}
