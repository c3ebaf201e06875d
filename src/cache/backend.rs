//! Storage backend contract shared by the in-process and remote stores

use crate::cache::{
    config::{BackendKind, CacheConfig},
    entry::CacheEntry,
    remote::{RemoteConfig, RemoteStore},
    store::InProcessStore,
    types::Fingerprint,
};
use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;

/// Key-value storage behind a [`crate::cache::FieldCache`].
///
/// Implementations absorb their own failures: a broken backend reports a miss
/// from `get`, `false` from `set` and `delete`, and logs the cause. None of
/// these methods can fail the surrounding request.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Fetch the entry stored under `key`, if any
    async fn get(&self, key: Fingerprint) -> Option<CacheEntry>;

    /// Store `entry` under `key`. Returns whether the write was accepted.
    async fn set(&self, key: Fingerprint, entry: CacheEntry) -> bool;

    /// Remove the entry under `key`. Returns whether something was removed.
    async fn delete(&self, key: Fingerprint) -> bool;

    /// Remove the entry under `key` only if its `created_at` still equals
    /// `created_at`. An entry written since then is kept. The check and the
    /// removal must be atomic with respect to concurrent `set`s.
    async fn delete_if_created(&self, key: Fingerprint, created_at: DateTime<Utc>) -> bool;
}

#[async_trait]
impl<B: StorageBackend + ?Sized> StorageBackend for Arc<B> {
    async fn get(&self, key: Fingerprint) -> Option<CacheEntry> {
        (**self).get(key).await
    }

    async fn set(&self, key: Fingerprint, entry: CacheEntry) -> bool {
        (**self).set(key, entry).await
    }

    async fn delete(&self, key: Fingerprint) -> bool {
        (**self).delete(key).await
    }

    async fn delete_if_created(&self, key: Fingerprint, created_at: DateTime<Utc>) -> bool {
        (**self).delete_if_created(key, created_at).await
    }
}

#[async_trait]
impl<B: StorageBackend + ?Sized> StorageBackend for Box<B> {
    async fn get(&self, key: Fingerprint) -> Option<CacheEntry> {
        (**self).get(key).await
    }

    async fn set(&self, key: Fingerprint, entry: CacheEntry) -> bool {
        (**self).set(key, entry).await
    }

    async fn delete(&self, key: Fingerprint) -> bool {
        (**self).delete(key).await
    }

    async fn delete_if_created(&self, key: Fingerprint, created_at: DateTime<Utc>) -> bool {
        (**self).delete_if_created(key, created_at).await
    }
}

/// Backend chosen from a [`CacheConfig`]
#[derive(Debug)]
pub enum Backend {
    /// In-process LRU store
    Memory(InProcessStore),
    /// Redis/Valkey store
    Remote(RemoteStore),
}

impl Backend {
    /// Build the backend named by `config.backend`.
    ///
    /// For the remote backend this opens the connection, so it fails if the
    /// server cannot be reached at construction time.
    pub async fn from_config(config: &CacheConfig) -> Result<Self> {
        config.validate()?;

        match config.backend {
            BackendKind::Memory => Ok(Backend::Memory(InProcessStore::new(
                config.capacity,
                config.default_ttl,
            )?)),
            BackendKind::Remote => {
                let remote = RemoteStore::connect(RemoteConfig::from(config)).await?;
                Ok(Backend::Remote(remote))
            }
        }
    }

    /// Which kind of backend this is
    pub fn kind(&self) -> BackendKind {
        match self {
            Backend::Memory(_) => BackendKind::Memory,
            Backend::Remote(_) => BackendKind::Remote,
        }
    }
}

#[async_trait]
impl StorageBackend for Backend {
    async fn get(&self, key: Fingerprint) -> Option<CacheEntry> {
        match self {
            Backend::Memory(store) => store.get(key).await,
            Backend::Remote(store) => StorageBackend::get(store, key).await,
        }
    }

    async fn set(&self, key: Fingerprint, entry: CacheEntry) -> bool {
        match self {
            Backend::Memory(store) => store.set(key, entry).await,
            Backend::Remote(store) => StorageBackend::set(store, key, entry).await,
        }
    }

    async fn delete(&self, key: Fingerprint) -> bool {
        match self {
            Backend::Memory(store) => store.delete(key).await,
            Backend::Remote(store) => StorageBackend::delete(store, key).await,
        }
    }

    async fn delete_if_created(&self, key: Fingerprint, created_at: DateTime<Utc>) -> bool {
        match self {
            Backend::Memory(store) => store.delete_if_created(key, created_at).await,
            Backend::Remote(store) => {
                StorageBackend::delete_if_created(store, key, created_at).await
            }
        }
    }
}
