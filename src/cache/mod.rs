//! # Field Result Cache
//!
//! Memoizes the output of expensive field resolvers, keyed on the field being
//! resolved, the object it is resolved on and the call variables.
//!
//! ## Components
//!
//! - **Key derivation** ([`key`]): canonical, order-independent fingerprints
//!   from loosely typed call context
//! - **In-process store** ([`store`]): capacity-bounded LRU map with a
//!   store-wide TTL
//! - **Remote store** ([`remote`]): Redis/Valkey with server-side expiry
//! - **Field cache** ([`field`]): the invoke-or-serve decision around a
//!   resolver callback, with lazy per-entry max-age checks
//!
//! ## Example
//!
//! ```rust
//! use field_cache::cache::{FieldCache, FieldContext, InProcessStore};
//! use serde_json::json;
//! use std::time::Duration;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let store = InProcessStore::new(1_000, Duration::from_secs(60))?;
//! let cache = FieldCache::new(store);
//!
//! let ctx = FieldContext::new("Todo", "user").variable("first", json!(10));
//! let todo = json!({"id": "todo-1", "text": "write docs"});
//!
//! let user = cache
//!     .handle(&ctx, Some(&todo), Some(30), || async {
//!         Ok::<_, anyhow::Error>(json!({"id": "u-1", "name": "Ada"}))
//!     })
//!     .await?;
//! assert_eq!(user["name"], "Ada");
//! # Ok(())
//! # }
//! ```

pub mod backend;
pub mod clock;
pub mod config;
pub mod entry;
pub mod field;
pub mod key;
pub mod remote;
pub mod store;
pub mod types;

pub use backend::{Backend, StorageBackend};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{BackendKind, CacheConfig, CacheConfigBuilder, DEFAULT_REMOTE_ADDRESS};
pub use entry::CacheEntry;
pub use field::{FieldCache, FieldCacheStats};
pub use key::{
    canonical_json, derive_key, fnv1a_64, CacheIdentity, DerivedKey, FieldContext, ObjectIdentity,
};
pub use remote::{RemoteConfig, RemoteStore};
pub use store::InProcessStore;
pub use types::{CacheStats, Fingerprint};
