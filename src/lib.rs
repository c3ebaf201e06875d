//! # field-cache
//!
//! A result cache for GraphQL field resolvers.
//!
//! The invoker (the request-execution pipeline) hands the cache the call
//! context, the object being resolved and a callback that performs the real
//! work. The cache derives a fingerprint, serves a live stored result when it
//! has one, and otherwise runs the callback and stores what it returns for
//! the caller-declared max-age.
//!
//! ## Backends
//!
//! - [`InProcessStore`]: LRU map with a fixed capacity and TTL
//! - [`RemoteStore`]: Redis/Valkey, shared between processes
//!
//! Both fail open. A broken backend makes every call recompute; it never
//! turns into an error for the caller.
//!
//! ## Wiring from configuration
//!
//! ```no_run
//! use field_cache::{CacheConfig, FieldCache, FieldContext};
//! use serde_json::{json, Value};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = CacheConfig::from_env()?;
//!     field_cache::logging::init_tracing(&config.log_level);
//!     let cache = FieldCache::from_config(&config).await?;
//!
//!     let ctx = FieldContext::new("Query", "todos").with_raw_query("{ todos { id } }");
//!     let todos = cache
//!         .handle::<Value, _, _, anyhow::Error>(&ctx, None, Some(5), || async {
//!             Ok(json!([{"id": "1"}]))
//!         })
//!         .await?;
//!     println!("{}", todos);
//!     Ok(())
//! }
//! ```

pub mod cache;
pub mod error;
pub mod logging;

// Re-export main types for convenience
pub use cache::{
    Backend, BackendKind, CacheConfig, CacheConfigBuilder, CacheEntry, CacheIdentity, CacheStats,
    Clock, DerivedKey, FieldCache, FieldCacheStats, FieldContext, Fingerprint, InProcessStore,
    ManualClock, ObjectIdentity, RemoteConfig, RemoteStore, StorageBackend, SystemClock,
};
pub use error::{CacheError, Result};
