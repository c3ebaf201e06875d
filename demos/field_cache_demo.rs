//! Field Cache Demo Application
//!
//! Wraps a slow resolver in the field cache and shows hits, misses and
//! expiry.
//!
//! Usage:
//!   cargo run --example field_cache_demo
//!
//! Environment variables:
//!   FIELD_CACHE_BACKEND   - memory or remote (default: memory)
//!   VALKEY_HOST           - remote store address (default: 127.0.0.1:6379)
//!   FIELD_CACHE_LOG_LEVEL - log verbosity (default: info)

use field_cache::{CacheConfig, FieldCache, FieldContext};
use serde_json::{json, Value};
use std::time::{Duration, Instant};
use tracing::info;

// Stand-in for a resolver that hits a database
async fn resolve_user(todo: &Value) -> anyhow::Result<Value> {
    tokio::time::sleep(Duration::from_millis(250)).await;
    let owner = todo["owner"].as_str().unwrap_or("nobody");
    Ok(json!({"id": owner, "name": owner.to_uppercase()}))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = CacheConfig::from_env()?;
    field_cache::logging::init_tracing(&config.log_level);
    let cache = FieldCache::from_config(&config).await?;

    info!("=== Field Cache Demo ===");
    info!("backend: {:?}", cache.backend().kind());

    let ctx = FieldContext::new("Todo", "user").variable("withAvatar", json!(false));
    let todo = json!({"id": "todo-1", "text": "write the demo", "owner": "ada"});

    info!("\n--- Repeated calls within max-age ---");
    for round in 1..=3 {
        let started = Instant::now();
        let user = cache
            .handle(&ctx, Some(&todo), Some(2), || resolve_user(&todo))
            .await?;
        info!(
            "round {}: {} in {:?}",
            round,
            user,
            started.elapsed()
        );
    }

    info!("\n--- After max-age has passed ---");
    tokio::time::sleep(Duration::from_millis(2100)).await;
    let started = Instant::now();
    let user = cache
        .handle(&ctx, Some(&todo), Some(2), || resolve_user(&todo))
        .await?;
    info!("recomputed: {} in {:?}", user, started.elapsed());

    info!("\n--- No caching policy ---");
    let started = Instant::now();
    cache
        .handle(&ctx, Some(&todo), None, || resolve_user(&todo))
        .await?;
    info!("bypassed in {:?}", started.elapsed());

    info!("\n--- Failures are not cached ---");
    let failed = cache
        .handle(&ctx, Some(&json!({"id": "todo-2"})), Some(30), || async {
            Err::<Value, _>(anyhow::anyhow!("upstream unavailable"))
        })
        .await;
    info!("first call: {:?}", failed.err().map(|e| e.to_string()));
    let recovered = cache
        .handle(&ctx, Some(&json!({"id": "todo-2"})), Some(30), || async {
            Ok::<_, anyhow::Error>(json!({"id": "grace"}))
        })
        .await?;
    info!("second call: {}", recovered);

    info!("\n--- Statistics ---");
    info!("{}", cache.stats());

    Ok(())
}
