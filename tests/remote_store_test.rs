//! Integration tests for the Redis/Valkey store
//!
//! These tests require a running Redis-compatible server (address taken from
//! `VALKEY_HOST`) or use Testcontainers to spin up a temporary one.

use chrono::Utc;
use field_cache::cache::{
    derive_key, CacheEntry, FieldCache, FieldContext, Fingerprint, RemoteConfig, RemoteStore,
    StorageBackend,
};
use field_cache::{BackendKind, CacheConfig};
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

// Server address from the environment, or the local default
fn remote_config() -> RemoteConfig {
    let address =
        std::env::var("VALKEY_HOST").unwrap_or_else(|_| "127.0.0.1:6379".to_string());
    RemoteConfig {
        address,
        key_prefix: format!("field-cache-test:{}:", rand::random::<u32>()),
        ttl: Duration::from_secs(5),
        ..Default::default()
    }
}

fn entry(key: Fingerprint, payload: serde_json::Value) -> CacheEntry {
    CacheEntry::new(key, 30, Utc::now(), payload)
}

#[tokio::test]
#[ignore] // Run with: cargo test --ignored
async fn test_remote_ping() {
    let store = RemoteStore::connect(remote_config())
        .await
        .expect("Failed to connect to remote store");

    assert!(store.ping().await.is_ok(), "PING should succeed");
}

#[tokio::test]
#[ignore]
async fn test_remote_set_get_delete() {
    let store = RemoteStore::connect(remote_config())
        .await
        .expect("Failed to connect to remote store");
    let key = Fingerprint::from_hash(0xfeed_beef);

    assert!(store.get(key).await.is_none());

    let written = entry(key, json!({"id": "u-1", "name": "Ada"}));
    assert!(store.set(key, written.clone()).await);

    let read = store.get(key).await.expect("entry should be present");
    assert_eq!(read.key, key);
    assert_eq!(read.max_age, 30);
    assert_eq!(read.payload, written.payload);
    assert_eq!(read.created_at, written.created_at);

    assert!(store.delete(key).await);
    assert!(!store.delete(key).await);
    assert!(store.get(key).await.is_none());
}

#[tokio::test]
#[ignore]
async fn test_remote_conditional_delete() {
    let store = RemoteStore::connect(remote_config())
        .await
        .expect("Failed to connect to remote store");
    let key = Fingerprint::from_hash(0xdead_cafe);

    let stale = entry(key, json!("stale"));
    let fresh = CacheEntry::new(
        key,
        30,
        stale.created_at + chrono::Duration::seconds(1),
        json!("fresh"),
    );
    assert!(store.set(key, fresh.clone()).await);

    assert!(!store.delete_if_created(key, stale.created_at).await);
    assert_eq!(store.get(key).await.unwrap().payload, json!("fresh"));

    assert!(store.delete_if_created(key, fresh.created_at).await);
    assert!(store.get(key).await.is_none());
}

#[tokio::test]
#[ignore]
async fn test_remote_server_side_expiry() {
    let config = RemoteConfig {
        ttl: Duration::from_secs(1),
        ..remote_config()
    };
    let store = RemoteStore::connect(config)
        .await
        .expect("Failed to connect to remote store");
    let key = Fingerprint::from_hash(42);

    assert!(store.set(key, entry(key, json!("short-lived"))).await);
    assert!(store.get(key).await.is_some());

    tokio::time::sleep(Duration::from_millis(2100)).await;
    assert!(store.get(key).await.is_none(), "server should have expired the key");
}

#[tokio::test]
#[ignore]
async fn test_remote_undecodable_value_is_a_miss() {
    let config = remote_config();
    let store = RemoteStore::connect(config.clone())
        .await
        .expect("Failed to connect to remote store");
    let key = Fingerprint::from_hash(7);

    let client = redis::Client::open(config.connection_url()).unwrap();
    let mut conn = client.get_multiplexed_async_connection().await.unwrap();
    redis::cmd("SET")
        .arg(config.key_for(key))
        .arg("not an envelope")
        .query_async::<_, ()>(&mut conn)
        .await
        .unwrap();

    assert!(store.try_get(key).await.is_err());
    assert!(store.get(key).await.is_none());

    store.try_delete(key).await.unwrap();
}

#[tokio::test]
#[ignore]
async fn test_field_cache_over_remote_store() {
    let store = RemoteStore::connect(remote_config())
        .await
        .expect("Failed to connect to remote store");
    let cache = FieldCache::new(store);
    let ctx = FieldContext::new("Todo", "user").variable("size", json!(64));
    let todo = json!({"id": "todo-remote"});
    let calls = AtomicUsize::new(0);

    for _ in 0..3 {
        let value = cache
            .handle(&ctx, Some(&todo), Some(30), || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok::<_, String>(json!({"name": "ada"}))
            })
            .await
            .unwrap();
        assert_eq!(value, json!({"name": "ada"}));
    }
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    let key = derive_key(&ctx, Some(&todo)).unwrap();
    assert!(cache.evict(key.fingerprint).await);
}

#[tokio::test]
#[ignore]
async fn test_from_config_selects_remote_backend() {
    let address =
        std::env::var("VALKEY_HOST").unwrap_or_else(|_| "127.0.0.1:6379".to_string());
    let config = CacheConfig::builder()
        .backend(BackendKind::Remote)
        .remote_address(address)
        .remote_key_prefix("field-cache-test:config:")
        .build();

    let cache = FieldCache::from_config(&config)
        .await
        .expect("Failed to build remote field cache");
    assert_eq!(cache.backend().kind(), BackendKind::Remote);
}

#[cfg(test)]
mod testcontainers_tests {
    use super::*;
    use testcontainers::clients::Cli;
    use testcontainers_modules::redis::Redis;

    #[tokio::test]
    #[ignore] // Needs a Docker daemon
    async fn test_with_testcontainer() {
        let docker = Cli::default();
        let redis_container = docker.run(Redis::default());
        let port = redis_container.get_host_port_ipv4(6379);

        let config = RemoteConfig {
            address: format!("127.0.0.1:{}", port),
            ..remote_config()
        };
        let store = RemoteStore::connect(config).await.unwrap();
        assert!(store.ping().await.is_ok());

        let key = Fingerprint::from_hash(1);
        assert!(store.set(key, entry(key, json!([1, 2, 3]))).await);
        assert_eq!(store.get(key).await.unwrap().payload, json!([1, 2, 3]));
    }
}
