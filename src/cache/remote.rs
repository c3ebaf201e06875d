//! Redis/Valkey-backed store
//!
//! Entries are kept under the decimal text of their fingerprint (plus an
//! optional prefix) as an envelope produced by [`CacheEntry::to_envelope`].
//! Expiry is delegated to the server with `SET ... EX`; the envelope still
//! carries `created_at`/`max_age` so the field cache can apply the per-entry
//! max-age on read.
//!
//! The store fails open: transport errors, timeouts and undecodable values
//! all surface as a miss (or a rejected write) and are logged at `warn`,
//! while a plain missing key is logged at `debug`.

use crate::cache::{
    backend::StorageBackend,
    config::{CacheConfig, DEFAULT_REMOTE_ADDRESS},
    entry::CacheEntry,
    types::Fingerprint,
};
use crate::error::{CacheError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client};
use std::fmt;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, info, warn};

// Deletes KEYS[1] only while its envelope still carries created_at == ARGV[1]
const DELETE_IF_CREATED: &str = r#"
local current = redis.call('GET', KEYS[1])
if not current then
  return 0
end
local ok, envelope = pcall(cjson.decode, current)
if ok and type(envelope) == 'table' and envelope.created_at == ARGV[1] then
  return redis.call('DEL', KEYS[1])
end
return 0
"#;

/// `created_at` exactly as it is written into an envelope
fn envelope_timestamp(created_at: DateTime<Utc>) -> Result<String> {
    match serde_json::to_value(created_at)? {
        serde_json::Value::String(stamp) => Ok(stamp),
        other => Err(CacheError::Other(format!(
            "unexpected timestamp encoding {}",
            other
        ))),
    }
}

/// Connection and keying settings for [`RemoteStore`]
#[derive(Debug, Clone)]
pub struct RemoteConfig {
    /// `host:port` or a full `redis://` / `rediss://` URL
    pub address: String,

    /// Prefix prepended to every key
    pub key_prefix: String,

    /// Server-side expiry applied to every write
    pub ttl: Duration,

    /// Random variation applied to `ttl` (0.0 - 1.0)
    pub ttl_jitter: f64,

    /// Upper bound for connecting and for each command
    pub operation_timeout: Duration,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            address: DEFAULT_REMOTE_ADDRESS.to_string(),
            key_prefix: String::new(),
            ttl: Duration::from_secs(5),
            ttl_jitter: 0.0,
            operation_timeout: Duration::from_secs(2),
        }
    }
}

impl From<&CacheConfig> for RemoteConfig {
    fn from(config: &CacheConfig) -> Self {
        Self {
            address: config.remote_address.clone(),
            key_prefix: config.remote_key_prefix.clone(),
            ttl: config.default_ttl,
            ttl_jitter: config.ttl_jitter,
            operation_timeout: config.remote_operation_timeout,
        }
    }
}

impl RemoteConfig {
    /// Connection URL for the configured address
    pub fn connection_url(&self) -> String {
        let address = self.address.trim();
        let address = if address.is_empty() {
            DEFAULT_REMOTE_ADDRESS
        } else {
            address
        };

        if address.contains("://") {
            address.to_string()
        } else {
            format!("redis://{}", address)
        }
    }

    /// Remote key for a fingerprint
    pub fn key_for(&self, key: Fingerprint) -> String {
        format!("{}{}", self.key_prefix, key)
    }

    /// Server-side expiry in whole seconds (at least 1), jitter applied
    pub fn server_ttl_secs(&self) -> u64 {
        let base = self.ttl.as_secs_f64();
        let secs = if self.ttl_jitter > 0.0 {
            let range = base * self.ttl_jitter;
            base + (rand::random::<f64>() * 2.0 - 1.0) * range
        } else {
            base
        };

        (secs.ceil() as u64).max(1)
    }
}

/// Store backed by a Redis-protocol server
#[derive(Clone)]
pub struct RemoteStore {
    conn: ConnectionManager,
    config: RemoteConfig,
}

impl fmt::Debug for RemoteStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteStore")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl RemoteStore {
    /// Open the shared connection.
    ///
    /// The connection reconnects on its own after failures, so one store can
    /// live for the whole process.
    pub async fn connect(config: RemoteConfig) -> Result<Self> {
        let url = config.connection_url();
        info!(url = %url, "connecting to remote cache store");

        let client = Client::open(url.as_str())
            .map_err(|e| CacheError::Connection(format!("invalid address {}: {}", url, e)))?;

        let conn = match tokio::time::timeout(
            config.operation_timeout,
            client.get_connection_manager(),
        )
        .await
        {
            Ok(Ok(conn)) => conn,
            Ok(Err(e)) => {
                return Err(CacheError::Connection(format!("{}: {}", url, e)));
            }
            Err(_) => {
                return Err(CacheError::Connection(format!(
                    "{}: no connection within {}ms",
                    url,
                    config.operation_timeout.as_millis()
                )));
            }
        };

        info!(url = %url, "connected to remote cache store");
        Ok(Self { conn, config })
    }

    /// Settings this store was built with
    pub fn config(&self) -> &RemoteConfig {
        &self.config
    }

    async fn bounded<T, F>(&self, context: String, fut: F) -> Result<T>
    where
        F: Future<Output = redis::RedisResult<T>>,
    {
        match tokio::time::timeout(self.config.operation_timeout, fut).await {
            Ok(result) => Ok(result?),
            Err(_) => Err(CacheError::Timeout {
                timeout_ms: self.config.operation_timeout.as_millis() as u64,
                context,
            }),
        }
    }

    /// Round-trip a `PING` to the server
    pub async fn ping(&self) -> Result<()> {
        let mut conn = self.conn.clone();
        let reply: String = self
            .bounded("PING".to_string(), async move {
                redis::cmd("PING").query_async::<_, String>(&mut conn).await
            })
            .await?;

        if reply.eq_ignore_ascii_case("PONG") {
            Ok(())
        } else {
            Err(CacheError::Other(format!("unexpected PING reply: {}", reply)))
        }
    }

    /// Read an entry. `Ok(None)` means the key does not exist.
    pub async fn try_get(&self, key: Fingerprint) -> Result<Option<CacheEntry>> {
        let mut conn = self.conn.clone();
        let remote_key = self.config.key_for(key);

        let bytes: Option<Vec<u8>> = self
            .bounded(format!("GET {}", remote_key), async move {
                conn.get::<_, Option<Vec<u8>>>(&remote_key).await
            })
            .await?;

        let Some(bytes) = bytes else {
            return Ok(None);
        };

        let entry = CacheEntry::from_envelope(&bytes)?;
        if entry.key != key {
            return Err(CacheError::Other(format!(
                "envelope for {} holds fingerprint {}",
                key, entry.key
            )));
        }
        Ok(Some(entry))
    }

    /// Write an entry with the server-side expiry
    pub async fn try_set(&self, key: Fingerprint, entry: &CacheEntry) -> Result<()> {
        let bytes = entry.to_envelope()?;
        let ttl_secs = self.config.server_ttl_secs();
        let mut conn = self.conn.clone();
        let remote_key = self.config.key_for(key);

        self.bounded(format!("SET {}", remote_key), async move {
            redis::cmd("SET")
                .arg(&remote_key)
                .arg(bytes)
                .arg("EX")
                .arg(ttl_secs)
                .query_async::<_, ()>(&mut conn)
                .await
        })
        .await
    }

    /// Delete an entry. Returns the number of keys removed.
    pub async fn try_delete(&self, key: Fingerprint) -> Result<u64> {
        let mut conn = self.conn.clone();
        let remote_key = self.config.key_for(key);

        self.bounded(format!("DEL {}", remote_key), async move {
            conn.del::<_, u64>(&remote_key).await
        })
        .await
    }

    /// Delete an entry only if it is still the one created at `created_at`.
    ///
    /// Runs as a server-side script, so a write landing between the caller's
    /// read and this call is never removed. Returns the number of keys removed.
    pub async fn try_delete_if_created(
        &self,
        key: Fingerprint,
        created_at: DateTime<Utc>,
    ) -> Result<u64> {
        let stamp = envelope_timestamp(created_at)?;
        let mut conn = self.conn.clone();
        let remote_key = self.config.key_for(key);

        self.bounded(format!("EVAL delete-if-created {}", remote_key), async move {
            let script = redis::Script::new(DELETE_IF_CREATED);
            let removed = script
                .key(&remote_key)
                .arg(&stamp)
                .invoke_async::<_, u64>(&mut conn)
                .await;
            removed
        })
        .await
    }
}

#[async_trait]
impl StorageBackend for RemoteStore {
    async fn get(&self, key: Fingerprint) -> Option<CacheEntry> {
        match self.try_get(key).await {
            Ok(Some(entry)) => Some(entry),
            Ok(None) => {
                debug!(fingerprint = %key, "remote miss");
                None
            }
            Err(e) => {
                warn!(fingerprint = %key, error = %e, "remote get failed, treating as miss");
                None
            }
        }
    }

    async fn set(&self, key: Fingerprint, entry: CacheEntry) -> bool {
        match self.try_set(key, &entry).await {
            Ok(()) => true,
            Err(e) => {
                warn!(fingerprint = %key, error = %e, "remote set failed, dropping write");
                false
            }
        }
    }

    async fn delete(&self, key: Fingerprint) -> bool {
        match self.try_delete(key).await {
            Ok(removed) => removed > 0,
            Err(e) => {
                warn!(fingerprint = %key, error = %e, "remote delete failed");
                false
            }
        }
    }

    async fn delete_if_created(&self, key: Fingerprint, created_at: DateTime<Utc>) -> bool {
        match self.try_delete_if_created(key, created_at).await {
            Ok(removed) => removed > 0,
            Err(e) => {
                warn!(fingerprint = %key, error = %e, "remote conditional delete failed");
                false
            }
        }
    }
}
