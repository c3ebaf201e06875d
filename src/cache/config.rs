//! Configuration for the field cache

use crate::error::{CacheError, Result};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;

/// Address used when no remote host is configured
pub const DEFAULT_REMOTE_ADDRESS: &str = "127.0.0.1:6379";

/// Which storage backend the field cache should use
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Capacity-bounded LRU map inside the process
    Memory,
    /// Redis/Valkey server
    Remote,
}

impl FromStr for BackendKind {
    type Err = CacheError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "memory" | "in-memory" | "inprocess" | "in-process" => Ok(BackendKind::Memory),
            "remote" | "valkey" | "redis" => Ok(BackendKind::Remote),
            other => Err(CacheError::Config(format!("unknown backend '{}'", other))),
        }
    }
}

/// Construction-time configuration for the field cache
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Maximum number of entries held by the in-process store
    pub capacity: usize,

    /// Store-wide time-to-live. Enforced natively by the in-process store and
    /// as the server-side expiry by the remote store.
    pub default_ttl: Duration,

    /// Backend selection
    pub backend: BackendKind,

    /// Remote store address (`host:port` or `redis://...` URL)
    pub remote_address: String,

    /// Prefix prepended to remote keys
    pub remote_key_prefix: String,

    /// Timeout for a single remote operation
    pub remote_operation_timeout: Duration,

    /// Random variation applied to the remote server-side TTL (0.0 - 1.0)
    pub ttl_jitter: f64,

    /// Diagnostic log verbosity (`error`, `warn`, `info`, `debug`, `trace`)
    pub log_level: String,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            capacity: 100,
            default_ttl: Duration::from_secs(5),
            backend: BackendKind::Memory,
            remote_address: DEFAULT_REMOTE_ADDRESS.to_string(),
            remote_key_prefix: String::new(),
            remote_operation_timeout: Duration::from_secs(2),
            ttl_jitter: 0.0,
            log_level: "info".to_string(),
        }
    }
}

impl CacheConfig {
    /// Create a new builder for cache configuration
    pub fn builder() -> CacheConfigBuilder {
        CacheConfigBuilder::default()
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.capacity == 0 {
            return Err(CacheError::Config(
                "capacity must be greater than 0".to_string(),
            ));
        }

        if self.default_ttl.is_zero() {
            return Err(CacheError::Config(
                "default_ttl must be greater than 0".to_string(),
            ));
        }

        if !(0.0..=1.0).contains(&self.ttl_jitter) {
            return Err(CacheError::Config(
                "ttl_jitter must be between 0.0 and 1.0".to_string(),
            ));
        }

        if self.backend == BackendKind::Remote && self.remote_address.trim().is_empty() {
            return Err(CacheError::Config(
                "remote_address must not be empty".to_string(),
            ));
        }

        tracing::Level::from_str(&self.log_level).map_err(|_| {
            CacheError::Config(format!("invalid log level '{}'", self.log_level))
        })?;

        Ok(())
    }

    /// Build a configuration from the process environment (and a `.env` file, if present).
    ///
    /// Recognized variables: `FIELD_CACHE_CAPACITY`, `FIELD_CACHE_TTL_SECS`,
    /// `FIELD_CACHE_BACKEND`, `VALKEY_HOST`, `FIELD_CACHE_KEY_PREFIX`,
    /// `FIELD_CACHE_LOG_LEVEL`. Unset variables keep their defaults.
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut builder = Self::builder();

        if let Some(raw) = lookup("FIELD_CACHE_CAPACITY") {
            let capacity = raw.trim().parse::<usize>().map_err(|e| {
                CacheError::Config(format!("FIELD_CACHE_CAPACITY '{}': {}", raw, e))
            })?;
            builder = builder.capacity(capacity);
        }

        if let Some(raw) = lookup("FIELD_CACHE_TTL_SECS") {
            let secs = raw.trim().parse::<u64>().map_err(|e| {
                CacheError::Config(format!("FIELD_CACHE_TTL_SECS '{}': {}", raw, e))
            })?;
            builder = builder.default_ttl(Duration::from_secs(secs));
        }

        if let Some(raw) = lookup("FIELD_CACHE_BACKEND") {
            builder = builder.backend(raw.parse()?);
        }

        if let Some(host) = lookup("VALKEY_HOST").filter(|h| !h.trim().is_empty()) {
            builder = builder.remote_address(host);
        }

        if let Some(prefix) = lookup("FIELD_CACHE_KEY_PREFIX") {
            builder = builder.remote_key_prefix(prefix);
        }

        if let Some(level) = lookup("FIELD_CACHE_LOG_LEVEL") {
            builder = builder.log_level(level);
        }

        let config = builder.build();
        config.validate()?;
        Ok(config)
    }

    /// Configuration for a single process without external services
    pub fn in_memory(capacity: usize, default_ttl: Duration) -> Self {
        Self {
            capacity,
            default_ttl,
            backend: BackendKind::Memory,
            ..Default::default()
        }
    }

    /// Configuration for a shared Redis/Valkey server
    pub fn remote(address: impl Into<String>, default_ttl: Duration) -> Self {
        Self {
            default_ttl,
            backend: BackendKind::Remote,
            remote_address: address.into(),
            ..Default::default()
        }
    }
}

/// Builder for cache configuration
#[derive(Debug, Default)]
pub struct CacheConfigBuilder {
    capacity: Option<usize>,
    default_ttl: Option<Duration>,
    backend: Option<BackendKind>,
    remote_address: Option<String>,
    remote_key_prefix: Option<String>,
    remote_operation_timeout: Option<Duration>,
    ttl_jitter: Option<f64>,
    log_level: Option<String>,
}

impl CacheConfigBuilder {
    /// Set the in-process capacity
    pub fn capacity(mut self, capacity: usize) -> Self {
        self.capacity = Some(capacity);
        self
    }

    /// Set the store-wide TTL
    pub fn default_ttl(mut self, ttl: Duration) -> Self {
        self.default_ttl = Some(ttl);
        self
    }

    /// Select the backend
    pub fn backend(mut self, backend: BackendKind) -> Self {
        self.backend = Some(backend);
        self
    }

    /// Set the remote store address
    pub fn remote_address(mut self, address: impl Into<String>) -> Self {
        self.remote_address = Some(address.into());
        self
    }

    /// Set the remote key prefix
    pub fn remote_key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.remote_key_prefix = Some(prefix.into());
        self
    }

    /// Set the per-operation timeout for the remote store
    pub fn remote_operation_timeout(mut self, timeout: Duration) -> Self {
        self.remote_operation_timeout = Some(timeout);
        self
    }

    /// Set TTL jitter factor (0.0 - 1.0)
    pub fn ttl_jitter(mut self, jitter: f64) -> Self {
        self.ttl_jitter = Some(jitter);
        self
    }

    /// Set the diagnostic log level
    pub fn log_level(mut self, level: impl Into<String>) -> Self {
        self.log_level = Some(level.into());
        self
    }

    /// Build the cache configuration
    pub fn build(self) -> CacheConfig {
        let defaults = CacheConfig::default();

        CacheConfig {
            capacity: self.capacity.unwrap_or(defaults.capacity),
            default_ttl: self.default_ttl.unwrap_or(defaults.default_ttl),
            backend: self.backend.unwrap_or(defaults.backend),
            remote_address: self.remote_address.unwrap_or(defaults.remote_address),
            remote_key_prefix: self.remote_key_prefix.unwrap_or(defaults.remote_key_prefix),
            remote_operation_timeout: self
                .remote_operation_timeout
                .unwrap_or(defaults.remote_operation_timeout),
            ttl_jitter: self.ttl_jitter.unwrap_or(defaults.ttl_jitter),
            log_level: self.log_level.unwrap_or(defaults.log_level),
        }
    }
}
