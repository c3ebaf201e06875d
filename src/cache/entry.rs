//! Cache entry with per-entry max-age and the remote envelope format

use crate::cache::types::Fingerprint;
use crate::error::{CacheError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

/// Current envelope layout version
pub const ENVELOPE_VERSION: u8 = 1;

/// A stored field result together with its validity window
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Fingerprint the entry is stored under
    pub key: Fingerprint,

    /// Caller-declared validity window, in seconds
    pub max_age: u32,

    /// When the entry was written
    pub created_at: DateTime<Utc>,

    /// The resolver result
    pub payload: Value,
}

/// Wire form of an entry in the remote store
#[derive(Serialize, Deserialize)]
struct Envelope {
    v: u8,
    key: Fingerprint,
    max_age: u32,
    created_at: DateTime<Utc>,
    payload: Value,
}

impl CacheEntry {
    /// Create a new cache entry
    pub fn new(key: Fingerprint, max_age: u32, created_at: DateTime<Utc>, payload: Value) -> Self {
        Self {
            key,
            max_age,
            created_at,
            payload,
        }
    }

    /// Instant at which the entry stops being live
    pub fn expires_at(&self) -> DateTime<Utc> {
        self.created_at + chrono::Duration::seconds(i64::from(self.max_age))
    }

    /// An entry is live iff `now < created_at + max_age`
    pub fn is_live_at(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at()
    }

    /// Age of the entry at `now` (zero if `now` precedes creation)
    pub fn age_at(&self, now: DateTime<Utc>) -> Duration {
        (now - self.created_at)
            .to_std()
            .unwrap_or(Duration::from_secs(0))
    }

    /// Time left before expiry, or `None` if already expired
    pub fn remaining_at(&self, now: DateTime<Utc>) -> Option<Duration> {
        if self.is_live_at(now) {
            (self.expires_at() - now).to_std().ok()
        } else {
            None
        }
    }

    /// Serialize into the binary envelope stored by the remote backend
    pub fn to_envelope(&self) -> Result<Vec<u8>> {
        let envelope = Envelope {
            v: ENVELOPE_VERSION,
            key: self.key,
            max_age: self.max_age,
            created_at: self.created_at,
            payload: self.payload.clone(),
        };
        Ok(serde_json::to_vec(&envelope)?)
    }

    /// Decode an envelope previously produced by [`CacheEntry::to_envelope`]
    pub fn from_envelope(bytes: &[u8]) -> Result<Self> {
        let envelope: Envelope = serde_json::from_slice(bytes)?;
        if envelope.v != ENVELOPE_VERSION {
            return Err(CacheError::Other(format!(
                "unsupported envelope version {}",
                envelope.v
            )));
        }

        Ok(Self {
            key: envelope.key,
            max_age: envelope.max_age,
            created_at: envelope.created_at,
            payload: envelope.payload,
        })
    }
}
