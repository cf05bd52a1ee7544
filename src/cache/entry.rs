//! Cache entry codec.
//!
//! Values are stored as JSON documents carrying an absolute expiry:
//!
//! ```json
//! {"expires_at": "2024-01-01T00:05:00Z", "data": {"id": 5, "title": "..."}}
//! ```
//!
//! Freshness is judged at read time only. Nothing in this module touches the
//! store; deciding what to do with a stale entry is the manager's job.

use serde::{Deserialize, Serialize, de::DeserializeOwned};
use thiserror::Error;
use time::{Duration, OffsetDateTime, PrimitiveDateTime};

/// A value paired with the instant after which it must no longer be served.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry<T> {
    #[serde(with = "time::serde::rfc3339")]
    pub expires_at: OffsetDateTime,
    pub data: T,
}

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("cache entry is not valid json: {0}")]
    Malformed(#[from] serde_json::Error),
}

impl<T> CacheEntry<T> {
    /// Wrap `value` so that it expires `ttl_minutes` after `now`.
    ///
    /// Zero or negative TTLs are accepted; such an entry is stale as soon as
    /// the clock moves past `now`. The expiry always stays within the years
    /// RFC 3339 can express, so every wrapped entry can be encoded.
    pub fn wrap(value: T, ttl_minutes: i64, now: OffsetDateTime) -> Self {
        let ttl = Duration::seconds(ttl_minutes.saturating_mul(60));
        let expires_at = if ttl.is_negative() {
            now.checked_add(ttl)
                .filter(|at| at.year() >= 0)
                .unwrap_or_else(|| earliest_before(now))
        } else {
            now.checked_add(ttl)
                .unwrap_or_else(|| PrimitiveDateTime::MAX.assume_utc())
        };
        Self {
            expires_at,
            data: value,
        }
    }

    /// Fresh iff `now <= expires_at`.
    pub fn is_fresh(&self, now: OffsetDateTime) -> bool {
        now <= self.expires_at
    }

    /// Borrow the value if the entry is still fresh.
    pub fn unwrap(&self, now: OffsetDateTime) -> Option<&T> {
        self.is_fresh(now).then_some(&self.data)
    }

    /// Consume the entry, keeping the value only if it is still fresh.
    pub fn into_fresh(self, now: OffsetDateTime) -> Option<T> {
        self.is_fresh(now).then_some(self.data)
    }
}

/// An encodable instant already in the past relative to `now`.
fn earliest_before(now: OffsetDateTime) -> OffsetDateTime {
    now.checked_sub(Duration::NANOSECOND)
        .map_or(OffsetDateTime::UNIX_EPOCH, |at| at.min(OffsetDateTime::UNIX_EPOCH))
}

impl<T: Serialize> CacheEntry<T> {
    pub fn encode(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }
}

impl<T: DeserializeOwned> CacheEntry<T> {
    pub fn decode(bytes: &[u8]) -> Result<Self, DecodeError> {
        Ok(serde_json::from_slice(bytes)?)
    }
}
