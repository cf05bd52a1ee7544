//! Read-through orchestration.
//!
//! Reads consult the store, fall back to the source fetcher on a miss or a
//! stale entry, and write the fresh value back. Failures from the fetcher are
//! returned unchanged and never cached; stale data is never served in their
//! place.
//!
//! There is no per-key coordination: two concurrent misses on the same key
//! both fetch and both write, and the last write wins.

use std::sync::Arc;
use std::time::Instant;

use bytes::Bytes;
use metrics::{counter, histogram};
use serde::{Serialize, de::DeserializeOwned};
use thiserror::Error;
use tracing::{debug, instrument, warn};

use super::clock::{Clock, SystemClock};
use super::entry::CacheEntry;
use super::fetcher::SourceFetcher;
use super::store::{KeyValueStore, StoreError};

/// Where a value returned by the manager came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheSource {
    Hit,
    Miss,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Lookup<T> {
    pub value: T,
    pub source: CacheSource,
}

impl<T> Lookup<T> {
    pub fn is_hit(&self) -> bool {
        self.source == CacheSource::Hit
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Lookup<U> {
        Lookup {
            value: f(self.value),
            source: self.source,
        }
    }
}

#[derive(Debug, Error)]
pub enum CacheWriteError {
    #[error("failed to encode cache entry: {0}")]
    Encode(#[from] serde_json::Error),
    #[error(transparent)]
    Store(#[from] StoreError),
}

pub struct CacheManager {
    store: Arc<dyn KeyValueStore>,
    clock: Arc<dyn Clock>,
    default_ttl_minutes: i64,
}

impl CacheManager {
    pub fn new(
        store: Arc<dyn KeyValueStore>,
        clock: Arc<dyn Clock>,
        default_ttl_minutes: i64,
    ) -> Self {
        Self {
            store,
            clock,
            default_ttl_minutes,
        }
    }

    pub fn with_system_clock(store: Arc<dyn KeyValueStore>, default_ttl_minutes: i64) -> Self {
        Self::new(store, Arc::new(SystemClock), default_ttl_minutes)
    }

    /// TTL configured for this deployment.
    pub fn default_ttl(&self) -> i64 {
        self.default_ttl_minutes
    }

    pub fn store(&self) -> &Arc<dyn KeyValueStore> {
        &self.store
    }

    /// Serve `key` from the cache, or fetch, store and return it.
    pub async fn read_through<T, F>(
        &self,
        key: &str,
        ttl_minutes: i64,
        fetcher: F,
    ) -> Result<Lookup<T>, F::Error>
    where
        T: Serialize + DeserializeOwned + Send + Sync,
        F: SourceFetcher<T>,
    {
        self.read_through_when(key, ttl_minutes, fetcher, |_| true)
            .await
    }

    /// Like [`read_through`](Self::read_through) for fetchers that may find
    /// nothing. `None` is returned to the caller but never cached.
    pub async fn read_through_optional<T, F>(
        &self,
        key: &str,
        ttl_minutes: i64,
        fetcher: F,
    ) -> Result<Lookup<Option<T>>, F::Error>
    where
        T: Serialize + DeserializeOwned + Send + Sync,
        F: SourceFetcher<Option<T>>,
    {
        self.read_through_when(key, ttl_minutes, fetcher, Option::is_some)
            .await
    }

    /// Read-through where only fetched values accepted by `cacheable` are
    /// written back.
    #[instrument(skip_all, fields(key = %key))]
    pub async fn read_through_when<T, F, P>(
        &self,
        key: &str,
        ttl_minutes: i64,
        fetcher: F,
        cacheable: P,
    ) -> Result<Lookup<T>, F::Error>
    where
        T: Serialize + DeserializeOwned + Send + Sync,
        F: SourceFetcher<T>,
        P: FnOnce(&T) -> bool + Send,
    {
        if let Some(value) = self.lookup::<T>(key).await {
            counter!("readthrough_cache_hit_total").increment(1);
            debug!(cache = "kv", outcome = "hit", "serving cached value");
            return Ok(Lookup {
                value,
                source: CacheSource::Hit,
            });
        }

        counter!("readthrough_cache_miss_total").increment(1);
        debug!(cache = "kv", outcome = "miss", "fetching from source");

        let started = Instant::now();
        let fetched = fetcher.fetch().await;
        histogram!("readthrough_cache_fetch_ms")
            .record(started.elapsed().as_secs_f64() * 1000.0);

        let value = match fetched {
            Ok(value) => value,
            Err(err) => {
                debug!(cache = "kv", outcome = "fetch_failed", "source fetch failed");
                return Err(err);
            }
        };

        if cacheable(&value) {
            if let Err(err) = self.write_through(key, &value, ttl_minutes).await {
                counter!("readthrough_cache_store_error_total").increment(1);
                warn!(
                    cache = "kv",
                    op = "set",
                    error = %err,
                    "failed to store fetched value; serving it uncached"
                );
            }
        } else {
            debug!(cache = "kv", outcome = "not_cacheable", "fetched value not stored");
        }

        Ok(Lookup {
            value,
            source: CacheSource::Miss,
        })
    }

    /// Seed or refresh `key` with a known-good value. Always overwrites.
    pub async fn write_through<T>(
        &self,
        key: &str,
        value: &T,
        ttl_minutes: i64,
    ) -> Result<(), CacheWriteError>
    where
        T: Serialize + Sync,
    {
        let entry = CacheEntry::wrap(value, ttl_minutes, self.clock.now());
        let bytes = Bytes::from(entry.encode()?);
        self.store.set(key, bytes).await?;
        debug!(cache = "kv", op = "set", key, ttl_minutes, "cache entry written");
        Ok(())
    }

    /// Fresh cached value for `key`, if any.
    ///
    /// Missing, stale, undecodable and unreadable entries all count as a miss.
    /// Stale entries are left in the store; the next write replaces them.
    async fn lookup<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        match self.store.exists(key).await {
            Ok(true) => {}
            Ok(false) => return None,
            Err(err) => {
                store_read_failed("exists", &err);
                return None;
            }
        }

        let raw = match self.store.get(key).await {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(err) => {
                store_read_failed("get", &err);
                return None;
            }
        };

        let entry = match CacheEntry::<T>::decode(&raw) {
            Ok(entry) => entry,
            Err(err) => {
                counter!("readthrough_cache_decode_error_total").increment(1);
                warn!(
                    cache = "kv",
                    outcome = "undecodable",
                    error = %err,
                    "treating cache entry as a miss"
                );
                return None;
            }
        };

        let expires_at = entry.expires_at;
        let value = entry.into_fresh(self.clock.now());
        if value.is_none() {
            counter!("readthrough_cache_stale_total").increment(1);
            debug!(cache = "kv", outcome = "stale", %expires_at, "cache entry expired");
        }
        value
    }
}

fn store_read_failed(op: &'static str, err: &StoreError) {
    counter!("readthrough_cache_store_error_total").increment(1);
    warn!(cache = "kv", op, error = %err, "cache store read failed; treating as a miss");
}
