//! Invalidation of cache entries made incorrect by a change at the source.
//!
//! Any per-entity change also taints the aggregate ("list all") entry of its
//! key space, whether or not that entry's TTL has elapsed.

use std::sync::Arc;

use metrics::counter;
use thiserror::Error;
use tracing::{debug, info, instrument};

use super::keys::KeySpace;
use super::store::{KeyValueStore, StoreError};

/// Kind of change reported for a source row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeOperation {
    Insert,
    Update,
    Delete,
}

/// A change reported by the source of truth.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceChange {
    /// A new row exists; it is not individually cached yet.
    Inserted,
    Updated { id: String },
    Deleted { id: String },
}

impl SourceChange {
    pub fn operation(&self) -> ChangeOperation {
        match self {
            Self::Inserted => ChangeOperation::Insert,
            Self::Updated { .. } => ChangeOperation::Update,
            Self::Deleted { .. } => ChangeOperation::Delete,
        }
    }

    /// Keys this change makes incorrect, entity key first.
    pub fn affected_keys(&self, keys: &KeySpace) -> Vec<String> {
        match self {
            Self::Inserted => vec![keys.aggregate_key().to_string()],
            Self::Updated { id } | Self::Deleted { id } => {
                vec![keys.entity_key(id), keys.aggregate_key().to_string()]
            }
        }
    }
}

#[derive(Debug, Error)]
#[error("failed to invalidate cache key `{key}`: {source}")]
pub struct InvalidationError {
    pub key: String,
    #[source]
    pub source: StoreError,
}

pub struct Invalidator {
    store: Arc<dyn KeyValueStore>,
}

impl Invalidator {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    /// Delete `key` if present. Absent keys are a no-op.
    pub async fn invalidate_key(&self, key: &str) -> Result<(), InvalidationError> {
        let wrap = |source| InvalidationError {
            key: key.to_string(),
            source,
        };

        if !self.store.exists(key).await.map_err(wrap)? {
            debug!(cache = "kv", op = "invalidate", key, outcome = "absent");
            return Ok(());
        }

        self.store.delete(key).await.map_err(wrap)?;
        counter!("readthrough_cache_invalidate_total").increment(1);
        info!(cache = "kv", op = "invalidate", key, "cache entry invalidated");
        Ok(())
    }

    /// Delete `key` and, when it differs, `aggregate_key`.
    ///
    /// Both deletions are attempted even if the first fails; the first error
    /// is returned.
    #[instrument(skip(self))]
    pub async fn invalidate_with_aggregate(
        &self,
        key: &str,
        aggregate_key: &str,
    ) -> Result<(), InvalidationError> {
        let entity = self.invalidate_key(key).await;
        if key == aggregate_key {
            return entity;
        }
        let aggregate = self.invalidate_key(aggregate_key).await;
        entity.and(aggregate)
    }

    /// Drop every entry made incorrect by `change` in `keys`.
    #[instrument(skip(self, keys), fields(table = %keys.table))]
    pub async fn apply_change(
        &self,
        keys: &KeySpace,
        change: &SourceChange,
    ) -> Result<(), InvalidationError> {
        match change {
            SourceChange::Inserted => self.invalidate_key(keys.aggregate_key()).await,
            SourceChange::Updated { id } | SourceChange::Deleted { id } => {
                self.invalidate_with_aggregate(&keys.entity_key(id), keys.aggregate_key())
                    .await
            }
        }
    }
}
