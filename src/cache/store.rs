//! Key-value persistence behind the cache.
//!
//! The store is shared, externally synchronized storage: each call is atomic
//! for its key, and nothing here assumes multi-key transactions.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;

use super::lock::{rw_read, rw_write};

const SOURCE: &str = "cache::store";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("cache store unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    pub fn unavailable(err: impl std::fmt::Display) -> Self {
        Self::Unavailable(err.to_string())
    }
}

#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn exists(&self, key: &str) -> Result<bool, StoreError>;

    async fn get(&self, key: &str) -> Result<Option<Bytes>, StoreError>;

    /// Insert or overwrite.
    async fn set(&self, key: &str, value: Bytes) -> Result<(), StoreError>;

    /// Removing an absent key is not an error.
    async fn delete(&self, key: &str) -> Result<(), StoreError>;
}

/// Process-local store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<String, Bytes>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        rw_read(&self.entries, SOURCE, "len").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Sorted snapshot of the stored keys.
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = rw_read(&self.entries, SOURCE, "keys")
            .keys()
            .cloned()
            .collect();
        keys.sort();
        keys
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn exists(&self, key: &str) -> Result<bool, StoreError> {
        Ok(rw_read(&self.entries, SOURCE, "exists").contains_key(key))
    }

    async fn get(&self, key: &str) -> Result<Option<Bytes>, StoreError> {
        Ok(rw_read(&self.entries, SOURCE, "get").get(key).cloned())
    }

    async fn set(&self, key: &str, value: Bytes) -> Result<(), StoreError> {
        rw_write(&self.entries, SOURCE, "set").insert(key.to_string(), value);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        rw_write(&self.entries, SOURCE, "delete").remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::panic::{AssertUnwindSafe, catch_unwind};

    use super::*;

    #[tokio::test]
    async fn memory_store_roundtrip() {
        let store = MemoryStore::new();
        assert!(!store.exists("article-1").await.expect("exists"));

        store
            .set("article-1", Bytes::from_static(b"one"))
            .await
            .expect("set");
        assert!(store.exists("article-1").await.expect("exists"));
        assert_eq!(
            store.get("article-1").await.expect("get"),
            Some(Bytes::from_static(b"one"))
        );

        store
            .set("article-1", Bytes::from_static(b"two"))
            .await
            .expect("overwrite");
        assert_eq!(
            store.get("article-1").await.expect("get"),
            Some(Bytes::from_static(b"two"))
        );

        store.delete("article-1").await.expect("delete");
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn deleting_missing_key_is_a_noop() {
        let store = MemoryStore::new();
        store.delete("nope").await.expect("delete absent key");
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn memory_store_recovers_from_poisoned_lock() {
        let store = MemoryStore::new();

        let _ = catch_unwind(AssertUnwindSafe(|| {
            let _guard = store.entries.write().expect("entries lock should be acquired");
            panic!("poison entries lock");
        }));

        store
            .set("k", Bytes::from_static(b"v"))
            .await
            .expect("set after poison");
        assert_eq!(store.keys(), vec!["k".to_string()]);
    }
}
