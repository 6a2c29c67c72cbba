//! # Key-Value Store
//!
//! The persistence seam of the offline layer. Everything the queue, the
//! response cache and the credential store keep across restarts goes
//! through this trait as a string value under a string key.
//!
//! ## Keys In Use
//! ```text
//! offline_queue                      JSON array of queue items
//! API_CACHE_<url>_<params JSON>      cached GET response envelope
//! authToken                          bearer credential
//! ```
//!
//! There is no transaction spanning two keys: a crash between writing one
//! key and another leaves them individually consistent only.

use async_trait::async_trait;
use std::collections::BTreeMap;
use tokio::sync::RwLock;

use crate::error::DbResult;

/// String-keyed persistent storage.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Reads a value. Missing keys yield `Ok(None)`.
    async fn get(&self, key: &str) -> DbResult<Option<String>>;

    /// Writes a value, replacing any previous one.
    async fn set(&self, key: &str, value: &str) -> DbResult<()>;

    /// Deletes a key. Deleting a missing key is not an error.
    async fn remove(&self, key: &str) -> DbResult<()>;

    /// Lists every key starting with `prefix`, in lexical order.
    async fn keys_with_prefix(&self, prefix: &str) -> DbResult<Vec<String>>;
}

// =============================================================================
// In-Memory Store
// =============================================================================

/// Non-durable store backed by a sorted map.
///
/// Used by tests and by embedders that persist state some other way.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<BTreeMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored keys.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> DbResult<Option<String>> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> DbResult<()> {
        self.entries
            .write()
            .await
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn remove(&self, key: &str) -> DbResult<()> {
        self.entries.write().await.remove(key);
        Ok(())
    }

    async fn keys_with_prefix(&self, prefix: &str) -> DbResult<Vec<String>> {
        let entries = self.entries.read().await;
        Ok(entries
            .range(prefix.to_string()..)
            .take_while(|(key, _)| key.starts_with(prefix))
            .map(|(key, _)| key.clone())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_store_roundtrip() {
        let store = MemoryStore::new();
        assert!(store.get("authToken").await.unwrap().is_none());

        store.set("authToken", "t1").await.unwrap();
        store.set("authToken", "t2").await.unwrap();
        assert_eq!(store.get("authToken").await.unwrap().as_deref(), Some("t2"));

        store.remove("authToken").await.unwrap();
        store.remove("authToken").await.unwrap();
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_memory_store_prefix_scan() {
        let store = MemoryStore::new();
        store.set("API_CACHE_/b_{}", "2").await.unwrap();
        store.set("API_CACHE_/a_{}", "1").await.unwrap();
        store.set("authToken", "t").await.unwrap();
        store.set("offline_queue", "[]").await.unwrap();

        let keys = store.keys_with_prefix("API_CACHE_").await.unwrap();
        assert_eq!(keys, vec!["API_CACHE_/a_{}", "API_CACHE_/b_{}"]);
        assert_eq!(store.len().await, 4);
    }
}
