//! # Response Cache
//!
//! Last-known-good bodies of successful GET requests, served back while
//! offline.
//!
//! ## Entry Layout
//! ```text
//! key:   API_CACHE_/surveys_{"page":1}
//! value: { "body": <response JSON>, "stored_at": "2024-05-01T10:00:00Z" }
//! ```
//!
//! Every successful online GET overwrites its entry. With the default
//! [`CachePolicy`] entries never expire and are never evicted, so the cache
//! grows with the number of distinct (url, params) pairs ever fetched.
//! `ttl` turns stale entries into misses; `max_entries` evicts the entries
//! with the oldest `stored_at` after each write.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use survey_core::{RequestDescriptor, CACHE_KEY_PREFIX};
use survey_db::KeyValueStore;

use crate::error::SyncResult;

/// Bounds on cache growth.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CachePolicy {
    /// Entries older than this are misses.
    pub ttl: Option<Duration>,
    /// Maximum number of entries kept.
    pub max_entries: Option<usize>,
}

impl CachePolicy {
    pub fn is_unbounded(&self) -> bool {
        self.ttl.is_none() && self.max_entries.is_none()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct CacheEntry {
    body: Value,
    stored_at: DateTime<Utc>,
}

/// GET response cache over a [`KeyValueStore`].
#[derive(Clone)]
pub struct ResponseCache {
    storage: Arc<dyn KeyValueStore>,
    policy: CachePolicy,
}

impl ResponseCache {
    pub fn new(storage: Arc<dyn KeyValueStore>, policy: CachePolicy) -> Self {
        ResponseCache { storage, policy }
    }

    pub fn policy(&self) -> CachePolicy {
        self.policy
    }

    /// Stores `body` as the latest response for `request`.
    pub async fn store(&self, request: &RequestDescriptor, body: &Value) -> SyncResult<()> {
        self.store_at(request, body, Utc::now()).await
    }

    async fn store_at(
        &self,
        request: &RequestDescriptor,
        body: &Value,
        stored_at: DateTime<Utc>,
    ) -> SyncResult<()> {
        let key = request.cache_key();
        let entry = CacheEntry {
            body: body.clone(),
            stored_at,
        };
        let serialized = serde_json::to_string(&entry)?;
        self.storage.set(&key, &serialized).await?;

        debug!(key = %key, "Cached response");

        if let Some(max) = self.policy.max_entries {
            self.evict_over(max).await?;
        }

        Ok(())
    }

    /// Returns the cached body for `request`, if present and fresh.
    ///
    /// Unreadable entries are removed and reported as misses.
    pub async fn lookup(&self, request: &RequestDescriptor) -> SyncResult<Option<Value>> {
        let key = request.cache_key();
        let Some(raw) = self.storage.get(&key).await? else {
            return Ok(None);
        };

        let entry: CacheEntry = match serde_json::from_str(&raw) {
            Ok(entry) => entry,
            Err(e) => {
                warn!(key = %key, error = %e, "Discarding unreadable cache entry");
                self.storage.remove(&key).await?;
                return Ok(None);
            }
        };

        if self.is_expired(&entry, Utc::now()) {
            debug!(key = %key, stored_at = %entry.stored_at, "Cache entry expired");
            self.storage.remove(&key).await?;
            return Ok(None);
        }

        Ok(Some(entry.body))
    }

    /// Removes every cached response. Returns the number removed.
    pub async fn clear(&self) -> SyncResult<usize> {
        let keys = self.storage.keys_with_prefix(CACHE_KEY_PREFIX).await?;
        for key in &keys {
            self.storage.remove(key).await?;
        }
        Ok(keys.len())
    }

    /// Number of cached responses.
    pub async fn len(&self) -> SyncResult<usize> {
        Ok(self.storage.keys_with_prefix(CACHE_KEY_PREFIX).await?.len())
    }

    pub async fn is_empty(&self) -> SyncResult<bool> {
        Ok(self.len().await? == 0)
    }

    fn is_expired(&self, entry: &CacheEntry, now: DateTime<Utc>) -> bool {
        match self.policy.ttl {
            Some(ttl) => match chrono::Duration::from_std(ttl) {
                Ok(ttl) => now - entry.stored_at > ttl,
                Err(_) => false,
            },
            None => false,
        }
    }

    /// Evicts the oldest entries until at most `max` remain.
    async fn evict_over(&self, max: usize) -> SyncResult<()> {
        let keys = self.storage.keys_with_prefix(CACHE_KEY_PREFIX).await?;
        if keys.len() <= max {
            return Ok(());
        }

        let mut aged = Vec::with_capacity(keys.len());
        for key in keys {
            let stored_at = match self.storage.get(&key).await? {
                Some(raw) => serde_json::from_str::<CacheEntry>(&raw)
                    .map(|e| e.stored_at)
                    .unwrap_or(DateTime::<Utc>::MIN_UTC),
                None => continue,
            };
            aged.push((stored_at, key));
        }

        aged.sort();
        let excess = aged.len().saturating_sub(max);
        for (_, key) in aged.into_iter().take(excess) {
            debug!(key = %key, "Evicting cached response");
            self.storage.remove(&key).await?;
        }

        Ok(())
    }
}
