//! # Key-Value Repository
//!
//! SQLite implementation of [`KeyValueStore`] over the `kv_store` table.
//!
//! ## Table
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  key (PK)                    │ value            │ updated_at            │
//! │  ────────────────────────────┼──────────────────┼─────────────────────  │
//! │  offline_queue               │ [{...},{...}]    │ 2024-05-01T10:00:00Z  │
//! │  API_CACHE_/surveys_{}       │ {"body":...}     │ 2024-05-01T09:58:12Z  │
//! │  authToken                   │ eyJhbGciOi...    │ 2024-04-30T18:02:44Z  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every `set` is a single-statement upsert, so a crash never leaves a
//! half-written value under a key.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::SqlitePool;
use tracing::debug;

use crate::error::DbResult;
use crate::store::KeyValueStore;

/// Repository for key-value operations.
#[derive(Debug, Clone)]
pub struct KvRepository {
    pool: SqlitePool,
}

impl KvRepository {
    /// Creates a new KvRepository.
    pub fn new(pool: SqlitePool) -> Self {
        KvRepository { pool }
    }

    /// Counts stored keys.
    pub async fn count(&self) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM kv_store")
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
    }

    /// Deletes every key starting with `prefix`.
    ///
    /// ## Returns
    /// Number of deleted keys.
    pub async fn remove_prefix(&self, prefix: &str) -> DbResult<u64> {
        let result = sqlx::query("DELETE FROM kv_store WHERE substr(key, 1, length(?1)) = ?1")
            .bind(prefix)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }
}

#[async_trait]
impl KeyValueStore for KvRepository {
    async fn get(&self, key: &str) -> DbResult<Option<String>> {
        let value: Option<String> = sqlx::query_scalar("SELECT value FROM kv_store WHERE key = ?1")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;

        Ok(value)
    }

    async fn set(&self, key: &str, value: &str) -> DbResult<()> {
        debug!(key = %key, bytes = value.len(), "Writing key");

        sqlx::query(
            r#"
            INSERT INTO kv_store (key, value, updated_at)
            VALUES (?1, ?2, ?3)
            ON CONFLICT(key) DO UPDATE SET
                value = excluded.value,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(key)
        .bind(value)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn remove(&self, key: &str) -> DbResult<()> {
        sqlx::query("DELETE FROM kv_store WHERE key = ?1")
            .bind(key)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn keys_with_prefix(&self, prefix: &str) -> DbResult<Vec<String>> {
        let keys: Vec<String> = sqlx::query_scalar(
            "SELECT key FROM kv_store WHERE substr(key, 1, length(?1)) = ?1 ORDER BY key ASC",
        )
        .bind(prefix)
        .fetch_all(&self.pool)
        .await?;

        Ok(keys)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};

    async fn repo() -> KvRepository {
        Database::new(DbConfig::in_memory()).await.unwrap().kv()
    }

    #[tokio::test]
    async fn test_set_get_overwrite() {
        let kv = repo().await;
        assert!(kv.get("offline_queue").await.unwrap().is_none());

        kv.set("offline_queue", "[]").await.unwrap();
        kv.set("offline_queue", r#"[{"id":"1"}]"#).await.unwrap();

        assert_eq!(
            kv.get("offline_queue").await.unwrap().as_deref(),
            Some(r#"[{"id":"1"}]"#)
        );
        assert_eq!(kv.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_remove_missing_key_is_ok() {
        let kv = repo().await;
        kv.remove("authToken").await.unwrap();

        kv.set("authToken", "abc").await.unwrap();
        kv.remove("authToken").await.unwrap();
        assert!(kv.get("authToken").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_prefix_scan_is_literal() {
        let kv = repo().await;
        kv.set("API_CACHE_/surveys_{}", "a").await.unwrap();
        kv.set("API_CACHE_/analytics/dashboard_{}", "b").await.unwrap();
        // `_` must not act as a LIKE wildcard
        kv.set("APIXCACHE_/other_{}", "c").await.unwrap();

        let keys = kv.keys_with_prefix("API_CACHE_").await.unwrap();
        assert_eq!(
            keys,
            vec!["API_CACHE_/analytics/dashboard_{}", "API_CACHE_/surveys_{}"]
        );

        assert_eq!(kv.remove_prefix("API_CACHE_").await.unwrap(), 2);
        assert_eq!(kv.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_values_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("offline.db");

        let db = Database::new(DbConfig::new(&path)).await.unwrap();
        db.kv().set("authToken", "persisted").await.unwrap();
        db.close().await;

        let reopened = Database::new(DbConfig::new(&path)).await.unwrap();
        assert_eq!(
            reopened.kv().get("authToken").await.unwrap().as_deref(),
            Some("persisted")
        );
    }
}
