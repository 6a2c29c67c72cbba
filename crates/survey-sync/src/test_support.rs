//! Shared fixtures for unit tests.

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use survey_db::{DbError, DbResult, KeyValueStore, MemoryStore};

/// Memory store whose writes can be switched to fail.
#[derive(Default)]
pub(crate) struct FailingWrites {
    inner: MemoryStore,
    failing: AtomicBool,
}

impl FailingWrites {
    pub(crate) fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    fn check(&self) -> DbResult<()> {
        if self.failing.load(Ordering::SeqCst) {
            Err(DbError::QueryFailed("disk full".into()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl KeyValueStore for FailingWrites {
    async fn get(&self, key: &str) -> DbResult<Option<String>> {
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, value: &str) -> DbResult<()> {
        self.check()?;
        self.inner.set(key, value).await
    }

    async fn remove(&self, key: &str) -> DbResult<()> {
        self.check()?;
        self.inner.remove(key).await
    }

    async fn keys_with_prefix(&self, prefix: &str) -> DbResult<Vec<String>> {
        self.inner.keys_with_prefix(prefix).await
    }
}
