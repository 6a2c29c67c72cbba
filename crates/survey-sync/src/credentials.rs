//! Bearer credential persisted under `authToken`.

use std::sync::Arc;
use tracing::info;

use survey_core::AUTH_TOKEN_KEY;
use survey_db::KeyValueStore;

use crate::error::SyncResult;

/// Reads and clears the stored bearer token.
///
/// Login flows write the token; the offline layer only attaches it to
/// requests and forgets it when the server answers 401.
#[derive(Clone)]
pub struct CredentialStore {
    storage: Arc<dyn KeyValueStore>,
}

impl CredentialStore {
    pub fn new(storage: Arc<dyn KeyValueStore>) -> Self {
        CredentialStore { storage }
    }

    /// Current token. An empty stored value counts as no token.
    pub async fn token(&self) -> SyncResult<Option<String>> {
        Ok(self
            .storage
            .get(AUTH_TOKEN_KEY)
            .await?
            .filter(|token| !token.is_empty()))
    }

    pub async fn set_token(&self, token: &str) -> SyncResult<()> {
        self.storage.set(AUTH_TOKEN_KEY, token).await?;
        Ok(())
    }

    pub async fn clear(&self) -> SyncResult<()> {
        info!("Clearing stored credential");
        self.storage.remove(AUTH_TOKEN_KEY).await?;
        Ok(())
    }
}
