//! # Offline Context
//!
//! [`OfflineStore`] owns the offline state and is the only way to change it.
//! Every component (monitor, client, engine, agent) gets a clone.
//!
//! ## Data Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │   dispatch(action) ──► apply to a copy ──► changed?                     │
//! │                                              │                          │
//! │                                              ▼                          │
//! │                                      queue touched? ──► persist copy    │
//! │                                              │       (`offline_queue`)  │
//! │                                              ▼                          │
//! │                                      publish copy to watch subscribers  │
//! │                                      (UI, agent, tests)                 │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Dispatches are serialized by an async lock held across apply and persist.
//! A copy is published only after its queue was stored, so a failed write
//! leaves both memory and storage at the previous state.

use std::sync::Arc;
use tokio::sync::{watch, Mutex};
use tracing::{debug, info};

use survey_core::{
    OfflineAction, OfflineSnapshot, OfflineState, QueueItem, RequestDescriptor, SyncState,
    QUEUE_STORAGE_KEY,
};
use survey_db::KeyValueStore;

use crate::error::SyncResult;

/// Shared handle to the offline state.
#[derive(Clone)]
pub struct OfflineStore {
    state: Arc<watch::Sender<OfflineState>>,
    storage: Arc<dyn KeyValueStore>,
    write_lock: Arc<Mutex<()>>,
}

impl OfflineStore {
    /// Creates a store with an empty queue. Nothing is read from storage.
    pub fn new(storage: Arc<dyn KeyValueStore>) -> Self {
        let (tx, _rx) = watch::channel(OfflineState::default());
        OfflineStore {
            state: Arc::new(tx),
            storage,
            write_lock: Arc::new(Mutex::new(())),
        }
    }

    /// Creates a store and hydrates the queue from `offline_queue`.
    pub async fn load(storage: Arc<dyn KeyValueStore>) -> SyncResult<Self> {
        let store = Self::new(storage);
        store.hydrate().await?;
        Ok(store)
    }

    /// Replaces the in-memory queue with the persisted one.
    ///
    /// Items left `processing` by an interrupted pass come back `pending`.
    pub async fn hydrate(&self) -> SyncResult<usize> {
        let items: Vec<QueueItem> = match self.storage.get(QUEUE_STORAGE_KEY).await? {
            Some(raw) => serde_json::from_str(&raw)?,
            None => Vec::new(),
        };
        let count = items.len();

        self.dispatch(OfflineAction::Hydrate(items)).await?;

        info!(count, "Offline queue loaded");
        Ok(count)
    }

    /// Applies an action, persists the queue if the action touched it and
    /// then notifies subscribers.
    ///
    /// The action is applied to a copy of the state. If persisting fails the
    /// copy is discarded, so memory never holds a queue that storage lacks.
    ///
    /// ## Returns
    /// Whether the state changed.
    pub async fn dispatch(&self, action: OfflineAction) -> SyncResult<bool> {
        let _guard = self.write_lock.lock().await;

        let persist = action.mutates_queue();
        let mut next = self.state.borrow().clone();
        if !next.apply(action) {
            return Ok(false);
        }

        if persist {
            self.persist_queue(&next.queue).await?;
        }

        self.state.send_replace(next);
        Ok(true)
    }

    async fn persist_queue(&self, queue: &[QueueItem]) -> SyncResult<()> {
        let serialized = serde_json::to_string(queue)?;
        self.storage.set(QUEUE_STORAGE_KEY, &serialized).await?;
        Ok(())
    }

    /// Moves to `syncing` unless a pass is already running.
    ///
    /// ## Returns
    /// `true` if the caller now owns the pass.
    pub async fn try_begin_sync(&self) -> bool {
        let _guard = self.write_lock.lock().await;

        self.state.send_if_modified(|state| {
            if state.sync_status == SyncState::Syncing {
                return false;
            }
            state.apply(OfflineAction::SetSyncStatus(SyncState::Syncing))
        })
    }

    /// Queues a write and returns the stored item.
    pub async fn enqueue(&self, request: RequestDescriptor) -> SyncResult<QueueItem> {
        let item = QueueItem::from_request(request);
        debug!(id = %item.id, method = %item.method, url = %item.url, "Queueing request");
        self.dispatch(OfflineAction::Enqueue(item.clone())).await?;
        Ok(item)
    }

    /// Drops every queued write. Returns how many were dropped.
    pub async fn clear_queue(&self) -> SyncResult<usize> {
        let count = self.state.borrow().queue.len();
        self.dispatch(OfflineAction::Clear).await?;
        info!(count, "Offline queue cleared");
        Ok(count)
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// Clone of the full state.
    pub fn state(&self) -> OfflineState {
        self.state.borrow().clone()
    }

    /// Receiver that observes every state change.
    pub fn subscribe(&self) -> watch::Receiver<OfflineState> {
        self.state.subscribe()
    }

    pub fn snapshot(&self) -> OfflineSnapshot {
        self.state.borrow().snapshot()
    }

    pub fn is_offline(&self) -> bool {
        self.state.borrow().is_offline
    }

    pub fn sync_status(&self) -> SyncState {
        self.state.borrow().sync_status
    }

    /// Queue in insertion order.
    pub fn queue(&self) -> Vec<QueueItem> {
        self.state.borrow().queue.clone()
    }

    pub fn queue_len(&self) -> usize {
        self.state.borrow().queue.len()
    }

    pub fn item(&self, id: &str) -> Option<QueueItem> {
        self.state.borrow().item(id).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use survey_core::{HttpMethod, QueueStatus};
    use survey_db::MemoryStore;

    use crate::test_support::FailingWrites;

    fn post(url: &str) -> RequestDescriptor {
        RequestDescriptor::new(HttpMethod::Post, url).with_data(json!({"a": 1}))
    }

    #[tokio::test]
    async fn test_enqueue_persists_queue() {
        let storage = Arc::new(MemoryStore::new());
        let store = OfflineStore::new(storage.clone());

        let item = store.enqueue(post("/responses")).await.unwrap();

        let raw = storage.get(QUEUE_STORAGE_KEY).await.unwrap().unwrap();
        let persisted: Vec<QueueItem> = serde_json::from_str(&raw).unwrap();
        assert_eq!(persisted, vec![item]);
    }

    #[tokio::test]
    async fn test_queue_survives_reload_in_order() {
        let storage = Arc::new(MemoryStore::new());
        let store = OfflineStore::new(storage.clone());
        let w1 = store.enqueue(post("/w1")).await.unwrap();
        let w2 = store.enqueue(post("/w2")).await.unwrap();
        let w3 = store.enqueue(post("/w3")).await.unwrap();

        let reloaded = OfflineStore::load(storage).await.unwrap();
        let ids: Vec<String> = reloaded.queue().into_iter().map(|i| i.id).collect();
        assert_eq!(ids, vec![w1.id, w2.id, w3.id]);
    }

    #[tokio::test]
    async fn test_processing_items_reload_as_pending() {
        let storage = Arc::new(MemoryStore::new());
        let store = OfflineStore::new(storage.clone());
        let item = store.enqueue(post("/responses")).await.unwrap();
        store
            .dispatch(OfflineAction::UpdateItemStatus {
                id: item.id.clone(),
                status: QueueStatus::Processing,
                error: None,
            })
            .await
            .unwrap();

        let reloaded = OfflineStore::load(storage).await.unwrap();
        assert_eq!(
            reloaded.item(&item.id).unwrap().status,
            QueueStatus::Pending
        );
    }

    #[tokio::test]
    async fn test_corrupt_queue_fails_load() {
        let storage = Arc::new(MemoryStore::new());
        storage.set(QUEUE_STORAGE_KEY, "{broken").await.unwrap();
        assert!(OfflineStore::load(storage).await.is_err());
    }

    #[tokio::test]
    async fn test_try_begin_sync_is_exclusive() {
        let store = OfflineStore::new(Arc::new(MemoryStore::new()));

        assert!(store.try_begin_sync().await);
        assert!(!store.try_begin_sync().await);
        assert_eq!(store.sync_status(), SyncState::Syncing);

        store
            .dispatch(OfflineAction::SetSyncStatus(SyncState::Error))
            .await
            .unwrap();
        assert!(store.try_begin_sync().await);
    }

    #[tokio::test]
    async fn test_subscribers_see_changes_only() {
        let store = OfflineStore::new(Arc::new(MemoryStore::new()));
        let mut rx = store.subscribe();

        assert!(!store
            .dispatch(OfflineAction::SetOfflineStatus(false))
            .await
            .unwrap());
        assert!(!rx.has_changed().unwrap());

        assert!(store
            .dispatch(OfflineAction::SetOfflineStatus(true))
            .await
            .unwrap());
        assert!(rx.has_changed().unwrap());
        assert!(rx.borrow_and_update().is_offline);
    }

    #[tokio::test]
    async fn test_clear_queue() {
        let storage = Arc::new(MemoryStore::new());
        let store = OfflineStore::new(storage.clone());
        store.enqueue(post("/a")).await.unwrap();
        store.enqueue(post("/b")).await.unwrap();

        assert_eq!(store.clear_queue().await.unwrap(), 2);
        assert_eq!(store.queue_len(), 0);
        assert_eq!(
            storage.get(QUEUE_STORAGE_KEY).await.unwrap().as_deref(),
            Some("[]")
        );
    }

    #[tokio::test]
    async fn test_failed_persist_leaves_state_untouched() {
        let storage = Arc::new(FailingWrites::default());
        let store = OfflineStore::new(storage.clone());
        let kept = store.enqueue(post("/kept")).await.unwrap();
        let mut rx = store.subscribe();
        rx.borrow_and_update();

        storage.set_failing(true);
        assert!(store.enqueue(post("/lost")).await.is_err());
        assert!(store.clear_queue().await.is_err());

        assert_eq!(store.queue(), vec![kept.clone()]);
        assert!(!rx.has_changed().unwrap());
        let raw = storage.get(QUEUE_STORAGE_KEY).await.unwrap().unwrap();
        let persisted: Vec<QueueItem> = serde_json::from_str(&raw).unwrap();
        assert_eq!(persisted, vec![kept]);

        storage.set_failing(false);
        store.enqueue(post("/retried")).await.unwrap();
        assert_eq!(store.queue_len(), 2);
    }
}
