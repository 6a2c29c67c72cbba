//! # Sync Engine
//!
//! Replays the offline queue against the server, one item at a time, in
//! the order the writes were made.
//!
//! ## Pass Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          SyncEngine::run_pass                           │
//! │                                                                         │
//! │  1. Offline right now? ─────────────────────────► SkippedOffline       │
//! │  2. Already syncing?   ─────────────────────────► AlreadySyncing       │
//! │  3. status = syncing, snapshot the queue                               │
//! │                                                                         │
//! │  4. for item in snapshot (strictly sequential):                        │
//! │     ┌─────────────────────────────────────────────────────────────┐    │
//! │     │  mark processing ──► OfflineClient::replay                  │    │
//! │     │     ├─ Ok  ──► remove item                    succeeded += 1│    │
//! │     │     └─ Err ──► mark failed (error, attempts+1) failed += 1  │    │
//! │     │               └─ classifier says Drop, or attempts          │    │
//! │     │                  exhausted ──► remove item    dropped += 1  │    │
//! │     └─────────────────────────────────────────────────────────────┘    │
//! │                                                                         │
//! │  5. status = synced  if succeeded > 0 or the snapshot was empty        │
//! │            = error   if succeeded == 0 and failed > 0                  │
//! │            = idle    otherwise (every item vanished mid-pass)          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! A failing item never stops the pass. Items enqueued while a pass runs
//! wait for the next one.

use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

use survey_core::{OfflineAction, QueueItem, QueueStatus, SyncState};

use crate::classifier::{FailureClassifier, FailureDisposition, RetainAll};
use crate::client::OfflineClient;
use crate::config::RetryPolicy;
use crate::connectivity::ConnectivityMonitor;
use crate::context::OfflineStore;
use crate::error::SyncResult;

// =============================================================================
// Pass Results
// =============================================================================

/// Counts of one completed pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    /// Items replayed.
    pub attempted: usize,
    pub succeeded: usize,
    /// Items whose replay failed, dropped ones included.
    pub failed: usize,
    /// Failed items removed from the queue.
    pub dropped: usize,
    pub final_state: SyncState,
}

/// Result of asking for a pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassOutcome {
    Completed(SyncReport),
    /// The probe reported offline; nothing changed.
    SkippedOffline,
    /// Another pass owns the queue.
    AlreadySyncing,
}

impl PassOutcome {
    pub fn report(&self) -> Option<&SyncReport> {
        match self {
            PassOutcome::Completed(report) => Some(report),
            _ => None,
        }
    }
}

// =============================================================================
// Engine
// =============================================================================

/// Sequential replay of the offline queue.
#[derive(Clone)]
pub struct SyncEngine {
    client: OfflineClient,
    store: OfflineStore,
    monitor: ConnectivityMonitor,
    classifier: Arc<dyn FailureClassifier>,
    retry: RetryPolicy,
}

impl SyncEngine {
    /// Creates an engine that retains every failure, forever.
    pub fn new(client: OfflineClient, store: OfflineStore, monitor: ConnectivityMonitor) -> Self {
        SyncEngine {
            client,
            store,
            monitor,
            classifier: Arc::new(RetainAll),
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_classifier(mut self, classifier: Arc<dyn FailureClassifier>) -> Self {
        self.classifier = classifier;
        self
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Runs one pass over the queue.
    ///
    /// ## Errors
    /// Only storage failures surface here; replay failures are recorded on
    /// the items. On error the state is moved to `error` before returning.
    pub async fn run_pass(&self) -> SyncResult<PassOutcome> {
        if self.monitor.is_offline_now().await {
            debug!("Offline, sync pass skipped");
            return Ok(PassOutcome::SkippedOffline);
        }

        if !self.store.try_begin_sync().await {
            debug!("Sync pass already running");
            return Ok(PassOutcome::AlreadySyncing);
        }

        let snapshot = self.store.queue();
        info!(count = snapshot.len(), "Starting sync pass");

        let mut report = SyncReport {
            attempted: 0,
            succeeded: 0,
            failed: 0,
            dropped: 0,
            final_state: SyncState::Syncing,
        };

        if let Err(e) = self.replay_all(&snapshot, &mut report).await {
            warn!(error = %e, "Sync pass aborted");
            // never leave the pass `syncing`
            if let Err(status_err) = self
                .store
                .dispatch(OfflineAction::SetSyncStatus(SyncState::Error))
                .await
            {
                warn!(error = %status_err, "Failed to record sync error state");
            }
            return Err(e);
        }

        report.final_state = if snapshot.is_empty() || report.succeeded > 0 {
            SyncState::Synced
        } else if report.failed > 0 {
            SyncState::Error
        } else {
            SyncState::Idle
        };

        self.store
            .dispatch(OfflineAction::SetSyncStatus(report.final_state))
            .await?;

        info!(
            attempted = report.attempted,
            succeeded = report.succeeded,
            failed = report.failed,
            dropped = report.dropped,
            state = %report.final_state,
            "Sync pass finished"
        );

        Ok(PassOutcome::Completed(report))
    }

    async fn replay_all(&self, snapshot: &[QueueItem], report: &mut SyncReport) -> SyncResult<()> {
        for item in snapshot {
            // cleared or removed since the snapshot
            if self.store.item(&item.id).is_none() {
                debug!(id = %item.id, "Queue item gone, skipping");
                continue;
            }

            self.set_status(&item.id, QueueStatus::Processing, None)
                .await?;
            report.attempted += 1;

            match self.client.replay(item).await {
                Ok(response) => {
                    debug!(id = %item.id, status = response.status, "Replayed queue item");
                    self.store
                        .dispatch(OfflineAction::Remove(item.id.clone()))
                        .await?;
                    report.succeeded += 1;
                }
                Err(err) => {
                    warn!(
                        id = %item.id,
                        method = %item.method,
                        url = %item.url,
                        error = %err,
                        "Replay failed"
                    );
                    report.failed += 1;

                    self.set_status(&item.id, QueueStatus::Failed, Some(err.to_string()))
                        .await?;

                    let attempts = self
                        .store
                        .item(&item.id)
                        .map(|i| i.attempts)
                        .unwrap_or(item.attempts + 1);

                    let drop = match self.classifier.classify(item, &err) {
                        FailureDisposition::Drop => true,
                        FailureDisposition::Retain => self.retry.is_exhausted(attempts),
                    };

                    if drop {
                        warn!(id = %item.id, attempts, "Dropping queue item");
                        self.store
                            .dispatch(OfflineAction::Remove(item.id.clone()))
                            .await?;
                        report.dropped += 1;
                    }
                }
            }
        }

        Ok(())
    }

    async fn set_status(
        &self,
        id: &str,
        status: QueueStatus,
        error: Option<String>,
    ) -> SyncResult<()> {
        self.store
            .dispatch(OfflineAction::UpdateItemStatus {
                id: id.to_string(),
                status,
                error,
            })
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{CachePolicy, ResponseCache};
    use crate::classifier::DropClientErrors;
    use crate::connectivity::ManualNetwork;
    use crate::credentials::CredentialStore;
    use crate::error::SyncError;
    use crate::http::{ApiResponse, HttpClient, HttpRequest};
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Mutex;
    use survey_core::{HttpMethod, NetworkState, RequestDescriptor};
    use survey_db::MemoryStore;

    /// Fails requests whose url contains "fail" with the given status.
    struct ScriptedHttp {
        fail_status: u16,
        seen: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl HttpClient for ScriptedHttp {
        async fn send(&self, request: &HttpRequest) -> SyncResult<ApiResponse> {
            let url = request.descriptor.url.clone();
            self.seen.lock().unwrap().push(url.clone());
            if url.contains("fail") {
                Err(SyncError::HttpStatus {
                    status: self.fail_status,
                    body: json!({"error": "rejected"}),
                })
            } else {
                Ok(ApiResponse {
                    status: 201,
                    body: json!({"ok": true}),
                    provisional: false,
                })
            }
        }
    }

    struct Fixture {
        network: Arc<ManualNetwork>,
        http: Arc<ScriptedHttp>,
        store: OfflineStore,
        engine: SyncEngine,
    }

    fn fixture(fail_status: u16) -> Fixture {
        let storage = Arc::new(MemoryStore::new());
        let network = Arc::new(ManualNetwork::online());
        let http = Arc::new(ScriptedHttp {
            fail_status,
            seen: Mutex::new(Vec::new()),
        });
        let store = OfflineStore::new(storage.clone());
        let monitor = ConnectivityMonitor::new(network.clone(), store.clone());
        let client = OfflineClient::new(
            http.clone(),
            store.clone(),
            monitor.clone(),
            ResponseCache::new(storage.clone(), CachePolicy::default()),
            CredentialStore::new(storage),
        );
        let engine = SyncEngine::new(client, store.clone(), monitor);
        Fixture {
            network,
            http,
            store,
            engine,
        }
    }

    async fn enqueue(store: &OfflineStore, url: &str) -> QueueItem {
        store
            .enqueue(RequestDescriptor::new(HttpMethod::Post, url).with_data(json!({"a": 1})))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_replays_in_order_and_continues_past_failures() {
        let f = fixture(500);
        enqueue(&f.store, "/w1").await;
        let failing = enqueue(&f.store, "/w2-fail").await;
        enqueue(&f.store, "/w3").await;

        let outcome = f.engine.run_pass().await.unwrap();
        let report = *outcome.report().unwrap();

        assert_eq!(*f.http.seen.lock().unwrap(), vec!["/w1", "/w2-fail", "/w3"]);
        assert_eq!(report.attempted, 3);
        assert_eq!(report.succeeded, 2);
        assert_eq!(report.failed, 1);
        assert_eq!(report.final_state, SyncState::Synced);

        let queue = f.store.queue();
        assert_eq!(queue.len(), 1);
        assert_eq!(queue[0].id, failing.id);
        assert_eq!(queue[0].status, QueueStatus::Failed);
        assert_eq!(queue[0].attempts, 1);
        assert!(queue[0].error.as_deref().unwrap().contains("500"));
        assert_eq!(f.store.sync_status(), SyncState::Synced);
    }

    #[tokio::test]
    async fn test_all_failures_end_in_error() {
        let f = fixture(503);
        enqueue(&f.store, "/fail-1").await;
        enqueue(&f.store, "/fail-2").await;

        let report = *f.engine.run_pass().await.unwrap().report().unwrap();

        assert_eq!(report.final_state, SyncState::Error);
        assert_eq!(f.store.sync_status(), SyncState::Error);
        assert_eq!(f.store.queue_len(), 2);
    }

    #[tokio::test]
    async fn test_empty_queue_is_synced() {
        let f = fixture(500);
        let report = *f.engine.run_pass().await.unwrap().report().unwrap();

        assert_eq!(report.attempted, 0);
        assert_eq!(report.final_state, SyncState::Synced);
        assert!(f.store.state().last_sync_time.is_some());
    }

    #[tokio::test]
    async fn test_offline_pass_changes_nothing() {
        let f = fixture(500);
        enqueue(&f.store, "/w1").await;
        f.network.set_silently(NetworkState::offline());

        assert_eq!(
            f.engine.run_pass().await.unwrap(),
            PassOutcome::SkippedOffline
        );
        assert_eq!(f.store.sync_status(), SyncState::Idle);
        assert_eq!(f.store.queue()[0].status, QueueStatus::Pending);
        assert!(f.http.seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_refuses_concurrent_pass() {
        let f = fixture(500);
        enqueue(&f.store, "/w1").await;
        assert!(f.store.try_begin_sync().await);

        assert_eq!(
            f.engine.run_pass().await.unwrap(),
            PassOutcome::AlreadySyncing
        );
        assert_eq!(f.store.queue_len(), 1);
    }

    #[tokio::test]
    async fn test_drop_client_errors_classifier() {
        let f = fixture(422);
        let engine = f.engine.clone().with_classifier(Arc::new(DropClientErrors));
        enqueue(&f.store, "/fail").await;
        enqueue(&f.store, "/ok").await;

        let report = *engine.run_pass().await.unwrap().report().unwrap();

        assert_eq!(report.dropped, 1);
        assert_eq!(report.succeeded, 1);
        assert_eq!(f.store.queue_len(), 0);
    }

    #[tokio::test]
    async fn test_max_attempts_eviction() {
        let f = fixture(500);
        let engine = f.engine.clone().with_retry_policy(RetryPolicy {
            max_attempts: 2,
            ..Default::default()
        });
        enqueue(&f.store, "/fail").await;

        let first = *engine.run_pass().await.unwrap().report().unwrap();
        assert_eq!(first.dropped, 0);
        assert_eq!(f.store.queue()[0].attempts, 1);

        let second = *engine.run_pass().await.unwrap().report().unwrap();
        assert_eq!(second.dropped, 1);
        assert_eq!(f.store.queue_len(), 0);
    }

    #[tokio::test]
    async fn test_storage_failure_ends_pass_in_error() {
        let storage = Arc::new(crate::test_support::FailingWrites::default());
        let network = Arc::new(ManualNetwork::online());
        let http = Arc::new(ScriptedHttp {
            fail_status: 500,
            seen: Mutex::new(Vec::new()),
        });
        let store = OfflineStore::new(storage.clone());
        let monitor = ConnectivityMonitor::new(network, store.clone());
        let client = OfflineClient::new(
            http.clone(),
            store.clone(),
            monitor.clone(),
            ResponseCache::new(storage.clone(), CachePolicy::default()),
            CredentialStore::new(storage.clone()),
        );
        let engine = SyncEngine::new(client, store.clone(), monitor);
        let item = enqueue(&store, "/w1").await;

        storage.set_failing(true);
        assert!(engine.run_pass().await.is_err());
        assert_eq!(store.sync_status(), SyncState::Error);
        assert_eq!(store.item(&item.id).unwrap().status, QueueStatus::Pending);
        assert!(http.seen.lock().unwrap().is_empty());

        storage.set_failing(false);
        let report = *engine.run_pass().await.unwrap().report().unwrap();
        assert_eq!(report.final_state, SyncState::Synced);
        assert_eq!(store.queue_len(), 0);
    }
}
