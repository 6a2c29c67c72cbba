//! # Sync Agent
//!
//! Main orchestrator of the offline layer. Wires the context, monitor,
//! client and engine together and runs the single task that turns
//! connectivity events into sync passes.
//!
//! ## Agent Architecture
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        SyncAgent Architecture                           │
//! │                                                                         │
//! │   NetworkProbe events ──┐                                               │
//! │   SyncAgentHandle cmds ─┼──► agent task (one at a time)                │
//! │   retry timer ──────────┘        │                                      │
//! │                                  ├─ CameOnline + queue non-empty        │
//! │                                  │     ──► SyncEngine::run_pass         │
//! │                                  ├─ SyncNow ──► run_pass, reply         │
//! │                                  ├─ pass ended in `error` and           │
//! │                                  │  auto_retry ──► arm retry timer      │
//! │                                  └─ Shutdown ──► exit                   │
//! │                                                                         │
//! │   OfflineClient (shared) ──► used by the app for every API call        │
//! │                                                                         │
//! │  STATUS EVENTS (to the embedding app):                                 │
//! │  ──────────────────────────────────────                                │
//! │  emit_status(snapshot)  after every connectivity change and pass       │
//! │  emit_pass(report)      after every completed pass                     │
//! │  emit_error(msg, retry) when a pass fails on storage                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Passes run on the agent task itself, so connectivity events arriving
//! mid-pass are handled after it and can never start a second pass.

use backoff::backoff::Backoff;
use backoff::ExponentialBackoff;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, error, info, warn};

use survey_core::{NetworkState, OfflineSnapshot, SyncState};
use survey_db::KeyValueStore;

use crate::cache::ResponseCache;
use crate::client::OfflineClient;
use crate::config::SyncConfig;
use crate::connectivity::{ConnectivityMonitor, NetworkProbe, Transition};
use crate::context::OfflineStore;
use crate::credentials::CredentialStore;
use crate::engine::{PassOutcome, SyncEngine, SyncReport};
use crate::error::{SyncError, SyncResult};
use crate::http::HttpClient;

/// Capacity of the command channel.
const COMMAND_CAPACITY: usize = 16;

// =============================================================================
// Event Emitter Trait
// =============================================================================

/// Receives status events (implemented by the embedding app).
pub trait SyncEventEmitter: Send + Sync {
    /// Emits the current offline state.
    fn emit_status(&self, status: &OfflineSnapshot);

    /// Emits the counts of a completed pass.
    fn emit_pass(&self, report: &SyncReport);

    /// Emits a sync error event.
    fn emit_error(&self, message: &str, retryable: bool);
}

/// No-op event emitter for testing.
pub struct NoOpEmitter;

impl SyncEventEmitter for NoOpEmitter {
    fn emit_status(&self, _status: &OfflineSnapshot) {}
    fn emit_pass(&self, _report: &SyncReport) {}
    fn emit_error(&self, _message: &str, _retryable: bool) {}
}

// =============================================================================
// Commands
// =============================================================================

enum AgentCommand {
    SyncNow(oneshot::Sender<SyncResult<PassOutcome>>),
    Shutdown,
}

// =============================================================================
// Sync Agent
// =============================================================================

/// Owns every component of the offline layer.
pub struct SyncAgent {
    config: Arc<SyncConfig>,
    store: OfflineStore,
    monitor: ConnectivityMonitor,
    client: OfflineClient,
    engine: SyncEngine,
    emitter: Arc<dyn SyncEventEmitter>,
}

impl SyncAgent {
    /// Builds the agent and hydrates the queue from `storage`.
    pub async fn new(
        config: SyncConfig,
        storage: Arc<dyn KeyValueStore>,
        http: Arc<dyn HttpClient>,
        probe: Arc<dyn NetworkProbe>,
    ) -> SyncResult<Self> {
        config.validate()?;

        let store = OfflineStore::load(storage.clone()).await?;
        let monitor = ConnectivityMonitor::new(probe, store.clone());
        let client = OfflineClient::new(
            http,
            store.clone(),
            monitor.clone(),
            ResponseCache::new(storage.clone(), config.cache.policy()),
            CredentialStore::new(storage),
        )
        .with_network_fallback(config.cache.fallback_on_network_error);
        let engine = SyncEngine::new(client.clone(), store.clone(), monitor.clone())
            .with_classifier(config.failure_policy().classifier())
            .with_retry_policy(config.retry.clone());

        info!(
            api = %config.api.base_url,
            failure_policy = %config.failure_policy(),
            max_attempts = config.retry.max_attempts,
            auto_retry = config.retry.auto_retry,
            queued = store.queue_len(),
            "Sync agent created"
        );

        Ok(SyncAgent {
            config: Arc::new(config),
            store,
            monitor,
            client,
            engine,
            emitter: Arc::new(NoOpEmitter),
        })
    }

    /// Sets the event emitter.
    pub fn with_emitter(mut self, emitter: Arc<dyn SyncEventEmitter>) -> Self {
        self.emitter = emitter;
        self
    }

    pub fn store(&self) -> &OfflineStore {
        &self.store
    }

    pub fn client(&self) -> &OfflineClient {
        &self.client
    }

    pub fn engine(&self) -> &SyncEngine {
        &self.engine
    }

    /// Spawns the agent task.
    ///
    /// Subscribes to the probe and publishes the current connectivity
    /// before returning, so a write queued right after this call is
    /// followed by a visible offline→online edge.
    pub async fn spawn(self) -> (SyncAgentHandle, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(COMMAND_CAPACITY);
        let events = self.monitor.subscribe();

        match self.monitor.refresh().await {
            Ok(_) => self.emitter.emit_status(&self.store.snapshot()),
            Err(e) => warn!(error = %e, "Initial connectivity check failed"),
        }

        let handle = SyncAgentHandle {
            commands: tx,
            store: self.store.clone(),
            client: self.client.clone(),
        };

        let task = tokio::spawn(self.run(events, rx));
        (handle, task)
    }

    async fn run(
        self,
        mut events: broadcast::Receiver<NetworkState>,
        mut commands: mpsc::Receiver<AgentCommand>,
    ) {
        info!("Sync agent started");

        let mut backoff = self.config.retry.backoff();
        let mut retry_at: Option<Instant> = None;

        if self.config.sync.sync_on_start && !self.store.is_offline() && self.store.queue_len() > 0
        {
            info!(queued = self.store.queue_len(), "Replaying queue left from a previous run");
            let outcome = self.pass().await;
            retry_at = self.schedule_retry(&outcome, &mut backoff);
        }

        loop {
            tokio::select! {
                event = events.recv() => {
                    let observed = match event {
                        Ok(state) => self.monitor.observe(state).await,
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            warn!(skipped, "Missed connectivity events, re-checking");
                            self.monitor.refresh().await
                        }
                        Err(broadcast::error::RecvError::Closed) => {
                            info!("Network probe closed");
                            break;
                        }
                    };

                    match observed {
                        Ok(Some(Transition::CameOnline)) => {
                            self.emitter.emit_status(&self.store.snapshot());
                            if self.store.queue_len() > 0 {
                                info!(queued = self.store.queue_len(), "Back online, syncing");
                                let outcome = self.pass().await;
                                retry_at = self.schedule_retry(&outcome, &mut backoff);
                            }
                        }
                        Ok(Some(Transition::WentOffline)) => {
                            self.emitter.emit_status(&self.store.snapshot());
                            // the reconnect will trigger the next pass
                            retry_at = None;
                        }
                        Ok(None) => {}
                        Err(e) => warn!(error = %e, "Failed to publish connectivity"),
                    }
                }

                command = commands.recv() => {
                    match command {
                        Some(AgentCommand::SyncNow(reply)) => {
                            let outcome = self.pass().await;
                            retry_at = self.schedule_retry(&outcome, &mut backoff);
                            let _ = reply.send(outcome);
                        }
                        Some(AgentCommand::Shutdown) | None => {
                            info!("Sync agent received shutdown");
                            break;
                        }
                    }
                }

                _ = sleep_until(retry_at.unwrap_or_else(Instant::now)), if retry_at.is_some() => {
                    retry_at = None;
                    debug!("Retry timer fired");
                    let outcome = self.pass().await;
                    retry_at = self.schedule_retry(&outcome, &mut backoff);
                }
            }
        }

        info!("Sync agent stopped");
    }

    /// Runs one pass and emits its events.
    async fn pass(&self) -> SyncResult<PassOutcome> {
        let outcome = self.engine.run_pass().await;

        match &outcome {
            Ok(PassOutcome::Completed(report)) => self.emitter.emit_pass(report),
            Ok(_) => {}
            Err(e) => {
                error!(error = %e, "Sync pass failed");
                self.emitter.emit_error(&e.to_string(), e.is_retryable());
            }
        }
        self.emitter.emit_status(&self.store.snapshot());

        outcome
    }

    /// Decides when the next automatic pass runs, if at all.
    fn schedule_retry(
        &self,
        outcome: &SyncResult<PassOutcome>,
        backoff: &mut ExponentialBackoff,
    ) -> Option<Instant> {
        if !self.config.retry.auto_retry {
            return None;
        }

        let needs_retry = match outcome {
            Ok(PassOutcome::Completed(report)) => {
                report.final_state == SyncState::Error && self.store.queue_len() > 0
            }
            Ok(_) => false,
            Err(_) => true,
        };

        if !needs_retry {
            backoff.reset();
            return None;
        }

        let delay = backoff.next_backoff()?;
        info!(delay_ms = delay.as_millis() as u64, "Scheduling sync retry");
        Some(Instant::now() + delay)
    }
}

// =============================================================================
// Agent Handle (for external control)
// =============================================================================

/// Handle for controlling a running [`SyncAgent`].
#[derive(Clone)]
pub struct SyncAgentHandle {
    commands: mpsc::Sender<AgentCommand>,
    store: OfflineStore,
    client: OfflineClient,
}

impl SyncAgentHandle {
    /// Current offline state summary.
    pub fn status(&self) -> OfflineSnapshot {
        self.store.snapshot()
    }

    pub fn store(&self) -> &OfflineStore {
        &self.store
    }

    /// The client the app issues API calls through.
    pub fn client(&self) -> &OfflineClient {
        &self.client
    }

    /// Runs a pass on the agent task and waits for it.
    pub async fn sync_now(&self) -> SyncResult<PassOutcome> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(AgentCommand::SyncNow(tx))
            .await
            .map_err(|_| SyncError::ShuttingDown)?;
        rx.await
            .map_err(|e| SyncError::ChannelError(e.to_string()))?
    }

    /// Drops every queued write.
    pub async fn clear_queue(&self) -> SyncResult<usize> {
        self.store.clear_queue().await
    }

    /// Signals the agent to shut down gracefully.
    pub async fn shutdown(&self) {
        let _ = self.commands.send(AgentCommand::Shutdown).await;
    }
}
