//! # Connectivity Monitor
//!
//! Turns raw reachability observations into the single `is_offline` flag of
//! the offline state.
//!
//! ## Derivation
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  is_connected │ is_internet_reachable │ offline                         │
//! │  ─────────────┼───────────────────────┼────────                         │
//! │  false        │ any                   │ yes                             │
//! │  true         │ Some(false)           │ yes                             │
//! │  true         │ None (unknown)        │ no                              │
//! │  true         │ Some(true)            │ no                              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Observers may repeat themselves (the OS fires on every interface change).
//! The monitor publishes only when the derived flag flips, and reports that
//! flip as a [`Transition`] so the agent can start a pass on `CameOnline`.

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::{broadcast, watch};
use tracing::debug;

use survey_core::{NetworkState, OfflineAction};

use crate::context::OfflineStore;
use crate::error::SyncResult;

/// Capacity of the observation broadcast channel.
const EVENT_CAPACITY: usize = 64;

// =============================================================================
// Network Probe
// =============================================================================

/// Source of reachability observations.
#[async_trait]
pub trait NetworkProbe: Send + Sync {
    /// Asks for the current state. Never answered from a cache.
    async fn fetch(&self) -> NetworkState;

    /// Stream of observations, one per platform event.
    fn subscribe(&self) -> broadcast::Receiver<NetworkState>;
}

/// Probe driven by explicit [`ManualNetwork::set`] calls.
///
/// Used by tests, and by embedders that receive reachability events from
/// the platform and forward them here.
pub struct ManualNetwork {
    current: watch::Sender<NetworkState>,
    events: broadcast::Sender<NetworkState>,
}

impl ManualNetwork {
    pub fn new(initial: NetworkState) -> Self {
        let (current, _) = watch::channel(initial);
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        ManualNetwork { current, events }
    }

    pub fn online() -> Self {
        Self::new(NetworkState::online())
    }

    pub fn offline() -> Self {
        Self::new(NetworkState::offline())
    }

    /// Records a new observation and emits it to subscribers.
    ///
    /// Emits even when `state` equals the previous one.
    pub fn set(&self, state: NetworkState) {
        self.current.send_replace(state);
        // no subscribers yet is fine
        let _ = self.events.send(state);
    }

    /// Changes what [`NetworkProbe::fetch`] answers without emitting an event.
    pub fn set_silently(&self, state: NetworkState) {
        self.current.send_replace(state);
    }

    pub fn current(&self) -> NetworkState {
        *self.current.borrow()
    }
}

#[async_trait]
impl NetworkProbe for ManualNetwork {
    async fn fetch(&self) -> NetworkState {
        self.current()
    }

    fn subscribe(&self) -> broadcast::Receiver<NetworkState> {
        self.events.subscribe()
    }
}

// =============================================================================
// Monitor
// =============================================================================

/// A flip of the derived offline flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    WentOffline,
    CameOnline,
}

/// Publishes connectivity into the offline state.
#[derive(Clone)]
pub struct ConnectivityMonitor {
    probe: Arc<dyn NetworkProbe>,
    store: OfflineStore,
}

impl ConnectivityMonitor {
    pub fn new(probe: Arc<dyn NetworkProbe>, store: OfflineStore) -> Self {
        ConnectivityMonitor { probe, store }
    }

    /// Handles one observation.
    ///
    /// ## Returns
    /// The transition, if the derived flag changed.
    pub async fn observe(&self, state: NetworkState) -> SyncResult<Option<Transition>> {
        let offline = state.is_offline();

        debug!(
            is_connected = state.is_connected,
            is_internet_reachable = ?state.is_internet_reachable,
            offline,
            "Network state observed"
        );

        let changed = self
            .store
            .dispatch(OfflineAction::SetOfflineStatus(offline))
            .await?;

        if !changed {
            return Ok(None);
        }

        Ok(Some(if offline {
            Transition::WentOffline
        } else {
            Transition::CameOnline
        }))
    }

    /// Fetches the current state from the probe and observes it.
    pub async fn refresh(&self) -> SyncResult<Option<Transition>> {
        let state = self.probe.fetch().await;
        self.observe(state).await
    }

    /// Per-call connectivity check; does not touch the published flag.
    pub async fn is_offline_now(&self) -> bool {
        self.probe.fetch().await.is_offline()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<NetworkState> {
        self.probe.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use survey_db::MemoryStore;

    fn monitor(probe: Arc<ManualNetwork>) -> (OfflineStore, ConnectivityMonitor) {
        let store = OfflineStore::new(Arc::new(MemoryStore::new()));
        let monitor = ConnectivityMonitor::new(probe, store.clone());
        (store, monitor)
    }

    #[tokio::test]
    async fn test_transitions_only_on_change() {
        let (store, monitor) = monitor(Arc::new(ManualNetwork::online()));

        assert_eq!(monitor.observe(NetworkState::online()).await.unwrap(), None);

        assert_eq!(
            monitor.observe(NetworkState::offline()).await.unwrap(),
            Some(Transition::WentOffline)
        );
        assert!(store.is_offline());

        // a different raw state with the same derived flag
        assert_eq!(
            monitor
                .observe(NetworkState::new(true, Some(false)))
                .await
                .unwrap(),
            None
        );

        assert_eq!(
            monitor
                .observe(NetworkState::new(true, None))
                .await
                .unwrap(),
            Some(Transition::CameOnline)
        );
        assert!(!store.is_offline());
    }

    #[tokio::test]
    async fn test_is_offline_now_asks_the_probe() {
        let probe = Arc::new(ManualNetwork::online());
        let (store, monitor) = monitor(probe.clone());

        assert!(!monitor.is_offline_now().await);
        probe.set_silently(NetworkState::offline());
        assert!(monitor.is_offline_now().await);
        // the published flag is untouched by the one-shot check
        assert!(!store.is_offline());

        assert_eq!(
            monitor.refresh().await.unwrap(),
            Some(Transition::WentOffline)
        );
    }

    #[tokio::test]
    async fn test_manual_network_emits_repeats() {
        let probe = ManualNetwork::online();
        let mut rx = probe.subscribe();

        probe.set(NetworkState::offline());
        probe.set(NetworkState::offline());

        assert_eq!(rx.recv().await.unwrap(), NetworkState::offline());
        assert_eq!(rx.recv().await.unwrap(), NetworkState::offline());
        assert_eq!(probe.fetch().await, NetworkState::offline());
    }
}
