//! # survey-sync: Offline Request Queue for MonkeySurvey
//!
//! This crate keeps the survey clients usable without a connection: reads
//! are served from a response cache, writes are queued durably and replayed
//! in order once connectivity returns.
//!
//! ## Architecture Overview
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Offline Layer Architecture                         │
//! │                                                                         │
//! │  ┌──────────────────────────────────────────────────────────────────┐  │
//! │  │                    SyncAgent (Main Orchestrator)                 │  │
//! │  │                                                                  │  │
//! │  │  Spawned as a Tokio task by the host app                         │  │
//! │  │  Turns connectivity transitions into sync passes                 │  │
//! │  └────────────────────────────┬─────────────────────────────────────┘  │
//! │                               │                                         │
//! │         ┌─────────────────────┼─────────────────────┐                  │
//! │         ▼                     ▼                     ▼                   │
//! │  ┌────────────────┐  ┌────────────────┐  ┌────────────────────────┐    │
//! │  │ Connectivity   │  │ OfflineClient  │  │ SyncEngine             │    │
//! │  │ Monitor        │  │                │  │                        │    │
//! │  │                │  │ Bearer token   │  │ Snapshot the queue     │    │
//! │  │ NetworkProbe ──│─►│ GET → cache    │◄─│ Replay FIFO, one by one│    │
//! │  │ events → one   │  │ write → queue  │  │ Classify failures      │    │
//! │  │ offline flag   │  │ when offline   │  │ synced / error         │    │
//! │  └────────────────┘  └────────────────┘  └────────────────────────┘    │
//! │                               │                                         │
//! │  ┌────────────────────────────┴────────────────────────────────────┐   │
//! │  │  OfflineStore (context)   ResponseCache   CredentialStore        │   │
//! │  │  queue + sync state       API_CACHE_*     authToken              │   │
//! │  │                    ──► survey_db::KeyValueStore                  │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//! - [`agent`] - Main `SyncAgent` orchestrator and its handle
//! - [`cache`] - GET response cache with optional TTL and size bound
//! - [`classifier`] - What to do with items whose replay failed
//! - [`client`] - `OfflineClient`, the request interception layer
//! - [`config`] - Sync configuration (API URL, retry, cache, storage)
//! - [`connectivity`] - Network probe trait and connectivity monitor
//! - [`context`] - `OfflineStore`, the shared offline state
//! - [`credentials`] - Bearer token storage
//! - [`endpoints`] - Request descriptors for the gateway routes
//! - [`engine`] - Sequential queue replay
//! - [`error`] - Sync error types
//! - [`http`] - HTTP client trait and reqwest implementation
//!
//! ## Usage
//!
//! ```rust,ignore
//! use survey_sync::{endpoints, ReqwestClient, SyncAgent, SyncConfig};
//!
//! let config = SyncConfig::load_or_default(None);
//! let http = Arc::new(ReqwestClient::new(&config.api.base_url, config.http.timeout())?);
//!
//! let agent = SyncAgent::new(config, storage, http, probe).await?;
//! let (handle, _task) = agent.spawn().await;
//!
//! // Queued if offline, sent right away otherwise
//! let resp = handle.client().request(endpoints::responses::submit(answers)).await?;
//! if resp.provisional {
//!     println!("Saved offline, {} pending", handle.status().pending_count);
//! }
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod agent;
pub mod cache;
pub mod classifier;
pub mod client;
pub mod config;
pub mod connectivity;
pub mod context;
pub mod credentials;
pub mod endpoints;
pub mod engine;
pub mod error;
pub mod http;

#[cfg(test)]
mod test_support;

// =============================================================================
// Re-exports
// =============================================================================

pub use agent::{NoOpEmitter, SyncAgent, SyncAgentHandle, SyncEventEmitter};
pub use cache::{CachePolicy, ResponseCache};
pub use classifier::{
    DropClientErrors, FailureClassifier, FailureDisposition, FailurePolicy, RetainAll,
};
pub use client::OfflineClient;
pub use config::{RetryPolicy, SyncConfig};
pub use connectivity::{ConnectivityMonitor, ManualNetwork, NetworkProbe, Transition};
pub use context::OfflineStore;
pub use credentials::CredentialStore;
pub use engine::{PassOutcome, SyncEngine, SyncReport};
pub use error::{SyncError, SyncResult};
pub use http::{ApiResponse, HttpClient, HttpRequest, ReqwestClient};

pub use survey_core::{NetworkState, OfflineSnapshot, QueueItem, QueueStatus, SyncState};
