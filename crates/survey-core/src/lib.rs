//! # survey-core: Pure Types for the MonkeySurvey Offline Queue
//!
//! This crate holds every type the offline request queue reasons about,
//! plus the reducer that mutates the offline state. It performs no I/O.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                     MonkeySurvey Offline Data Flow                      │
//! │                                                                         │
//! │  OfflineClient.request(GET /surveys)                                   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                    survey-core (THIS CRATE)                     │   │
//! │  │                                                                 │   │
//! │  │   ┌────────────────┐  ┌────────────────┐  ┌────────────────┐   │   │
//! │  │   │ RequestDescr.  │  │   QueueItem    │  │  OfflineState  │   │   │
//! │  │   │ method/url/    │  │ id, timestamp, │  │  + reducer     │   │   │
//! │  │   │ data/params    │  │ status, error  │  │  (actions)     │   │   │
//! │  │   └────────────────┘  └────────────────┘  └────────────────┘   │   │
//! │  │                                                                 │   │
//! │  │   ┌────────────────┐  ┌────────────────┐                       │   │
//! │  │   │  NetworkState  │  │   SyncState    │                       │   │
//! │  │   │ → is_offline() │  │ idle/syncing/  │                       │   │
//! │  │   │                │  │ synced/error   │                       │   │
//! │  │   └────────────────┘  └────────────────┘                       │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  survey-db (persistence) / survey-sync (engine)                        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Request descriptors, queue items, sync and network states
//! - [`state`] - The offline state container and its reducer
//! - [`error`] - Domain error types
//!
//! ## Example Usage
//!
//! ```rust
//! use survey_core::{NetworkState, OfflineAction, OfflineState, QueueItem, RequestDescriptor};
//! use survey_core::types::HttpMethod;
//!
//! // A connected link with unknown reachability counts as online.
//! assert!(!NetworkState::new(true, None).is_offline());
//!
//! let mut state = OfflineState::default();
//! let request = RequestDescriptor::new(HttpMethod::Post, "/responses");
//! state.apply(OfflineAction::Enqueue(QueueItem::from_request(request)));
//! assert_eq!(state.queue.len(), 1);
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod state;
pub mod types;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use error::CoreError;
pub use state::{OfflineAction, OfflineSnapshot, OfflineState};
pub use types::*;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Key under which the serialized offline queue is persisted.
pub const QUEUE_STORAGE_KEY: &str = "offline_queue";

/// Key under which the bearer credential is persisted.
pub const AUTH_TOKEN_KEY: &str = "authToken";

/// Prefix of every cached GET response key.
pub const CACHE_KEY_PREFIX: &str = "API_CACHE_";
