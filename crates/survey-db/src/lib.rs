//! # survey-db: Persistent Key-Value Store for MonkeySurvey Offline
//!
//! This crate owns every byte the offline layer persists. It exposes a
//! string-keyed [`KeyValueStore`] trait with two implementations: a SQLite
//! one for real devices and an in-memory one for tests and ephemeral use.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       MonkeySurvey Offline Storage                      │
//! │                                                                         │
//! │  OfflineStore / ResponseCache / CredentialStore  (survey-sync)         │
//! │       │                                                                 │
//! │       ▼  Arc<dyn KeyValueStore>                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                     survey-db (THIS CRATE)                      │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────────┐    ┌───────────────┐    ┌──────────────┐  │   │
//! │  │   │   Database    │    │ KvRepository  │    │  Migrations  │  │   │
//! │  │   │   (pool.rs)   │───►│ (SQLite KV)   │    │  (embedded)  │  │   │
//! │  │   └───────────────┘    └───────────────┘    └──────────────┘  │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────────┐                                             │   │
//! │  │   │  MemoryStore  │  BTreeMap behind an RwLock                  │   │
//! │  │   └───────────────┘                                             │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │  SQLite: ~/.local/share/monkeysurvey/offline.db (kv_store)      │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`pool`] - Connection pool creation and configuration
//! - [`migrations`] - Embedded database migrations
//! - [`store`] - The `KeyValueStore` trait and the in-memory store
//! - [`repository`] - SQLite-backed repositories
//! - [`error`] - Database error types
//!
//! ## Usage
//!
//! ```rust,ignore
//! use survey_db::{Database, DbConfig, KeyValueStore};
//!
//! let db = Database::new(DbConfig::new("offline.db")).await?;
//! let kv = db.kv();
//! kv.set("authToken", "abc").await?;
//! assert_eq!(kv.get("authToken").await?.as_deref(), Some("abc"));
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod migrations;
pub mod pool;
pub mod repository;
pub mod store;

// =============================================================================
// Re-exports
// =============================================================================

pub use error::{DbError, DbResult};
pub use pool::{Database, DbConfig};
pub use repository::kv::KvRepository;
pub use store::{KeyValueStore, MemoryStore};
