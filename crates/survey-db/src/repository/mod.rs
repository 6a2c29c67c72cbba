//! # Repository Module
//!
//! SQLite repository implementations for the offline store.
//!
//! ## Repository Pattern
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  OfflineStore / ResponseCache                                          │
//! │       │                                                                 │
//! │       │  store.set("offline_queue", json)                              │
//! │       ▼                                                                 │
//! │  KvRepository  (impl KeyValueStore)                                    │
//! │  ├── get(&self, key)                                                   │
//! │  ├── set(&self, key, value)        upsert                              │
//! │  ├── remove(&self, key)                                                │
//! │  └── keys_with_prefix(&self, p)                                        │
//! │       │                                                                 │
//! │       │  SQL Query                                                      │
//! │       ▼                                                                 │
//! │  kv_store table                                                        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Available Repositories
//!
//! - [`kv::KvRepository`] - String key-value storage

pub mod kv;
