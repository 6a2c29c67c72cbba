//! # Offline State
//!
//! The state container shared by the connectivity monitor, the interception
//! layer and the sync engine, and the reducer that mutates it.
//!
//! Every mutation is expressed as an [`OfflineAction`] and applied through
//! [`OfflineState::apply`], which reports whether anything changed. The
//! runtime wrapper in survey-sync uses that flag to avoid waking
//! subscribers on no-op dispatches.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::types::{QueueItem, QueueStatus, SyncState};

// =============================================================================
// Actions
// =============================================================================

/// A mutation of the offline state.
#[derive(Debug, Clone, PartialEq)]
pub enum OfflineAction {
    /// Publishes the derived connectivity flag.
    SetOfflineStatus(bool),

    /// Moves the sync engine to a new state. Entering `Synced` records the
    /// current time as the last sync time.
    SetSyncStatus(SyncState),

    /// Appends a write to the back of the queue.
    Enqueue(QueueItem),

    /// Removes a replayed item.
    Remove(String),

    /// Drops every queued item.
    Clear,

    /// Updates the replay status of one item.
    ///
    /// `error` is recorded only when supplied. Moving to `Failed` counts one
    /// failed attempt; moving anywhere else clears the previous error.
    UpdateItemStatus {
        id: String,
        status: QueueStatus,
        error: Option<String>,
    },

    /// Replaces the queue with items loaded from persistent storage.
    Hydrate(Vec<QueueItem>),
}

impl OfflineAction {
    /// Returns true if this action touches the queue (and so the queue must
    /// be persisted afterwards).
    pub fn mutates_queue(&self) -> bool {
        matches!(
            self,
            OfflineAction::Enqueue(_)
                | OfflineAction::Remove(_)
                | OfflineAction::Clear
                | OfflineAction::UpdateItemStatus { .. }
                | OfflineAction::Hydrate(_)
        )
    }
}

// =============================================================================
// State
// =============================================================================

/// Full offline state.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OfflineState {
    pub is_offline: bool,
    pub sync_status: SyncState,
    pub last_sync_time: Option<DateTime<Utc>>,
    /// Pending writes in insertion order.
    pub queue: Vec<QueueItem>,
}

impl OfflineState {
    /// Applies `action` and returns true if the state changed.
    pub fn apply(&mut self, action: OfflineAction) -> bool {
        match action {
            OfflineAction::SetOfflineStatus(offline) => {
                let changed = self.is_offline != offline;
                self.is_offline = offline;
                changed
            }

            OfflineAction::SetSyncStatus(status) => {
                let changed = self.sync_status != status;
                self.sync_status = status;
                if status == SyncState::Synced {
                    self.last_sync_time = Some(Utc::now());
                    return true;
                }
                changed
            }

            OfflineAction::Enqueue(item) => {
                self.queue.push(item);
                true
            }

            OfflineAction::Remove(id) => {
                let before = self.queue.len();
                self.queue.retain(|item| item.id != id);
                self.queue.len() != before
            }

            OfflineAction::Clear => {
                let changed = !self.queue.is_empty();
                self.queue.clear();
                changed
            }

            OfflineAction::UpdateItemStatus { id, status, error } => {
                let Some(item) = self.queue.iter_mut().find(|item| item.id == id) else {
                    return false;
                };

                item.status = status;
                if status == QueueStatus::Failed {
                    item.attempts = item.attempts.saturating_add(1);
                    if error.is_some() {
                        item.error = error;
                    }
                } else {
                    item.error = None;
                }
                true
            }

            OfflineAction::Hydrate(mut items) => {
                // A crash mid-pass leaves items marked processing; nothing is
                // replaying them any more.
                for item in items.iter_mut() {
                    if item.status == QueueStatus::Processing {
                        item.status = QueueStatus::Pending;
                    }
                }
                self.queue = items;
                true
            }
        }
    }

    /// Looks up a queued item by id.
    pub fn item(&self, id: &str) -> Option<&QueueItem> {
        self.queue.iter().find(|item| item.id == id)
    }

    /// Number of items whose last replay failed.
    pub fn failed_count(&self) -> usize {
        self.queue.iter().filter(|item| item.is_failed()).count()
    }

    /// Returns a serializable summary for status displays.
    pub fn snapshot(&self) -> OfflineSnapshot {
        OfflineSnapshot {
            is_offline: self.is_offline,
            sync_status: self.sync_status,
            last_sync_time: self.last_sync_time.map(|t| t.to_rfc3339()),
            pending_count: self.queue.len(),
            failed_count: self.failed_count(),
        }
    }
}

// =============================================================================
// Snapshot DTO
// =============================================================================

/// Summary of the offline state that a UI can render.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct OfflineSnapshot {
    pub is_offline: bool,
    pub sync_status: SyncState,
    /// Last time a pass ended in `synced` (RFC 3339).
    pub last_sync_time: Option<String>,
    /// Items still in the queue, failed ones included.
    pub pending_count: usize,
    pub failed_count: usize,
}

// =============================================================================
// Unit Tests
// =============================================================================
