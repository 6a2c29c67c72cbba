//! # Error Types
//!
//! Domain-specific error types for survey-core.
//!
//! These only cover parsing of the string forms of the core enums; every
//! I/O failure lives in the crates that perform I/O.

use thiserror::Error;

// =============================================================================
// Core Error
// =============================================================================

/// Errors raised when turning loose input into core types.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CoreError {
    /// HTTP method string is not one the queue understands.
    #[error("Unknown HTTP method: '{0}'")]
    UnknownMethod(String),

    /// Sync state string is not one of idle/syncing/synced/error.
    #[error("Unknown sync state: '{0}'. Valid options: idle, syncing, synced, error")]
    UnknownSyncState(String),

    /// Queue status string is not one of pending/processing/failed.
    #[error("Unknown queue status: '{0}'. Valid options: pending, processing, failed")]
    UnknownQueueStatus(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = CoreError::UnknownMethod("FETCH".into());
        assert_eq!(err.to_string(), "Unknown HTTP method: 'FETCH'");
    }
}
