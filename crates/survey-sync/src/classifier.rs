//! # Failure Classification
//!
//! Decides what happens to a queue item whose replay failed.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  replay fails ──► item marked `failed` ──► classifier                  │
//! │                                             │                           │
//! │                           ┌─────────────────┴──────────────┐           │
//! │                           ▼                                ▼           │
//! │                        Retain                            Drop          │
//! │               (stays queued, retried on            (removed from       │
//! │                the next pass)                        the queue)        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! [`RetainAll`] keeps every failure, so a request the server rejects
//! outright (400, 404, 422) is re-sent on every pass forever.
//! [`DropClientErrors`] discards those, keeping only failures that may heal
//! on their own (network errors, 5xx, 408, 429).

use serde::{Deserialize, Serialize};
use std::sync::Arc;

use survey_core::QueueItem;

use crate::error::SyncError;

/// What to do with a failed item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureDisposition {
    /// Keep the item queued for the next pass.
    Retain,
    /// Remove the item; it will never be replayed.
    Drop,
}

/// Maps a replay failure to a disposition.
pub trait FailureClassifier: Send + Sync {
    fn classify(&self, item: &QueueItem, error: &SyncError) -> FailureDisposition;
}

/// Retains every failed item.
#[derive(Debug, Clone, Copy, Default)]
pub struct RetainAll;

impl FailureClassifier for RetainAll {
    fn classify(&self, _item: &QueueItem, _error: &SyncError) -> FailureDisposition {
        FailureDisposition::Retain
    }
}

/// Drops items the server rejected with a non-retryable 4xx.
#[derive(Debug, Clone, Copy, Default)]
pub struct DropClientErrors;

impl FailureClassifier for DropClientErrors {
    fn classify(&self, _item: &QueueItem, error: &SyncError) -> FailureDisposition {
        if error.is_client_error() && !error.is_retryable() {
            FailureDisposition::Drop
        } else {
            FailureDisposition::Retain
        }
    }
}

// =============================================================================
// Failure Policy (config selector)
// =============================================================================

/// Config-level name of a built-in classifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    #[default]
    RetainAll,
    DropClientErrors,
}

impl FailurePolicy {
    /// Instantiates the classifier this policy names.
    pub fn classifier(&self) -> Arc<dyn FailureClassifier> {
        match self {
            FailurePolicy::RetainAll => Arc::new(RetainAll),
            FailurePolicy::DropClientErrors => Arc::new(DropClientErrors),
        }
    }
}

impl std::fmt::Display for FailurePolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FailurePolicy::RetainAll => write!(f, "retain_all"),
            FailurePolicy::DropClientErrors => write!(f, "drop_client_errors"),
        }
    }
}

impl std::str::FromStr for FailurePolicy {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "retain_all" | "retain" => Ok(FailurePolicy::RetainAll),
            "drop_client_errors" | "drop_4xx" => Ok(FailurePolicy::DropClientErrors),
            other => Err(SyncError::InvalidConfig(format!(
                "Unknown failure policy: '{}'. Valid options: retain_all, drop_client_errors",
                other
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use survey_core::{HttpMethod, RequestDescriptor};

    fn item() -> QueueItem {
        QueueItem::from_request(
            RequestDescriptor::new(HttpMethod::Post, "/responses").with_data(json!({"a": 1})),
        )
    }

    fn http(status: u16) -> SyncError {
        SyncError::HttpStatus {
            status,
            body: json!({"error": "rejected"}),
        }
    }

    #[test]
    fn test_retain_all_keeps_everything() {
        let c = RetainAll;
        assert_eq!(c.classify(&item(), &http(400)), FailureDisposition::Retain);
        assert_eq!(c.classify(&item(), &http(500)), FailureDisposition::Retain);
    }

    #[test]
    fn test_drop_client_errors() {
        let c = DropClientErrors;
        assert_eq!(c.classify(&item(), &http(422)), FailureDisposition::Drop);
        assert_eq!(c.classify(&item(), &http(404)), FailureDisposition::Drop);
        assert_eq!(c.classify(&item(), &http(429)), FailureDisposition::Retain);
        assert_eq!(c.classify(&item(), &http(503)), FailureDisposition::Retain);
        assert_eq!(
            c.classify(&item(), &SyncError::Network("reset".into())),
            FailureDisposition::Retain
        );
    }

    #[test]
    fn test_policy_parsing() {
        assert_eq!(
            "retain_all".parse::<FailurePolicy>().unwrap(),
            FailurePolicy::RetainAll
        );
        assert_eq!(
            "Drop-Client-Errors".parse::<FailurePolicy>().unwrap(),
            FailurePolicy::DropClientErrors
        );
        assert!("sometimes".parse::<FailurePolicy>().is_err());
        assert_eq!(FailurePolicy::DropClientErrors.to_string(), "drop_client_errors");
    }
}
