//! # Sync Error Types
//!
//! Error types for the offline layer.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Sync Error Categories                             │
//! │                                                                         │
//! │  ┌─────────────────┐  ┌─────────────────┐  ┌─────────────────────────┐ │
//! │  │  Configuration  │  │    Request      │  │     Storage             │ │
//! │  │                 │  │                 │  │                         │ │
//! │  │  InvalidConfig  │  │  NoConnection-  │  │  StorageFailed          │ │
//! │  │  InvalidUrl     │  │    NoCache      │  │  SerializationFailed    │ │
//! │  │  ConfigLoad/    │  │  Network        │  │  DeserializationFailed  │ │
//! │  │    SaveFailed   │  │  Timeout        │  │                         │ │
//! │  │                 │  │  HttpStatus     │  │                         │ │
//! │  └─────────────────┘  └─────────────────┘  └─────────────────────────┘ │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │  Internal: ShuttingDown, ChannelError                           │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! `Network`/`Timeout` (no response at all) and `HttpStatus` (a non-2xx
//! response with a body) are kept apart so callers and the failure
//! classifier can tell a dead link from a server that said no.

use serde_json::Value;
use thiserror::Error;

/// Result type alias for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Error type covering every failure of the offline layer.
#[derive(Debug, Error)]
pub enum SyncError {
    // =========================================================================
    // Configuration Errors
    // =========================================================================
    /// Invalid configuration.
    #[error("Invalid sync configuration: {0}")]
    InvalidConfig(String),

    /// Invalid API URL.
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// Failed to load config file.
    #[error("Failed to load config: {0}")]
    ConfigLoadFailed(String),

    /// Failed to save config file.
    #[error("Failed to save config: {0}")]
    ConfigSaveFailed(String),

    // =========================================================================
    // Request Errors
    // =========================================================================
    /// Offline GET with nothing cached for that url and params.
    #[error("No connection and no cached data for {url}")]
    NoConnectionNoCache { url: String },

    /// The request never produced a response.
    #[error("Network error: {0}")]
    Network(String),

    /// The request exceeded the client timeout.
    #[error("Request timed out: {0}")]
    Timeout(String),

    /// The server answered with a non-2xx status.
    #[error("HTTP {status}: {body}")]
    HttpStatus { status: u16, body: Value },

    // =========================================================================
    // Storage Errors
    // =========================================================================
    /// Key-value store operation failed.
    #[error("Storage error: {0}")]
    StorageFailed(String),

    /// Failed to serialize a value for storage.
    #[error("Serialization failed: {0}")]
    SerializationFailed(String),

    /// Failed to deserialize a stored value.
    #[error("Deserialization failed: {0}")]
    DeserializationFailed(String),

    // =========================================================================
    // Internal Errors
    // =========================================================================
    /// Agent is shutting down.
    #[error("Sync agent is shutting down")]
    ShuttingDown,

    /// Channel send/receive failed.
    #[error("Channel error: {0}")]
    ChannelError(String),
}

// =============================================================================
// Error Conversions
// =============================================================================

impl From<survey_db::DbError> for SyncError {
    fn from(err: survey_db::DbError) -> Self {
        SyncError::StorageFailed(err.to_string())
    }
}

impl From<serde_json::Error> for SyncError {
    fn from(err: serde_json::Error) -> Self {
        if err.is_data() || err.is_syntax() || err.is_eof() {
            SyncError::DeserializationFailed(err.to_string())
        } else {
            SyncError::SerializationFailed(err.to_string())
        }
    }
}

impl From<url::ParseError> for SyncError {
    fn from(err: url::ParseError) -> Self {
        SyncError::InvalidUrl(err.to_string())
    }
}

impl From<reqwest::Error> for SyncError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            SyncError::Timeout(err.to_string())
        } else if err.is_builder() {
            SyncError::InvalidUrl(err.to_string())
        } else {
            SyncError::Network(err.to_string())
        }
    }
}

impl From<std::io::Error> for SyncError {
    fn from(err: std::io::Error) -> Self {
        SyncError::ConfigLoadFailed(err.to_string())
    }
}

impl From<toml::de::Error> for SyncError {
    fn from(err: toml::de::Error) -> Self {
        SyncError::ConfigLoadFailed(err.to_string())
    }
}

impl From<toml::ser::Error> for SyncError {
    fn from(err: toml::ser::Error) -> Self {
        SyncError::ConfigSaveFailed(err.to_string())
    }
}

// =============================================================================
// Error Categorization
// =============================================================================

impl SyncError {
    /// HTTP status carried by this error, if the server answered at all.
    pub fn status(&self) -> Option<u16> {
        match self {
            SyncError::HttpStatus { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Returns true if no response was received (link down, DNS, timeout).
    pub fn is_network_error(&self) -> bool {
        matches!(self, SyncError::Network(_) | SyncError::Timeout(_))
    }

    /// Returns true for 401 responses.
    pub fn is_unauthorized(&self) -> bool {
        self.status() == Some(401)
    }

    /// Returns true for 4xx responses.
    pub fn is_client_error(&self) -> bool {
        matches!(self.status(), Some(400..=499))
    }

    /// Returns true if repeating the same request later may succeed.
    ///
    /// ## Retryable Errors
    /// - Network failures and timeouts
    /// - 5xx responses
    /// - 408 Request Timeout and 429 Too Many Requests
    ///
    /// ## Non-Retryable Errors
    /// - Every other 4xx response
    /// - Configuration and storage errors
    pub fn is_retryable(&self) -> bool {
        match self {
            SyncError::Network(_) | SyncError::Timeout(_) => true,
            SyncError::HttpStatus { status, .. } => {
                *status >= 500 || *status == 408 || *status == 429
            }
            _ => false,
        }
    }

    /// Returns true if this error indicates a configuration problem.
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            SyncError::InvalidConfig(_)
                | SyncError::InvalidUrl(_)
                | SyncError::ConfigLoadFailed(_)
                | SyncError::ConfigSaveFailed(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn status(code: u16) -> SyncError {
        SyncError::HttpStatus {
            status: code,
            body: json!({"error": "nope"}),
        }
    }

    #[test]
    fn test_retryable_errors() {
        assert!(SyncError::Network("connection refused".into()).is_retryable());
        assert!(SyncError::Timeout("10s".into()).is_retryable());
        assert!(status(503).is_retryable());
        assert!(status(429).is_retryable());

        assert!(!status(400).is_retryable());
        assert!(!status(404).is_retryable());
        assert!(!SyncError::InvalidConfig("bad".into()).is_retryable());
    }

    #[test]
    fn test_client_error_classification() {
        assert!(status(401).is_client_error());
        assert!(status(401).is_unauthorized());
        assert!(!status(500).is_client_error());
        assert!(!SyncError::Network("down".into()).is_client_error());
        assert_eq!(SyncError::Network("down".into()).status(), None);
    }

    #[test]
    fn test_error_display() {
        let err = SyncError::NoConnectionNoCache {
            url: "/surveys".into(),
        };
        assert!(err.to_string().contains("/surveys"));
        assert!(status(500).to_string().starts_with("HTTP 500"));
    }

    #[test]
    fn test_json_errors_are_deserialization_failures() {
        let err: SyncError = serde_json::from_str::<Value>("{not json")
            .unwrap_err()
            .into();
        assert!(matches!(err, SyncError::DeserializationFailed(_)));
    }
}
