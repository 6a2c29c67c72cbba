//! # Domain Types
//!
//! Core types shared by the interception layer, the sync engine and the
//! persistence layer.
//!
//! ## Type Overview
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                            Domain Types                                 │
//! │                                                                         │
//! │  ┌──────────────────┐   ┌──────────────────┐   ┌──────────────────┐    │
//! │  │ RequestDescriptor│   │    QueueItem     │   │   QueueStatus    │    │
//! │  │ ──────────────── │   │ ──────────────── │   │ ──────────────── │    │
//! │  │ method           │──►│ id (ms + uuid)   │   │ Pending          │    │
//! │  │ url              │   │ timestamp        │   │ Processing       │    │
//! │  │ data   (JSON)    │   │ method/url/...   │   │ Failed           │    │
//! │  │ params (JSON)    │   │ status, error    │   └──────────────────┘    │
//! │  └──────────────────┘   └──────────────────┘                            │
//! │                                                                         │
//! │  ┌──────────────────┐   ┌──────────────────┐                            │
//! │  │   NetworkState   │   │    SyncState     │                            │
//! │  │ ──────────────── │   │ ──────────────── │                            │
//! │  │ is_connected     │   │ Idle             │                            │
//! │  │ is_internet_     │   │ Syncing          │                            │
//! │  │   reachable?     │   │ Synced / Error   │                            │
//! │  └──────────────────┘   └──────────────────┘                            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Queue items carry no `done` status: a replayed item is removed, never
//! transitioned.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use ts_rs::TS;
use uuid::Uuid;

use crate::error::CoreError;
use crate::CACHE_KEY_PREFIX;

// =============================================================================
// HTTP Method
// =============================================================================

/// HTTP method of an intercepted request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl HttpMethod {
    /// Returns true for reads, which are served from cache while offline.
    /// Every other method is a write and gets queued.
    #[inline]
    pub fn is_read(&self) -> bool {
        matches!(self, HttpMethod::Get)
    }

    /// Upper-case wire name.
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Delete => "DELETE",
        }
    }
}

impl std::fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for HttpMethod {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "GET" => Ok(HttpMethod::Get),
            "POST" => Ok(HttpMethod::Post),
            "PUT" => Ok(HttpMethod::Put),
            "PATCH" => Ok(HttpMethod::Patch),
            "DELETE" => Ok(HttpMethod::Delete),
            _ => Err(CoreError::UnknownMethod(s.to_string())),
        }
    }
}

// =============================================================================
// Request Descriptor
// =============================================================================

/// The parts of an outgoing request the offline layer needs to replay it.
///
/// `url` is relative to the API base URL (e.g. `/responses`). `data` is the
/// JSON body, `params` the query parameters as a JSON object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestDescriptor {
    pub method: HttpMethod,
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl RequestDescriptor {
    /// Creates a descriptor with no body and no query parameters.
    pub fn new(method: HttpMethod, url: impl Into<String>) -> Self {
        RequestDescriptor {
            method,
            url: url.into(),
            data: None,
            params: None,
        }
    }

    /// Shorthand for a GET descriptor.
    pub fn get(url: impl Into<String>) -> Self {
        Self::new(HttpMethod::Get, url)
    }

    /// Sets the JSON body.
    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    /// Sets the query parameters.
    pub fn with_params(mut self, params: Value) -> Self {
        self.params = Some(params);
        self
    }

    /// Serialized form of the query parameters used in cache keys.
    ///
    /// Missing or `null` params serialize as `{}` so that `GET /surveys`
    /// and `GET /surveys` with `params: None` share one cache entry.
    pub fn serialized_params(&self) -> String {
        match &self.params {
            None | Some(Value::Null) => "{}".to_string(),
            Some(params) => params.to_string(),
        }
    }

    /// Cache key for this request: `API_CACHE_<url>_<serialized params>`.
    pub fn cache_key(&self) -> String {
        format!("{}{}_{}", CACHE_KEY_PREFIX, self.url, self.serialized_params())
    }
}

// =============================================================================
// Queue Status
// =============================================================================

/// Replay status of a queued write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum QueueStatus {
    /// Waiting for the next sync pass.
    #[default]
    Pending,
    /// Being replayed right now.
    Processing,
    /// Last replay attempt failed; kept for the next pass.
    Failed,
}

impl std::fmt::Display for QueueStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            QueueStatus::Pending => write!(f, "pending"),
            QueueStatus::Processing => write!(f, "processing"),
            QueueStatus::Failed => write!(f, "failed"),
        }
    }
}

impl std::str::FromStr for QueueStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(QueueStatus::Pending),
            "processing" => Ok(QueueStatus::Processing),
            "failed" => Ok(QueueStatus::Failed),
            other => Err(CoreError::UnknownQueueStatus(other.to_string())),
        }
    }
}

// =============================================================================
// Queue Item
// =============================================================================

/// A write operation recorded while offline, waiting to be replayed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct QueueItem {
    /// `<unix millis>-<uuid v4>`, generated at enqueue time.
    pub id: String,

    /// When the write was attempted.
    #[ts(as = "String")]
    pub timestamp: DateTime<Utc>,

    pub method: HttpMethod,

    pub url: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[ts(type = "unknown")]
    pub data: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[ts(type = "unknown")]
    pub params: Option<Value>,

    #[serde(default)]
    pub status: QueueStatus,

    /// Last failure message. Only set while `status` is `Failed`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Failed replay attempts so far.
    #[serde(default)]
    pub attempts: u32,
}

impl QueueItem {
    /// Creates a pending item for `request`, stamped with a fresh id and the
    /// current time.
    pub fn from_request(request: RequestDescriptor) -> Self {
        QueueItem {
            id: generate_item_id(),
            timestamp: Utc::now(),
            method: request.method,
            url: request.url,
            data: request.data,
            params: request.params,
            status: QueueStatus::Pending,
            error: None,
            attempts: 0,
        }
    }

    /// Rebuilds the original request for replay.
    pub fn request(&self) -> RequestDescriptor {
        RequestDescriptor {
            method: self.method,
            url: self.url.clone(),
            data: self.data.clone(),
            params: self.params.clone(),
        }
    }

    #[inline]
    pub fn is_failed(&self) -> bool {
        self.status == QueueStatus::Failed
    }
}

/// Generates a queue item id.
///
/// The millisecond prefix keeps ids roughly ordered by creation; the UUID
/// suffix makes collisions within a session practically impossible.
pub fn generate_item_id() -> String {
    format!(
        "{}-{}",
        Utc::now().timestamp_millis(),
        Uuid::new_v4().simple()
    )
}

// =============================================================================
// Sync State
// =============================================================================

/// State of the sync engine.
///
/// ## Transitions
/// ```text
///   idle ──(offline→online, queue non-empty)──► syncing
///   syncing ──(≥1 success, or empty queue)────► synced
///   syncing ──(0 successes, ≥1 failure)───────► error
///   synced / error ──(next trigger)───────────► syncing
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum SyncState {
    #[default]
    Idle,
    Syncing,
    Synced,
    Error,
}

impl std::fmt::Display for SyncState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SyncState::Idle => write!(f, "idle"),
            SyncState::Syncing => write!(f, "syncing"),
            SyncState::Synced => write!(f, "synced"),
            SyncState::Error => write!(f, "error"),
        }
    }
}

impl std::str::FromStr for SyncState {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "idle" => Ok(SyncState::Idle),
            "syncing" => Ok(SyncState::Syncing),
            "synced" => Ok(SyncState::Synced),
            "error" => Ok(SyncState::Error),
            other => Err(CoreError::UnknownSyncState(other.to_string())),
        }
    }
}

// =============================================================================
// Network State
// =============================================================================

/// A raw connectivity observation, as delivered by the platform observer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkState {
    /// The network link is up.
    pub is_connected: bool,

    /// Whether the internet is reachable over that link. `None` while the
    /// platform has not determined it yet.
    pub is_internet_reachable: Option<bool>,
}

impl NetworkState {
    pub fn new(is_connected: bool, is_internet_reachable: Option<bool>) -> Self {
        NetworkState {
            is_connected,
            is_internet_reachable,
        }
    }

    /// Connected with confirmed internet access.
    pub fn online() -> Self {
        Self::new(true, Some(true))
    }

    /// No link at all.
    pub fn offline() -> Self {
        Self::new(false, Some(false))
    }

    /// Derives the single offline flag.
    ///
    /// Offline unless the link is connected AND reachability is either
    /// unknown or true. A connected link known to lack internet access is
    /// offline; unknown reachability is treated optimistically as online.
    pub fn is_offline(&self) -> bool {
        !(self.is_connected && self.is_internet_reachable != Some(false))
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_offline_derivation() {
        assert!(!NetworkState::new(true, Some(true)).is_offline());
        assert!(!NetworkState::new(true, None).is_offline());
        assert!(NetworkState::new(true, Some(false)).is_offline());
        assert!(NetworkState::new(false, None).is_offline());
        assert!(NetworkState::new(false, Some(true)).is_offline());
    }

    #[test]
    fn test_method_parsing() {
        assert_eq!("get".parse::<HttpMethod>().unwrap(), HttpMethod::Get);
        assert_eq!("Delete".parse::<HttpMethod>().unwrap(), HttpMethod::Delete);
        assert!("FETCH".parse::<HttpMethod>().is_err());
        assert!(HttpMethod::Get.is_read());
        assert!(!HttpMethod::Post.is_read());
    }

    #[test]
    fn test_cache_key_without_params() {
        let bare = RequestDescriptor::get("/surveys");
        let null = RequestDescriptor::get("/surveys").with_params(Value::Null);
        assert_eq!(bare.cache_key(), "API_CACHE_/surveys_{}");
        assert_eq!(bare.cache_key(), null.cache_key());
    }

    #[test]
    fn test_cache_key_distinguishes_params() {
        let page1 = RequestDescriptor::get("/surveys").with_params(json!({"page": 1}));
        let page2 = RequestDescriptor::get("/surveys").with_params(json!({"page": 2}));
        assert_eq!(page1.cache_key(), r#"API_CACHE_/surveys_{"page":1}"#);
        assert_ne!(page1.cache_key(), page2.cache_key());
    }

    #[test]
    fn test_queue_item_from_request() {
        let request = RequestDescriptor::new(HttpMethod::Post, "/responses")
            .with_data(json!({"a": 1}));
        let item = QueueItem::from_request(request.clone());

        assert_eq!(item.status, QueueStatus::Pending);
        assert!(item.error.is_none());
        assert_eq!(item.attempts, 0);
        assert_eq!(item.request(), request);
    }

    #[test]
    fn test_item_ids_are_unique() {
        let a = generate_item_id();
        let b = generate_item_id();
        assert_ne!(a, b);
    }

    #[test]
    fn test_queue_item_tolerates_missing_optional_fields() {
        let raw = r#"{
            "id": "1700000000000-abc",
            "timestamp": "2024-01-01T00:00:00Z",
            "method": "PUT",
            "url": "/users/profile"
        }"#;
        let item: QueueItem = serde_json::from_str(raw).unwrap();
        assert_eq!(item.status, QueueStatus::Pending);
        assert_eq!(item.attempts, 0);
        assert!(item.data.is_none());
    }

    #[test]
    fn test_sync_state_parsing() {
        assert_eq!("synced".parse::<SyncState>().unwrap(), SyncState::Synced);
        assert!("done".parse::<SyncState>().is_err());
        assert_eq!(SyncState::default(), SyncState::Idle);
    }
}
