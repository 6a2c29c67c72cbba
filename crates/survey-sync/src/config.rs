//! # Sync Configuration
//!
//! Configuration management for the offline layer.
//!
//! ## Configuration Sources
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Configuration Priority                               │
//! │                                                                         │
//! │  1. Environment Variables (highest priority)                           │
//! │     SURVEY_API_URL=https://staging.monkeysurvey.com/v1                 │
//! │     SURVEY_FAILURE_POLICY=drop_client_errors                           │
//! │                                                                         │
//! │  2. TOML Config File                                                   │
//! │     ~/.config/monkeysurvey/sync.toml (Linux)                           │
//! │     ~/Library/Application Support/com.monkeysurvey.monkeysurvey/       │
//! │       sync.toml (macOS)                                                │
//! │                                                                         │
//! │  3. Default Values (lowest priority)                                   │
//! │     Retain every failure, retry forever on the next reconnect,         │
//! │     unbounded response cache                                           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration File Format
//! ```toml
//! # sync.toml
//! [api]
//! base_url = "https://api.monkeysurvey.com/v1"
//!
//! [http]
//! timeout_secs = 10
//!
//! [sync]
//! failure_policy = "retain_all"  # retain_all | drop_client_errors
//! probe_interval_secs = 5
//! sync_on_start = true
//!
//! [retry]
//! max_attempts = 0               # 0 = unlimited
//! auto_retry = false
//!
//! [cache]
//! ttl_secs = 86400               # omit for no expiry
//! max_entries = 500              # omit for no bound
//!
//! [storage]
//! db_path = "/var/lib/monkeysurvey/offline.db"
//! ```

use backoff::ExponentialBackoff;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::cache::CachePolicy;
use crate::classifier::FailurePolicy;
use crate::error::{SyncError, SyncResult};

/// Default API gateway.
pub const DEFAULT_API_URL: &str = "https://api.monkeysurvey.com/v1";

// =============================================================================
// API / HTTP Settings
// =============================================================================

/// Where requests go.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiSettings {
    /// Base URL every relative request path is appended to.
    #[serde(default = "default_base_url")]
    pub base_url: String,
}

fn default_base_url() -> String {
    DEFAULT_API_URL.to_string()
}

impl Default for ApiSettings {
    fn default() -> Self {
        ApiSettings {
            base_url: default_base_url(),
        }
    }
}

/// HTTP client settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpSettings {
    /// Per-request timeout (seconds). Applies to live and replayed requests.
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

fn default_timeout() -> u64 {
    10
}

impl Default for HttpSettings {
    fn default() -> Self {
        HttpSettings {
            timeout_secs: default_timeout(),
        }
    }
}

impl HttpSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

// =============================================================================
// Sync Settings
// =============================================================================

/// Sync behavior settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncSettings {
    /// What to do with an item whose replay failed.
    #[serde(default)]
    pub failure_policy: FailurePolicy,

    /// Interval between reachability probes (seconds).
    #[serde(default = "default_probe_interval")]
    pub probe_interval_secs: u64,

    /// Timeout of a single reachability probe (seconds).
    #[serde(default = "default_probe_timeout")]
    pub probe_timeout_secs: u64,

    /// Run a pass at startup when online with a non-empty persisted queue.
    #[serde(default = "default_true")]
    pub sync_on_start: bool,
}

fn default_probe_interval() -> u64 {
    5
}

fn default_probe_timeout() -> u64 {
    3
}

fn default_true() -> bool {
    true
}

impl Default for SyncSettings {
    fn default() -> Self {
        SyncSettings {
            failure_policy: FailurePolicy::default(),
            probe_interval_secs: default_probe_interval(),
            probe_timeout_secs: default_probe_timeout(),
            sync_on_start: true,
        }
    }
}

// =============================================================================
// Retry Settings
// =============================================================================

/// Replay retry policy.
///
/// ## Defaults
/// ```text
/// ┌─────────────────────────────────────────────────────────────────────────┐
/// │  max_attempts = 0      a failed item stays queued forever              │
/// │  auto_retry   = false  failed items wait for the next reconnect        │
/// │                                                                         │
/// │  auto_retry = true:                                                    │
/// │    pass ends in `error` ──► wait 500ms, 1s, 2s ... (≤ max_backoff)     │
/// │                         ──► new pass (if still online)                 │
/// │    pass ends in `synced` ──► backoff reset                             │
/// └─────────────────────────────────────────────────────────────────────────┘
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Failed replays after which an item is dropped. 0 = unlimited.
    #[serde(default)]
    pub max_attempts: u32,

    /// Schedule another pass after a pass that ended in `error`.
    #[serde(default)]
    pub auto_retry: bool,

    /// Initial delay before an automatic retry (milliseconds).
    #[serde(default = "default_initial_backoff")]
    pub initial_backoff_ms: u64,

    /// Upper bound of the retry delay (seconds).
    #[serde(default = "default_max_backoff")]
    pub max_backoff_secs: u64,
}

fn default_initial_backoff() -> u64 {
    500
}

fn default_max_backoff() -> u64 {
    60
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            max_attempts: 0,
            auto_retry: false,
            initial_backoff_ms: default_initial_backoff(),
            max_backoff_secs: default_max_backoff(),
        }
    }
}

impl RetryPolicy {
    /// Returns true once `attempts` failed replays exhaust the budget.
    pub fn is_exhausted(&self, attempts: u32) -> bool {
        self.max_attempts > 0 && attempts >= self.max_attempts
    }

    /// Builds the backoff schedule for automatic retries.
    ///
    /// Never gives up on its own; the agent stops retrying once a pass
    /// succeeds or the queue drains.
    pub fn backoff(&self) -> ExponentialBackoff {
        ExponentialBackoff {
            initial_interval: Duration::from_millis(self.initial_backoff_ms),
            max_interval: Duration::from_secs(self.max_backoff_secs),
            max_elapsed_time: None,
            ..Default::default()
        }
    }
}

// =============================================================================
// Cache Settings
// =============================================================================

/// GET response cache settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CacheSettings {
    /// Entries older than this are treated as misses. Absent = never expire.
    #[serde(default)]
    pub ttl_secs: Option<u64>,

    /// Oldest entries are evicted beyond this count. Absent = unbounded.
    #[serde(default)]
    pub max_entries: Option<usize>,

    /// Serve the cache when an online GET fails without a response.
    #[serde(default)]
    pub fallback_on_network_error: bool,
}

impl CacheSettings {
    pub fn policy(&self) -> CachePolicy {
        CachePolicy {
            ttl: self.ttl_secs.map(Duration::from_secs),
            max_entries: self.max_entries,
        }
    }
}

// =============================================================================
// Storage Settings
// =============================================================================

/// Where the offline database lives.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageSettings {
    /// SQLite file. Absent = `offline.db` in the platform data directory.
    #[serde(default)]
    pub db_path: Option<PathBuf>,
}

// =============================================================================
// Main Sync Configuration
// =============================================================================

/// Complete configuration of the offline layer.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SyncConfig {
    #[serde(default)]
    pub api: ApiSettings,

    #[serde(default)]
    pub http: HttpSettings,

    #[serde(default)]
    pub sync: SyncSettings,

    #[serde(default)]
    pub retry: RetryPolicy,

    #[serde(default)]
    pub cache: CacheSettings,

    #[serde(default)]
    pub storage: StorageSettings,
}

impl SyncConfig {
    /// Creates a config with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads configuration from file, environment, and defaults.
    ///
    /// ## Load Order (later overrides earlier)
    /// 1. Default values
    /// 2. Config file (sync.toml)
    /// 3. Environment variables
    pub fn load(config_path: Option<PathBuf>) -> SyncResult<Self> {
        let mut config = Self::default();

        if let Some(path) = config_path.or_else(Self::default_config_path) {
            if path.exists() {
                info!(?path, "Loading sync config from file");
                let contents = std::fs::read_to_string(&path)?;
                config = toml::from_str(&contents)?;
            } else {
                debug!(?path, "Config file not found, using defaults");
            }
        }

        config.apply_overrides(|key| std::env::var(key).ok());

        config.validate()?;

        Ok(config)
    }

    /// Loads config or returns default if load fails.
    pub fn load_or_default(config_path: Option<PathBuf>) -> Self {
        Self::load(config_path).unwrap_or_else(|e| {
            warn!("Failed to load sync config: {}. Using defaults.", e);
            Self::default()
        })
    }

    /// Saves configuration to file.
    pub fn save(&self, config_path: Option<PathBuf>) -> SyncResult<()> {
        let path = config_path
            .or_else(Self::default_config_path)
            .ok_or_else(|| SyncError::ConfigSaveFailed("No config path available".into()))?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| SyncError::ConfigSaveFailed(e.to_string()))?;
        }

        let contents = toml::to_string_pretty(self)?;
        std::fs::write(&path, contents).map_err(|e| SyncError::ConfigSaveFailed(e.to_string()))?;

        info!(?path, "Sync config saved");
        Ok(())
    }

    /// Validates the configuration.
    pub fn validate(&self) -> SyncResult<()> {
        let base = &self.api.base_url;
        if !base.starts_with("http://") && !base.starts_with("https://") {
            return Err(SyncError::InvalidUrl(format!(
                "API URL must start with http:// or https://, got: {}",
                base
            )));
        }
        url::Url::parse(base)?;

        if self.http.timeout_secs == 0 {
            return Err(SyncError::InvalidConfig(
                "http.timeout_secs must be greater than 0".into(),
            ));
        }

        if self.sync.probe_interval_secs == 0 {
            return Err(SyncError::InvalidConfig(
                "sync.probe_interval_secs must be greater than 0".into(),
            ));
        }

        if self.sync.probe_timeout_secs == 0 {
            return Err(SyncError::InvalidConfig(
                "sync.probe_timeout_secs must be greater than 0".into(),
            ));
        }

        if self.retry.auto_retry && self.retry.initial_backoff_ms == 0 {
            return Err(SyncError::InvalidConfig(
                "retry.initial_backoff_ms must be greater than 0 when auto_retry is on".into(),
            ));
        }

        if self.cache.max_entries == Some(0) {
            return Err(SyncError::InvalidConfig(
                "cache.max_entries must be greater than 0 (omit it for no bound)".into(),
            ));
        }

        if self.cache.ttl_secs == Some(0) {
            return Err(SyncError::InvalidConfig(
                "cache.ttl_secs must be greater than 0 (omit it for no expiry)".into(),
            ));
        }

        Ok(())
    }

    /// Applies overrides from a variable lookup (the process environment in
    /// [`SyncConfig::load`]).
    fn apply_overrides(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(url) = var("SURVEY_API_URL") {
            debug!(url = %url, "Overriding API URL from environment");
            self.api.base_url = url;
        }

        if let Some(path) = var("SURVEY_DB_PATH") {
            debug!(path = %path, "Overriding database path from environment");
            self.storage.db_path = Some(PathBuf::from(path));
        }

        if let Some(policy) = var("SURVEY_FAILURE_POLICY") {
            match policy.parse() {
                Ok(parsed) => self.sync.failure_policy = parsed,
                Err(_) => warn!(policy = %policy, "Unknown failure policy in environment"),
            }
        }

        if let Some(attempts) = var("SURVEY_MAX_ATTEMPTS") {
            if let Ok(n) = attempts.parse::<u32>() {
                self.retry.max_attempts = n;
            }
        }

        if let Some(timeout) = var("SURVEY_HTTP_TIMEOUT_SECS") {
            if let Ok(secs) = timeout.parse::<u64>() {
                self.http.timeout_secs = secs;
            }
        }

        if let Some(interval) = var("SURVEY_PROBE_INTERVAL_SECS") {
            if let Ok(secs) = interval.parse::<u64>() {
                self.sync.probe_interval_secs = secs;
            }
        }
    }

    /// Returns the default config file path.
    fn default_config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("com", "monkeysurvey", "monkeysurvey")
            .map(|dirs| dirs.config_dir().join("sync.toml"))
    }

    /// Returns the configured database path, falling back to the platform
    /// data directory.
    pub fn database_path(&self) -> Option<PathBuf> {
        self.storage.db_path.clone().or_else(|| {
            directories::ProjectDirs::from("com", "monkeysurvey", "monkeysurvey")
                .map(|dirs| dirs.data_dir().join("offline.db"))
        })
    }

    /// Returns the failure policy.
    pub fn failure_policy(&self) -> FailurePolicy {
        self.sync.failure_policy
    }
}
