//! # MonkeySurvey Sync Agent
//!
//! Headless host for the offline layer. Keeps the request queue in SQLite,
//! watches gateway reachability and replays queued writes when it returns.
//!
//! ## Startup Sequence
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Agent Startup Flow                               │
//! │                                                                         │
//! │  1. Initialize Tracing  ──►  RUST_LOG or "info,survey=debug"            │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  2. Load Config         ──►  defaults → sync.toml → SURVEY_* env        │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  3. Open Database       ──►  offline.db, run migrations                 │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  4. Start Probe         ──►  TCP connect to the gateway on an interval  │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  5. Spawn SyncAgent     ──►  hydrate queue, sync if online              │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  6. Wait for Ctrl+C / SIGTERM, then shut down                           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

mod probe;

use std::sync::Arc;
use std::time::Duration;

use survey_core::OfflineSnapshot;
use survey_db::{Database, DbConfig};
use survey_sync::{ReqwestClient, SyncAgent, SyncConfig, SyncEventEmitter, SyncReport};
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::probe::TcpProbe;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    info!(version = env!("CARGO_PKG_VERSION"), "Starting MonkeySurvey sync agent");

    let config = SyncConfig::load(None)?;

    let db_path = config
        .database_path()
        .ok_or("Could not determine a data directory for offline.db")?;
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    info!(?db_path, "Opening offline database");
    let db = Database::new(DbConfig::new(&db_path)).await?;

    let http = Arc::new(ReqwestClient::new(&config.api.base_url, config.http.timeout())?);

    let probe = Arc::new(TcpProbe::new(
        &config.api.base_url,
        Duration::from_secs(config.sync.probe_timeout_secs),
    )?);
    info!(address = probe.address(), "Probing gateway reachability");
    let poller = probe
        .clone()
        .spawn_polling(Duration::from_secs(config.sync.probe_interval_secs));

    let agent = SyncAgent::new(config, Arc::new(db.kv()), http, probe)
        .await?
        .with_emitter(Arc::new(LogEmitter));
    let (handle, task) = agent.spawn().await;

    let status = handle.status();
    info!(
        offline = status.is_offline,
        pending = status.pending_count,
        "Sync agent running"
    );

    shutdown_signal().await;

    handle.shutdown().await;
    if let Err(e) = task.await {
        error!(error = %e, "Sync agent task failed");
    }
    poller.abort();
    db.close().await;

    info!("Sync agent stopped");
    Ok(())
}

/// Initializes tracing/logging.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,survey=debug,sqlx=warn"));

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();
}

/// Waits for Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}

/// Reports agent events to the log.
struct LogEmitter;

impl SyncEventEmitter for LogEmitter {
    fn emit_status(&self, status: &OfflineSnapshot) {
        info!(
            offline = status.is_offline,
            sync_status = %status.sync_status,
            pending = status.pending_count,
            failed = status.failed_count,
            last_sync = status.last_sync_time.as_deref().unwrap_or("never"),
            "Offline status"
        );
    }

    fn emit_pass(&self, report: &SyncReport) {
        info!(
            attempted = report.attempted,
            succeeded = report.succeeded,
            failed = report.failed,
            dropped = report.dropped,
            final_state = %report.final_state,
            "Sync pass finished"
        );
    }

    fn emit_error(&self, message: &str, retryable: bool) {
        warn!(retryable, "Sync error: {}", message);
    }
}
