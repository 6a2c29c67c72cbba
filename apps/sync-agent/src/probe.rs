//! TCP reachability probe for the API gateway.
//!
//! There is no platform network stack to ask on a headless host, so the
//! agent opens a TCP connection to the gateway on an interval and reports
//! whether it succeeded.

use std::time::Duration;

use async_trait::async_trait;
use survey_core::NetworkState;
use survey_sync::{NetworkProbe, SyncError, SyncResult};
use tokio::net::TcpStream;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, trace};
use url::Url;

const EVENT_CAPACITY: usize = 16;

/// Probes the gateway by connecting to its host and port.
pub struct TcpProbe {
    address: String,
    timeout: Duration,
    events: broadcast::Sender<NetworkState>,
}

impl TcpProbe {
    /// Builds a probe for the host of `base_url`.
    pub fn new(base_url: &str, timeout: Duration) -> SyncResult<Self> {
        let address = gateway_address(base_url)?;
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Ok(TcpProbe {
            address,
            timeout,
            events,
        })
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    /// Polls the gateway every `interval` and broadcasts every observation.
    ///
    /// Repeats are not filtered; the monitor drops unchanged states.
    pub fn spawn_polling(self: std::sync::Arc<Self>, interval: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            loop {
                ticker.tick().await;
                let state = self.fetch().await;
                // No receivers yet is fine; the agent fetches on start.
                let _ = self.events.send(state);
            }
        })
    }
}

#[async_trait]
impl NetworkProbe for TcpProbe {
    async fn fetch(&self) -> NetworkState {
        match tokio::time::timeout(self.timeout, TcpStream::connect(&self.address)).await {
            Ok(Ok(_)) => {
                trace!(address = %self.address, "Gateway reachable");
                NetworkState::online()
            }
            Ok(Err(e)) => {
                debug!(address = %self.address, error = %e, "Gateway unreachable");
                NetworkState::offline()
            }
            Err(_) => {
                debug!(address = %self.address, "Gateway probe timed out");
                NetworkState::offline()
            }
        }
    }

    fn subscribe(&self) -> broadcast::Receiver<NetworkState> {
        self.events.subscribe()
    }
}

/// `host:port` of the gateway, using the scheme's default port if none is given.
fn gateway_address(base_url: &str) -> SyncResult<String> {
    let url = Url::parse(base_url)?;
    let host = url
        .host_str()
        .ok_or_else(|| SyncError::InvalidUrl(format!("{} has no host", base_url)))?;
    let port = url
        .port_or_known_default()
        .ok_or_else(|| SyncError::InvalidUrl(format!("{} has no port", base_url)))?;
    Ok(format!("{}:{}", host, port))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tokio::net::TcpListener;

    #[test]
    fn test_gateway_address() {
        assert_eq!(
            gateway_address("https://api.monkeysurvey.com/v1").unwrap(),
            "api.monkeysurvey.com:443"
        );
        assert_eq!(
            gateway_address("http://localhost:8080/api").unwrap(),
            "localhost:8080"
        );
        assert!(gateway_address("not a url").is_err());
    }

    #[tokio::test]
    async fn test_fetch_reports_reachability() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let probe = TcpProbe::new(&format!("http://127.0.0.1:{}", port), Duration::from_secs(1))
            .unwrap();
        assert!(!probe.fetch().await.is_offline());

        drop(listener);
        assert!(probe.fetch().await.is_offline());
    }

    #[tokio::test]
    async fn test_polling_repeats_unchanged_observations() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let probe = Arc::new(
            TcpProbe::new(&format!("http://127.0.0.1:{}", port), Duration::from_secs(1)).unwrap(),
        );
        let mut events = probe.subscribe();
        let task = probe.clone().spawn_polling(Duration::from_millis(10));

        for _ in 0..2 {
            let state = tokio::time::timeout(Duration::from_secs(5), events.recv())
                .await
                .unwrap()
                .unwrap();
            assert!(!state.is_offline());
        }

        task.abort();
    }
}
