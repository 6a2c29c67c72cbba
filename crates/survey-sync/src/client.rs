//! # Offline Client
//!
//! Every API call of the app goes through [`OfflineClient::request`].
//!
//! ## Request Routing
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        OfflineClient::request                           │
//! │                                                                         │
//! │   attach token (authToken) ──► is_offline_now()?                       │
//! │                                     │                                   │
//! │              ┌──────────── yes ─────┴───── no ──────────────┐          │
//! │              ▼                                               ▼          │
//! │        GET? ──yes──► cache hit  → 200 (cached body)     HttpClient      │
//! │          │           cache miss → NoConnectionNoCache      │            │
//! │          no                                                 ├─ 2xx GET  │
//! │          ▼                                                  │  → cache  │
//! │     enqueue ──► 200 "Saved offline" (provisional)           └─ 401      │
//! │                                                                → clear  │
//! │                                                                  token  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! A cache hit is returned as a plain 200, with nothing marking it as
//! cached. A queued write is returned with `provisional = true`.

use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info, warn};

use survey_core::{HttpMethod, NetworkState, QueueItem, RequestDescriptor};

use crate::cache::ResponseCache;
use crate::connectivity::ConnectivityMonitor;
use crate::context::OfflineStore;
use crate::credentials::CredentialStore;
use crate::error::{SyncError, SyncResult};
use crate::http::{ApiResponse, HttpClient, HttpRequest};

/// Request interception layer.
#[derive(Clone)]
pub struct OfflineClient {
    http: Arc<dyn HttpClient>,
    store: OfflineStore,
    monitor: ConnectivityMonitor,
    cache: ResponseCache,
    credentials: CredentialStore,
    fallback_on_network_error: bool,
}

impl OfflineClient {
    pub fn new(
        http: Arc<dyn HttpClient>,
        store: OfflineStore,
        monitor: ConnectivityMonitor,
        cache: ResponseCache,
        credentials: CredentialStore,
    ) -> Self {
        OfflineClient {
            http,
            store,
            monitor,
            cache,
            credentials,
            fallback_on_network_error: false,
        }
    }

    /// Serves cached GET bodies when an online request gets no response.
    pub fn with_network_fallback(mut self, enabled: bool) -> Self {
        self.fallback_on_network_error = enabled;
        self
    }

    pub fn cache(&self) -> &ResponseCache {
        &self.cache
    }

    pub fn credentials(&self) -> &CredentialStore {
        &self.credentials
    }

    /// Issues a request, falling back to the cache or the queue while
    /// offline.
    pub async fn request(&self, descriptor: RequestDescriptor) -> SyncResult<ApiResponse> {
        if self.monitor.is_offline_now().await {
            return self.handle_offline(descriptor).await;
        }

        self.send_live(descriptor).await
    }

    /// Sends a request over the network, skipping the offline branch.
    ///
    /// Still attaches the credential, caches successful GETs and clears the
    /// credential on 401. The sync engine replays queued writes through
    /// this.
    pub async fn send_live(&self, descriptor: RequestDescriptor) -> SyncResult<ApiResponse> {
        let token = self.credentials.token().await?;
        let request = HttpRequest::new(descriptor, token);
        let is_read = request.descriptor.method.is_read();

        match self.http.send(&request).await {
            Ok(response) => {
                if is_read {
                    if let Err(e) = self.cache.store(&request.descriptor, &response.body).await {
                        warn!(url = %request.descriptor.url, error = %e, "Failed to cache response");
                    }
                }
                Ok(response)
            }
            Err(err) => {
                if err.is_unauthorized() {
                    info!(url = %request.descriptor.url, "Credential rejected");
                    if let Err(e) = self.credentials.clear().await {
                        warn!(error = %e, "Failed to clear credential");
                    }
                }

                if is_read && err.is_network_error() && self.fallback_on_network_error {
                    if let Some(body) = self.cached(&request.descriptor).await {
                        warn!(
                            url = %request.descriptor.url,
                            error = %err,
                            "Network error, serving cached response"
                        );
                        return Ok(ApiResponse::ok(body));
                    }
                }

                Err(err)
            }
        }
    }

    /// Replays a queued write.
    pub async fn replay(&self, item: &QueueItem) -> SyncResult<ApiResponse> {
        self.send_live(item.request()).await
    }

    async fn handle_offline(&self, descriptor: RequestDescriptor) -> SyncResult<ApiResponse> {
        // the next online observation must count as an edge
        match self.monitor.observe(NetworkState::offline()).await {
            Ok(Some(_)) => debug!("Request saw the network offline first"),
            Ok(None) => {}
            Err(e) => warn!(error = %e, "Failed to publish offline status"),
        }

        if descriptor.method.is_read() {
            return match self.cached(&descriptor).await {
                Some(body) => {
                    debug!(url = %descriptor.url, "Offline, serving cached response");
                    Ok(ApiResponse::ok(body))
                }
                None => Err(SyncError::NoConnectionNoCache {
                    url: descriptor.url,
                }),
            };
        }

        let item = self.store.enqueue(descriptor).await?;
        info!(id = %item.id, method = %item.method, url = %item.url, "Offline, request queued");

        Ok(ApiResponse::saved_offline())
    }

    /// Cache lookup where a storage failure counts as a miss.
    async fn cached(&self, descriptor: &RequestDescriptor) -> Option<Value> {
        match self.cache.lookup(descriptor).await {
            Ok(body) => body,
            Err(e) => {
                warn!(url = %descriptor.url, error = %e, "Cache read failed");
                None
            }
        }
    }

    // =========================================================================
    // Convenience Methods
    // =========================================================================

    pub async fn get(&self, url: &str, params: Option<Value>) -> SyncResult<ApiResponse> {
        let mut descriptor = RequestDescriptor::get(url);
        descriptor.params = params;
        self.request(descriptor).await
    }

    pub async fn post(&self, url: &str, data: Value) -> SyncResult<ApiResponse> {
        self.request(RequestDescriptor::new(HttpMethod::Post, url).with_data(data))
            .await
    }

    pub async fn put(&self, url: &str, data: Value) -> SyncResult<ApiResponse> {
        self.request(RequestDescriptor::new(HttpMethod::Put, url).with_data(data))
            .await
    }

    pub async fn patch(&self, url: &str, data: Value) -> SyncResult<ApiResponse> {
        self.request(RequestDescriptor::new(HttpMethod::Patch, url).with_data(data))
            .await
    }

    pub async fn delete(&self, url: &str) -> SyncResult<ApiResponse> {
        self.request(RequestDescriptor::new(HttpMethod::Delete, url))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CachePolicy;
    use crate::connectivity::ManualNetwork;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Mutex;
    use survey_core::NetworkState;
    use survey_db::{KeyValueStore, MemoryStore};

    /// Answers with a fixed result and records every request.
    struct StubHttp {
        respond: Box<dyn Fn(&HttpRequest) -> SyncResult<ApiResponse> + Send + Sync>,
        seen: Mutex<Vec<HttpRequest>>,
    }

    impl StubHttp {
        fn new(
            respond: impl Fn(&HttpRequest) -> SyncResult<ApiResponse> + Send + Sync + 'static,
        ) -> Self {
            StubHttp {
                respond: Box::new(respond),
                seen: Mutex::new(Vec::new()),
            }
        }

        fn seen(&self) -> Vec<HttpRequest> {
            self.seen.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl HttpClient for StubHttp {
        async fn send(&self, request: &HttpRequest) -> SyncResult<ApiResponse> {
            self.seen.lock().unwrap().push(request.clone());
            (self.respond)(request)
        }
    }

    struct Fixture {
        storage: Arc<MemoryStore>,
        network: Arc<ManualNetwork>,
        http: Arc<StubHttp>,
        store: OfflineStore,
        client: OfflineClient,
    }

    fn fixture(http: StubHttp) -> Fixture {
        let storage = Arc::new(MemoryStore::new());
        let network = Arc::new(ManualNetwork::online());
        let http = Arc::new(http);
        let store = OfflineStore::new(storage.clone());
        let monitor = ConnectivityMonitor::new(network.clone(), store.clone());
        let client = OfflineClient::new(
            http.clone(),
            store.clone(),
            monitor,
            ResponseCache::new(storage.clone(), CachePolicy::default()),
            CredentialStore::new(storage.clone()),
        );
        Fixture {
            storage,
            network,
            http,
            store,
            client,
        }
    }

    #[tokio::test]
    async fn test_online_get_populates_cache_then_serves_offline() {
        let f = fixture(StubHttp::new(|_| Ok(ApiResponse::ok(json!({"surveys": [1, 2]})))));

        let live = f.client.get("/surveys", None).await.unwrap();
        assert_eq!(live.body, json!({"surveys": [1, 2]}));

        f.network.set_silently(NetworkState::offline());
        let cached = f.client.get("/surveys", None).await.unwrap();

        assert_eq!(cached, live);
        assert_eq!(f.http.seen().len(), 1);
    }

    #[tokio::test]
    async fn test_offline_get_without_cache_fails() {
        let f = fixture(StubHttp::new(|_| Ok(ApiResponse::ok(json!({})))));
        f.network.set_silently(NetworkState::offline());

        let err = f
            .client
            .get("/surveys", Some(json!({"page": 3})))
            .await
            .unwrap_err();

        assert!(matches!(err, SyncError::NoConnectionNoCache { .. }));
        assert!(f.http.seen().is_empty());
    }

    #[tokio::test]
    async fn test_offline_write_is_queued() {
        let f = fixture(StubHttp::new(|_| Ok(ApiResponse::ok(json!({})))));
        f.network.set_silently(NetworkState::new(true, Some(false)));

        let resp = f
            .client
            .post("/responses", json!({"answers": [1]}))
            .await
            .unwrap();

        assert!(resp.provisional);
        assert_eq!(resp.body["message"], json!("Saved offline"));
        assert!(f.http.seen().is_empty());
        assert!(f.store.is_offline());

        let queue = f.store.queue();
        assert_eq!(queue.len(), 1);
        assert_eq!(queue[0].method, HttpMethod::Post);
        assert_eq!(queue[0].url, "/responses");
        assert_eq!(queue[0].data, Some(json!({"answers": [1]})));
    }

    #[tokio::test]
    async fn test_token_attached_and_cleared_on_401() {
        let f = fixture(StubHttp::new(|_| {
            Err(SyncError::HttpStatus {
                status: 401,
                body: json!({"error": "expired"}),
            })
        }));
        f.storage.set("authToken", "tok-1").await.unwrap();

        let err = f.client.get("/users/profile", None).await.unwrap_err();

        assert!(err.is_unauthorized());
        assert_eq!(f.http.seen()[0].bearer_token.as_deref(), Some("tok-1"));
        assert!(f.storage.get("authToken").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_failed_get_is_not_cached() {
        let f = fixture(StubHttp::new(|_| {
            Err(SyncError::HttpStatus {
                status: 500,
                body: json!({"error": "boom"}),
            })
        }));

        assert!(f.client.get("/surveys", None).await.is_err());
        assert!(f.client.cache().is_empty().await.unwrap());
    }

    #[tokio::test]
    async fn test_network_fallback_is_opt_in() {
        let f = fixture(StubHttp::new(|_| Err(SyncError::Network("reset".into()))));
        let req = RequestDescriptor::get("/surveys");
        f.client.cache().store(&req, &json!(["old"])).await.unwrap();

        let err = f.client.request(req.clone()).await.unwrap_err();
        assert!(err.is_network_error());

        let client = f.client.clone().with_network_fallback(true);
        let resp = client.request(req).await.unwrap();
        assert_eq!(resp.body, json!(["old"]));
    }
}
