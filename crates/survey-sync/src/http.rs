//! # HTTP Client
//!
//! The transport seam. [`HttpClient`] performs one request and reports the
//! outcome in three distinct shapes:
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  2xx                    ──► Ok(ApiResponse { status, body })            │
//! │  non-2xx with a body    ──► Err(SyncError::HttpStatus { status, body }) │
//! │  no response at all     ──► Err(SyncError::Network | Timeout)           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! [`ReqwestClient`] is the production implementation.

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use serde_json::{json, Value};
use std::time::Duration;
use tracing::debug;
use url::Url;

use survey_core::{HttpMethod, RequestDescriptor};

use crate::error::{SyncError, SyncResult};

// =============================================================================
// Request / Response
// =============================================================================

/// A request ready to go on the wire.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpRequest {
    pub descriptor: RequestDescriptor,
    /// Sent as `Authorization: Bearer <token>`.
    pub bearer_token: Option<String>,
}

impl HttpRequest {
    pub fn new(descriptor: RequestDescriptor, bearer_token: Option<String>) -> Self {
        HttpRequest {
            descriptor,
            bearer_token,
        }
    }
}

/// A successful response.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse {
    pub status: u16,
    pub body: Value,
    /// True when the write was only queued locally and the server has not
    /// seen it yet.
    pub provisional: bool,
}

impl ApiResponse {
    /// A 200 with `body`.
    pub fn ok(body: Value) -> Self {
        ApiResponse {
            status: 200,
            body,
            provisional: false,
        }
    }

    /// The answer given to a write that was queued instead of sent.
    pub fn saved_offline() -> Self {
        ApiResponse {
            status: 200,
            body: json!({
                "success": true,
                "message": "Saved offline",
                "_offline": true,
            }),
            provisional: true,
        }
    }
}

/// Performs HTTP requests.
#[async_trait]
pub trait HttpClient: Send + Sync {
    async fn send(&self, request: &HttpRequest) -> SyncResult<ApiResponse>;
}

// =============================================================================
// Reqwest Implementation
// =============================================================================

/// [`HttpClient`] on top of `reqwest`.
///
/// Relative request urls are appended to the base url; absolute `http(s)`
/// urls are used as they are.
#[derive(Debug, Clone)]
pub struct ReqwestClient {
    client: reqwest::Client,
    base_url: Url,
}

impl ReqwestClient {
    pub fn new(base_url: &str, timeout: Duration) -> SyncResult<Self> {
        let base_url = Url::parse(base_url)?;

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .default_headers(headers)
            .build()
            .map_err(|e| SyncError::InvalidConfig(format!("HTTP client: {}", e)))?;

        Ok(ReqwestClient { client, base_url })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Resolves the full url of `descriptor`, query string included.
    pub fn resolve(&self, descriptor: &RequestDescriptor) -> SyncResult<Url> {
        let mut url = if descriptor.url.starts_with("http://")
            || descriptor.url.starts_with("https://")
        {
            Url::parse(&descriptor.url)?
        } else {
            // Url::join would drop the base path (`/v1`) for `/surveys`
            let base = self.base_url.as_str().trim_end_matches('/');
            let path = descriptor.url.trim_start_matches('/');
            Url::parse(&format!("{}/{}", base, path))?
        };

        // an empty object would still leave a trailing `?`
        let params = match &descriptor.params {
            Some(Value::Object(params)) if !params.is_empty() => Some(params),
            _ => None,
        };

        if let Some(params) = params {
            let mut query = url.query_pairs_mut();
            for (key, value) in params {
                match value {
                    Value::Null => {}
                    Value::Array(values) => {
                        for v in values {
                            query.append_pair(key, &query_value(v));
                        }
                    }
                    other => {
                        query.append_pair(key, &query_value(other));
                    }
                }
            }
        }

        Ok(url)
    }
}

fn query_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn reqwest_method(method: HttpMethod) -> reqwest::Method {
    match method {
        HttpMethod::Get => reqwest::Method::GET,
        HttpMethod::Post => reqwest::Method::POST,
        HttpMethod::Put => reqwest::Method::PUT,
        HttpMethod::Patch => reqwest::Method::PATCH,
        HttpMethod::Delete => reqwest::Method::DELETE,
    }
}

/// Parses a response body: JSON when possible, the raw text otherwise,
/// `null` when empty.
fn parse_body(text: &str) -> Value {
    if text.trim().is_empty() {
        return Value::Null;
    }
    serde_json::from_str(text).unwrap_or_else(|_| Value::String(text.to_string()))
}

#[async_trait]
impl HttpClient for ReqwestClient {
    async fn send(&self, request: &HttpRequest) -> SyncResult<ApiResponse> {
        let descriptor = &request.descriptor;
        let url = self.resolve(descriptor)?;

        debug!(method = %descriptor.method, url = %url, "Sending request");

        let mut builder = self
            .client
            .request(reqwest_method(descriptor.method), url);

        if let Some(token) = &request.bearer_token {
            builder = builder.bearer_auth(token);
        }

        if let Some(data) = &descriptor.data {
            builder = builder.json(data);
        }

        let response = builder.send().await?;
        let status = response.status();
        let text = response.text().await?;
        let body = parse_body(&text);

        if status.is_success() {
            Ok(ApiResponse {
                status: status.as_u16(),
                body,
                provisional: false,
            })
        } else {
            Err(SyncError::HttpStatus {
                status: status.as_u16(),
                body,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(base: &str) -> ReqwestClient {
        ReqwestClient::new(base, Duration::from_secs(10)).unwrap()
    }

    #[test]
    fn test_resolve_keeps_base_path() {
        let c = client("https://api.monkeysurvey.com/v1");
        let url = c.resolve(&RequestDescriptor::get("/surveys")).unwrap();
        assert_eq!(url.as_str(), "https://api.monkeysurvey.com/v1/surveys");

        let c = client("https://api.monkeysurvey.com/v1/");
        let url = c.resolve(&RequestDescriptor::get("surveys/42")).unwrap();
        assert_eq!(url.as_str(), "https://api.monkeysurvey.com/v1/surveys/42");
    }

    #[test]
    fn test_resolve_query_params() {
        let c = client("http://localhost:3000/api");
        let req = RequestDescriptor::get("/surveys").with_params(json!({
            "page": 2,
            "status": "active",
            "tag": ["a", "b"],
            "skip": null,
        }));

        let url = c.resolve(&req).unwrap();
        assert_eq!(
            url.as_str(),
            "http://localhost:3000/api/surveys?page=2&status=active&tag=a&tag=b"
        );
    }

    #[test]
    fn test_resolve_absolute_url() {
        let c = client("https://api.monkeysurvey.com/v1");
        let url = c
            .resolve(&RequestDescriptor::get("https://cdn.monkeysurvey.com/x.json"))
            .unwrap();
        assert_eq!(url.host_str(), Some("cdn.monkeysurvey.com"));
    }

    #[test]
    fn test_parse_body() {
        assert_eq!(parse_body(""), Value::Null);
        assert_eq!(parse_body(r#"{"ok":true}"#), json!({"ok": true}));
        assert_eq!(parse_body("Bad Gateway"), json!("Bad Gateway"));
    }

    #[test]
    fn test_saved_offline_response() {
        let resp = ApiResponse::saved_offline();
        assert!(resp.provisional);
        assert_eq!(resp.status, 200);
        assert_eq!(resp.body["_offline"], json!(true));
        assert_eq!(resp.body["message"], json!("Saved offline"));
    }
}
