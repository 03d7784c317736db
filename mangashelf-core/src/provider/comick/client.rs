//! HTTP transport for the Comick API
//!
//! One GET per call, no retries (the query cache owns retry policy).
//! Every call reports exactly one [`HttpEvent`] to the configured observer,
//! including calls that fail before a response arrives (status 0).

use async_trait::async_trait;
use reqwest::header::ACCEPT;
use reqwest::Url;
use serde_json::Value;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

use crate::config::ShelfConfig;
use crate::error::{CatalogError, Result};

/// Body previews longer than this are truncated in log output
const BODY_PREVIEW_CHARS: usize = 800;

/// Abstraction over the GET executor so the adapter can be driven without
/// a network in tests
#[async_trait]
pub trait Transport: Send + Sync {
    /// Issue one GET and decode the body as JSON.
    ///
    /// `Ok(None)` means the response had no JSON body. Non-success statuses
    /// and network failures are errors tagged with the request path.
    async fn get_json(&self, url: Url) -> Result<Option<Value>>;
}

/// Timing and outcome of a single request
#[derive(Debug, Clone)]
pub struct HttpEvent {
    pub method: &'static str,
    /// Path plus query string, without the origin
    pub path: String,
    /// Response status, or 0 when no response was received
    pub status: u16,
    pub elapsed: Duration,
    pub body_preview: Option<String>,
}

/// Observability hook invoked once per request
pub trait HttpObserver: Send + Sync {
    fn observe(&self, event: &HttpEvent);
}

/// Default observer: one tracing event per request
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl HttpObserver for TracingObserver {
    fn observe(&self, event: &HttpEvent) {
        let elapsed_ms = event.elapsed.as_millis() as u64;
        let body = event.body_preview.as_deref().unwrap_or("");
        if event.status == 0 || event.status >= 400 {
            warn!(
                method = event.method,
                path = %event.path,
                status = event.status,
                elapsed_ms,
                body,
                "HTTP {} {} -> {} ({}ms)",
                event.method,
                event.path,
                event.status,
                elapsed_ms
            );
        } else {
            info!(
                method = event.method,
                path = %event.path,
                status = event.status,
                elapsed_ms,
                body,
                "HTTP {} {} -> {} ({}ms)",
                event.method,
                event.path,
                event.status,
                elapsed_ms
            );
        }
    }
}

/// reqwest-backed transport
pub struct HttpClient {
    client: reqwest::Client,
    observer: Arc<dyn HttpObserver>,
}

impl HttpClient {
    pub fn new(timeout: Duration, user_agent: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(user_agent)
            .timeout(timeout)
            .build()
            .map_err(|e| CatalogError::InvalidRequest(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            observer: Arc::new(TracingObserver),
        })
    }

    pub fn from_config(config: &ShelfConfig) -> Result<Self> {
        Self::new(config.timeout(), &config.user_agent())
    }

    /// Replace the default tracing observer
    pub fn with_observer(mut self, observer: Arc<dyn HttpObserver>) -> Self {
        self.observer = observer;
        self
    }
}

#[async_trait]
impl Transport for HttpClient {
    async fn get_json(&self, url: Url) -> Result<Option<Value>> {
        let path = request_path(&url);
        let started = Instant::now();

        let response = match self
            .client
            .get(url)
            .header(ACCEPT, "application/json")
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                self.observer.observe(&HttpEvent {
                    method: "GET",
                    path: path.clone(),
                    status: 0,
                    elapsed: started.elapsed(),
                    body_preview: Some(e.to_string()),
                });
                return Err(CatalogError::transport(path, e));
            }
        };

        let status = response.status();
        let body = match response.bytes().await {
            Ok(bytes) => decode_body(&bytes),
            // Cut off or timed out after the headers arrived
            Err(e) => {
                self.observer.observe(&HttpEvent {
                    method: "GET",
                    path: path.clone(),
                    status: status.as_u16(),
                    elapsed: started.elapsed(),
                    body_preview: Some(e.to_string()),
                });
                return Err(CatalogError::transport(path, e));
            }
        };

        self.observer.observe(&HttpEvent {
            method: "GET",
            path: path.clone(),
            status: status.as_u16(),
            elapsed: started.elapsed(),
            body_preview: body.as_ref().map(preview),
        });

        if !status.is_success() {
            return Err(CatalogError::UpstreamStatus {
                path,
                status: status.as_u16(),
            });
        }

        Ok(body)
    }
}

/// Decode a response body; empty, non-JSON, and `null` bodies yield `None`
pub fn decode_body(bytes: &[u8]) -> Option<Value> {
    if bytes.iter().all(|b| b.is_ascii_whitespace()) {
        return None;
    }
    serde_json::from_slice::<Value>(bytes)
        .ok()
        .filter(|value| !value.is_null())
}

/// Path and query of a URL, used to tag logs and errors
pub fn request_path(url: &Url) -> String {
    match url.query() {
        Some(query) => format!("{}?{}", url.path(), query),
        None => url.path().to_string(),
    }
}

fn preview(value: &Value) -> String {
    let text = value.to_string();
    if text.chars().count() <= BODY_PREVIEW_CHARS {
        return text;
    }
    let mut truncated: String = text.chars().take(BODY_PREVIEW_CHARS).collect();
    truncated.push('…');
    truncated
}
