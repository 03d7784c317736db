//! Shared helpers for integration tests
//!
//! Network access is never needed: the adapter runs against
//! [`MockTransport`], which serves canned replies keyed by request path and
//! records every request it sees.

#![allow(dead_code)]

use async_trait::async_trait;
use reqwest::Url;
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::io::{Read, Write};
use std::net::TcpListener;
use std::path::PathBuf;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex, Once};
use std::time::Duration;

use mangashelf_core::cache::Clock;
use mangashelf_core::provider::comick::client::{request_path, Transport};
use mangashelf_core::provider::comick::ComickProvider;
use mangashelf_core::CatalogError;

pub const API_BASE: &str = "https://api.test";
pub const IMAGE_BASE: &str = "https://img.test/";

static INIT: Once = Once::new();

/// Initialize logging for tests (only once per test run)
pub fn init_test_logging() {
    INIT.call_once(|| {
        use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

        let _ = tracing_subscriber::registry()
            .with(
                tracing_subscriber::fmt::layer()
                    .with_test_writer()
                    .with_target(true),
            )
            .with(tracing_subscriber::filter::EnvFilter::from_default_env())
            .try_init();
    });
}

/// Load a JSON fixture from `tests/fixtures/comick/`
pub fn fixture(name: &str) -> Value {
    let path = PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests/fixtures/comick")
        .join(name);
    let content = std::fs::read_to_string(&path)
        .unwrap_or_else(|e| panic!("missing fixture {}: {}", path.display(), e));
    serde_json::from_str(&content)
        .unwrap_or_else(|e| panic!("invalid fixture {}: {}", path.display(), e))
}

/// Canned reply for one request
#[derive(Debug, Clone)]
pub enum Reply {
    Json(Value),
    /// Success status without a JSON body
    Empty,
    Status(u16),
    /// Connection failure before any response
    Network,
}

/// Transport serving canned replies by path (including the query string).
///
/// Replies queued for a path are consumed in order; the last one repeats.
/// Unknown paths answer 404.
#[derive(Default)]
pub struct MockTransport {
    replies: Mutex<HashMap<String, VecDeque<Reply>>>,
    requests: Mutex<Vec<String>>,
    delay: Option<Duration>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hold every reply for `delay` (tokio time, so paused clocks apply)
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn on(&self, path: &str, reply: Reply) -> &Self {
        self.replies
            .lock()
            .unwrap()
            .entry(path.to_string())
            .or_default()
            .push_back(reply);
        self
    }

    pub fn on_json(&self, path: &str, body: Value) -> &Self {
        self.on(path, Reply::Json(body))
    }

    /// Every requested path, in order
    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }

    pub fn count(&self, path: &str) -> usize {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|p| p.as_str() == path)
            .count()
    }

    fn next_reply(&self, path: &str) -> Option<Reply> {
        let mut replies = self.replies.lock().unwrap();
        let queue = replies.get_mut(path)?;
        if queue.len() > 1 {
            queue.pop_front()
        } else {
            queue.front().cloned()
        }
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn get_json(&self, url: Url) -> mangashelf_core::Result<Option<Value>> {
        let path = request_path(&url);
        self.requests.lock().unwrap().push(path.clone());

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        match self.next_reply(&path) {
            Some(Reply::Json(body)) => Ok(Some(body)),
            Some(Reply::Empty) => Ok(None),
            Some(Reply::Status(status)) => Err(CatalogError::UpstreamStatus { path, status }),
            Some(Reply::Network) => Err(CatalogError::transport(path, "connection refused")),
            None => Err(CatalogError::UpstreamStatus { path, status: 404 }),
        }
    }
}

/// Comick provider wired to a mock transport
pub fn provider(transport: Arc<MockTransport>) -> ComickProvider {
    ComickProvider::new(transport, API_BASE, IMAGE_BASE).expect("test provider")
}

/// Start a one-shot HTTP server whose response announces a longer body than
/// it sends before closing the connection. Returns the server origin.
pub fn serve_truncated_json() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind local listener");
    let addr = listener.local_addr().expect("listener address");
    std::thread::spawn(move || {
        let Ok((mut stream, _)) = listener.accept() else {
            return;
        };
        let mut request = Vec::new();
        let mut buf = [0u8; 1024];
        while !request.windows(4).any(|w| w == b"\r\n\r\n") {
            match stream.read(&mut buf) {
                Ok(0) | Err(_) => break,
                Ok(n) => request.extend_from_slice(&buf[..n]),
            }
        }
        let _ = stream.write_all(
            b"HTTP/1.1 200 OK\r\n\
              Content-Type: application/json\r\n\
              Content-Length: 5000\r\n\
              \r\n\
              {\"result\": [{\"slug\": \"one-piece\",",
        );
        let _ = stream.flush();
    });
    format!("http://{addr}")
}

/// Clock that only moves when told to
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicI64,
}

impl ManualClock {
    pub fn at(millis: i64) -> Arc<Self> {
        Arc::new(Self {
            now: AtomicI64::new(millis),
        })
    }

    pub fn set(&self, millis: i64) {
        self.now.store(millis, Ordering::SeqCst);
    }

    pub fn advance(&self, by: Duration) {
        self.now
            .fetch_add(by.as_millis() as i64, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_millis(&self) -> i64 {
        self.now.load(Ordering::SeqCst)
    }
}
