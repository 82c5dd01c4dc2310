//! Shared utilities for integration and load testing.
#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU16, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use tokio::net::TcpListener;

use failover_proxy::admin;
use failover_proxy::load_balancer::{BackendRegistry, RotationSelector};
use failover_proxy::{BalancerConfig, HttpServer, Shutdown};

/// A mock origin with a toggleable health endpoint and a programmable
/// status for every other path.
///
/// Proxied responses carry `x-backend: <name>` and a body of `<name>`, or
/// `<name>:<request body>` when the request had one.
#[derive(Clone)]
pub struct MockBackend {
    pub name: &'static str,
    pub addr: SocketAddr,
    healthy: Arc<AtomicBool>,
    status: Arc<AtomicU16>,
    delay_ms: Arc<AtomicU64>,
    hits: Arc<AtomicUsize>,
    last_headers: Arc<Mutex<Option<HeaderMap>>>,
}

impl MockBackend {
    pub async fn start(name: &'static str) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let backend = Self {
            name,
            addr: listener.local_addr().unwrap(),
            healthy: Arc::new(AtomicBool::new(true)),
            status: Arc::new(AtomicU16::new(200)),
            delay_ms: Arc::new(AtomicU64::new(0)),
            hits: Arc::new(AtomicUsize::new(0)),
            last_headers: Arc::new(Mutex::new(None)),
        };

        let app = Router::new()
            .route("/_health", get(health))
            .fallback(serve)
            .with_state(backend.clone());
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        backend
    }

    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn set_healthy(&self, healthy: bool) {
        self.healthy.store(healthy, Ordering::SeqCst);
    }

    pub fn set_status(&self, status: u16) {
        self.status.store(status, Ordering::SeqCst);
    }

    /// Delay every proxied response by `delay`.
    pub fn set_delay(&self, delay: Duration) {
        self.delay_ms.store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    /// Proxied requests served, health probes excluded.
    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }

    pub fn last_header(&self, name: &str) -> Option<String> {
        self.last_headers
            .lock()
            .unwrap()
            .as_ref()
            .and_then(|h| h.get(name))
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    }
}

async fn health(State(backend): State<MockBackend>) -> Json<serde_json::Value> {
    let state = if backend.healthy.load(Ordering::SeqCst) {
        "healthy"
    } else {
        "unhealthy"
    };
    Json(serde_json::json!({ "state": state, "message": backend.name }))
}

async fn serve(State(backend): State<MockBackend>, headers: HeaderMap, body: Bytes) -> Response {
    backend.hits.fetch_add(1, Ordering::SeqCst);
    *backend.last_headers.lock().unwrap() = Some(headers);

    let delay = backend.delay_ms.load(Ordering::SeqCst);
    if delay > 0 {
        tokio::time::sleep(Duration::from_millis(delay)).await;
    }

    let status = StatusCode::from_u16(backend.status.load(Ordering::SeqCst))
        .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let text = if body.is_empty() {
        backend.name.to_string()
    } else {
        format!("{}:{}", backend.name, String::from_utf8_lossy(&body))
    };
    (status, [("x-backend", backend.name)], text).into_response()
}

/// Configuration pointing at the given mocks with short test timeouts.
pub fn test_config(backends: &[&MockBackend]) -> BalancerConfig {
    let mut config = BalancerConfig::default();
    config.listener.bind_address = "127.0.0.1:0".to_string();
    config.backends = backends.iter().map(|b| b.url()).collect();
    config.health_check.interval_secs = 60;
    config.health_check.timeout_secs = 1;
    config.health_check.unhealthy_backoff_ms = 50;
    config.timeouts.connect_secs = 1;
    config.timeouts.backend_secs = 5;
    config.observability.metrics_enabled = false;
    config.admin.api_key = "test-key".to_string();
    config
}

/// A running balancer plus its admin API; shut down on drop.
pub struct TestProxy {
    pub addr: SocketAddr,
    pub admin_addr: SocketAddr,
    pub registry: Arc<BackendRegistry>,
    pub selector: Arc<RotationSelector>,
    pub shutdown: Shutdown,
}

impl TestProxy {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub fn admin_url(&self, path: &str) -> String {
        format!("http://{}{}", self.admin_addr, path)
    }

    pub fn rotation_ids(&self) -> Vec<usize> {
        self.selector.current().map(|r| r.ids()).unwrap_or_default()
    }
}

impl Drop for TestProxy {
    fn drop(&mut self) {
        self.shutdown.trigger();
    }
}

pub async fn start_proxy(config: BalancerConfig) -> TestProxy {
    let server = HttpServer::new(config).unwrap();
    let registry = server.registry();
    let selector = server.selector();
    let shutdown = Shutdown::new();

    let admin_listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let admin_addr = admin_listener.local_addr().unwrap();
    tokio::spawn(admin::serve(
        admin_listener,
        server.admin_state(),
        shutdown.subscribe(),
    ));

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server_shutdown = shutdown.subscribe();
    tokio::spawn(async move {
        let _ = server.run(listener, server_shutdown).await;
    });

    wait_for(Duration::from_secs(5), || selector.current().is_some()).await;

    TestProxy {
        addr,
        admin_addr,
        registry,
        selector,
        shutdown,
    }
}

/// Poll `check` until it holds or `limit` elapses; returns the last result.
pub async fn wait_for(limit: Duration, mut check: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + limit;
    loop {
        if check() {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

/// Client without connection reuse or system proxies.
pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .no_proxy()
        .pool_max_idle_per_host(0)
        .timeout(Duration::from_secs(10))
        .build()
        .unwrap()
}
