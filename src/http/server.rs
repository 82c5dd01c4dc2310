//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Build registry, selector, prober and dispatcher from configuration
//! - Create Axum Router with the proxy handler and middleware
//! - Run the initial probe before serving the first request
//! - Spawn the periodic prober and serve until shutdown

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    body::Body,
    extract::State,
    http::{Request, StatusCode},
    response::{IntoResponse, Response},
    routing::any,
    Router,
};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

use crate::admin::AdminState;
use crate::config::{BalancerConfig, ConfigError};
use crate::health::HealthProber;
use crate::http::dispatcher::{FailoverDispatcher, Outcome};
use crate::http::request::{
    propagate_request_id_layer, request_id, set_request_id_layer, ForwardRequest,
};
use crate::http::transport::HyperTransport;
use crate::load_balancer::{BackendRegistry, RotationSelector};
use crate::observability::metrics;

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub dispatcher: Arc<FailoverDispatcher<HyperTransport>>,
    pub max_body_bytes: usize,
}

/// HTTP server for the load balancer.
pub struct HttpServer {
    router: Router,
    config: BalancerConfig,
    registry: Arc<BackendRegistry>,
    selector: Arc<RotationSelector>,
    prober: Arc<HealthProber>,
}

impl HttpServer {
    /// Create a new HTTP server with the given configuration.
    ///
    /// Fails if any configured backend is not a valid origin URL.
    pub fn new(config: BalancerConfig) -> Result<Self, ConfigError> {
        let registry = Arc::new(BackendRegistry::initialize(&config.backends)?);
        let selector = Arc::new(RotationSelector::new());
        let prober = Arc::new(HealthProber::new(
            registry.clone(),
            selector.clone(),
            config.health_check.clone(),
        ));

        let transport = HyperTransport::new(
            Duration::from_secs(config.timeouts.connect_secs),
            Duration::from_secs(config.timeouts.backend_secs),
            config.limits.max_response_bytes,
        );
        let state = AppState {
            dispatcher: Arc::new(FailoverDispatcher::new(selector.clone(), transport)),
            max_body_bytes: config.limits.max_body_bytes,
        };

        let router = Self::build_router(&config, state);
        Ok(Self {
            router,
            config,
            registry,
            selector,
            prober,
        })
    }

    /// Build the Axum router with all middleware layers.
    fn build_router(config: &BalancerConfig, state: AppState) -> Router {
        Router::new()
            .route("/{*path}", any(proxy_handler))
            .route("/", any(proxy_handler))
            .with_state(state)
            .layer(TimeoutLayer::with_status_code(
                StatusCode::GATEWAY_TIMEOUT,
                Duration::from_secs(config.timeouts.request_secs),
            ))
            .layer(propagate_request_id_layer())
            .layer(set_request_id_layer())
            .layer(TraceLayer::new_for_http())
    }

    pub fn registry(&self) -> Arc<BackendRegistry> {
        self.registry.clone()
    }

    pub fn selector(&self) -> Arc<RotationSelector> {
        self.selector.clone()
    }

    /// State for the diagnostics API.
    pub fn admin_state(&self) -> AdminState {
        AdminState::new(
            self.registry.clone(),
            self.selector.clone(),
            self.config.admin.api_key.clone(),
        )
    }

    /// Get a reference to the config.
    pub fn config(&self) -> &BalancerConfig {
        &self.config
    }

    /// Probe until a healthy rotation exists, then serve until shutdown.
    pub async fn run(
        self,
        listener: TcpListener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;

        tracing::info!(backends = self.registry.len(), "Running initial health check");
        tokio::select! {
            ids = self.prober.refresh() => {
                tracing::info!(rotation = ?ids, "Initial healthy rotation installed");
            }
            _ = shutdown.recv() => {
                tracing::info!("Shutdown requested before any backend became healthy");
                return Ok(());
            }
        }

        let prober = self.prober.clone();
        let prober_shutdown = shutdown.resubscribe();
        tokio::spawn(async move {
            prober.run(prober_shutdown).await;
        });

        tracing::info!(address = %addr, "HTTP server starting");

        let app = self.router.into_make_service_with_connect_info::<SocketAddr>();
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("Shutdown signal received");
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

/// Main proxy handler.
/// Buffers the request, runs the failover walk and commits its final response.
async fn proxy_handler(State(state): State<AppState>, request: Request<Body>) -> Response {
    let start_time = Instant::now();
    let request_id = request_id(request.headers()).to_string();
    let method = request.method().to_string();

    tracing::debug!(
        request_id = %request_id,
        method = %method,
        path = %request.uri().path(),
        "Proxying request"
    );

    let forward = match ForwardRequest::from_request(request, state.max_body_bytes).await {
        Ok(f) => f,
        Err(e) => {
            tracing::warn!(request_id = %request_id, error = %e, "Rejected request body");
            let status = e.status();
            metrics::record_request(&method, status.as_u16(), "none", start_time);
            return (status, e.to_string()).into_response();
        }
    };

    match state.dispatcher.handle(&forward, &request_id).await {
        Ok(dispatched) => {
            let status = dispatched.response.status();
            metrics::record_request(&method, status.as_u16(), &dispatched.backend, start_time);
            if dispatched.outcome == Outcome::Success && dispatched.attempted.len() > 1 {
                tracing::info!(
                    request_id = %request_id,
                    backend = %dispatched.backend,
                    attempts = dispatched.attempted.len(),
                    "Request succeeded after failover"
                );
            }
            dispatched.response.commit()
        }
        Err(e) => {
            tracing::warn!(request_id = %request_id, error = %e, "No backend to route to");
            metrics::record_request(&method, 503, "none", start_time);
            (StatusCode::SERVICE_UNAVAILABLE, e.to_string()).into_response()
        }
    }
}
