//! Startup orchestration.
//!
//! # Responsibilities
//! - Validate configuration
//! - Initialize subsystems in dependency order
//! - Start background tasks (signals, admin API, health prober)
//! - Bind listeners and begin accepting traffic
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal
//! - Listener is bound before the first probe so a taken port is reported
//!   immediately, but nothing is served until a rotation exists

use std::net::SocketAddr;

use metrics_exporter_prometheus::BuildError;

use crate::admin;
use crate::config::validation::validate_config;
use crate::config::{BalancerConfig, ConfigError};
use crate::http::HttpServer;
use crate::lifecycle::{signals, Shutdown};
use crate::net::{self, ListenerError};
use crate::observability::metrics;

/// Fatal errors that stop the process before or while serving.
#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("listener error: {0}")]
    Listener(#[from] ListenerError),

    #[error("metrics exporter error: {0}")]
    Metrics(#[from] BuildError),

    #[error("server error: {0}")]
    Serve(#[source] std::io::Error),
}

/// Run the balancer until a shutdown signal arrives.
pub async fn run(config: BalancerConfig) -> Result<(), StartupError> {
    validate_config(&config).map_err(ConfigError::Validation)?;

    tracing::info!(
        bind_address = %config.listener.bind_address,
        backends = config.backends.len(),
        probe_interval_secs = config.health_check.interval_secs,
        "Configuration loaded"
    );

    let server = HttpServer::new(config.clone())?;

    if config.observability.metrics_enabled {
        // Validated above.
        if let Ok(addr) = config.observability.metrics_address.parse::<SocketAddr>() {
            metrics::init_metrics(addr)?;
        }
    }

    let listener = net::bind(&config.listener.bind_address).await?;
    let shutdown = Shutdown::new();

    if config.admin.enabled {
        let admin_listener = net::bind(&config.admin.bind_address).await?;
        let state = server.admin_state();
        let admin_shutdown = shutdown.subscribe();
        tokio::spawn(async move {
            if let Err(e) = admin::serve(admin_listener, state, admin_shutdown).await {
                tracing::error!(error = %e, "Admin API stopped with error");
            }
        });
    }

    let server_shutdown = shutdown.subscribe();
    let trigger = shutdown.clone();
    tokio::spawn(async move {
        let signal = signals::wait_for_signal().await;
        tracing::info!(signal, "Signal received, shutting down");
        trigger.trigger();
    });

    server
        .run(listener, server_shutdown)
        .await
        .map_err(StartupError::Serve)?;

    // Make sure the prober and admin API stop even if serving ended on its own.
    shutdown.trigger();
    tracing::info!("Shutdown complete");
    Ok(())
}
