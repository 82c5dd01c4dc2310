//! Active health checking.
//!
//! # Responsibilities
//! - Probe every backend concurrently, once per cycle
//! - Join all probes before touching shared state
//! - Publish health flags and install a fresh healthy rotation
//! - Keep the previous rotation when a cycle finds nothing healthy

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::body::Body;
use futures_util::future::join_all;
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};
use tokio::sync::broadcast;
use tokio::time::{self, MissedTickBehavior};

use crate::config::HealthCheckConfig;
use crate::health::probe::probe;
use crate::load_balancer::{BackendRegistry, HealthyRotation, RotationSelector};
use crate::observability::metrics;

/// Result of a single probe cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    /// A rotation with these member ids was installed.
    Installed(Vec<usize>),
    /// No backend was healthy; the previous rotation stays in place.
    AllUnhealthy,
}

pub struct HealthProber {
    registry: Arc<BackendRegistry>,
    selector: Arc<RotationSelector>,
    config: HealthCheckConfig,
    client: Client<HttpConnector, Body>,
}

impl HealthProber {
    pub fn new(
        registry: Arc<BackendRegistry>,
        selector: Arc<RotationSelector>,
        config: HealthCheckConfig,
    ) -> Self {
        let mut connector = HttpConnector::new();
        connector.set_connect_timeout(Some(config.timeout()));
        let client = Client::builder(TokioExecutor::new())
            .pool_idle_timeout(Duration::from_secs(30))
            .build(connector);

        Self {
            registry,
            selector,
            config,
            client,
        }
    }

    /// Probe all backends concurrently and return one result per backend,
    /// in registry order. Probe errors count as unhealthy.
    pub async fn probe_all(&self) -> Vec<bool> {
        let timeout = self.config.timeout();
        let probes = self.registry.all().iter().map(|backend| {
            let client = &self.client;
            let path = self.config.path.as_str();
            async move {
                match probe(client, backend, path, timeout).await {
                    Ok(status) => {
                        if !status.is_healthy() {
                            tracing::info!(
                                backend = %backend.label(),
                                state = %status.state,
                                message = %status.message,
                                "Backend reports not healthy"
                            );
                        }
                        status.is_healthy()
                    }
                    Err(e) => {
                        tracing::warn!(backend = %backend.label(), error = %e, "Health probe failed");
                        false
                    }
                }
            }
        });

        join_all(probes).await
    }

    /// Run one full cycle: probe, publish flags, and install a rotation if
    /// anything is healthy.
    pub async fn probe_cycle(&self) -> CycleOutcome {
        let start = Instant::now();
        let results = self.probe_all().await;

        for (backend, healthy) in self.registry.all().iter().zip(&results) {
            if backend.set_healthy(*healthy) {
                tracing::info!(
                    id = backend.id,
                    backend = %backend.label(),
                    healthy = *healthy,
                    "Backend health changed"
                );
            }
            metrics::record_backend_health(&backend.label(), *healthy);
        }

        let outcome = match HealthyRotation::from_snapshot(self.registry.all(), &results) {
            Some(rotation) => {
                let ids = rotation.ids();
                metrics::record_rotation_size(ids.len());
                self.selector.install(rotation);
                CycleOutcome::Installed(ids)
            }
            None => CycleOutcome::AllUnhealthy,
        };

        metrics::record_probe_cycle(matches!(outcome, CycleOutcome::Installed(_)));
        tracing::debug!(
            elapsed_ms = start.elapsed().as_millis() as u64,
            outcome = ?outcome,
            "Probe cycle finished"
        );
        outcome
    }

    /// Repeat probe cycles, with a fixed backoff, until one installs a rotation.
    pub async fn refresh(&self) -> Vec<usize> {
        loop {
            match self.probe_cycle().await {
                CycleOutcome::Installed(ids) => return ids,
                CycleOutcome::AllUnhealthy => {
                    tracing::warn!(
                        backoff_ms = self.config.unhealthy_backoff_ms,
                        stale_rotation = self.selector.current().is_some(),
                        "No healthy backends found, retrying probe cycle"
                    );
                    time::sleep(self.config.unhealthy_backoff()).await;
                }
            }
        }
    }

    /// Refresh on a fixed interval until shutdown.
    ///
    /// The first refresh happens one interval after the call; startup is
    /// expected to have run [`refresh`](Self::refresh) already.
    pub async fn run(self: Arc<Self>, mut shutdown: broadcast::Receiver<()>) {
        tracing::info!(
            interval = self.config.interval_secs,
            path = %self.config.path,
            backends = self.registry.len(),
            "Health prober starting"
        );

        let interval = self.config.interval();
        let mut ticker = time::interval_at(time::Instant::now() + interval, interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    tokio::select! {
                        _ = self.refresh() => {}
                        _ = shutdown.recv() => break,
                    }
                }
                _ = shutdown.recv() => break,
            }
        }
        tracing::info!("Health prober received shutdown signal, exiting loop");
    }
}
