//! Metrics collection and exposition.
//!
//! # Metrics
//! - `balancer_requests_total` (counter): inbound requests by method, status, backend
//! - `balancer_request_duration_seconds` (histogram): end-to-end latency
//! - `balancer_backend_attempts_total` (counter): proxy attempts by backend, status
//! - `balancer_retries_total` (counter): failovers to a next candidate
//! - `balancer_exhausted_total` (counter): walks that tried every candidate
//! - `balancer_backend_health` (gauge): 1=healthy, 0=unhealthy
//! - `balancer_rotation_size` (gauge): members of the installed rotation
//! - `balancer_probe_cycles_total` (counter): probe cycles by outcome
//!
//! Without an installed recorder every call here is a no-op.

use std::net::SocketAddr;
use std::time::Instant;

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

/// Install the Prometheus recorder and its scrape endpoint on `addr`.
///
/// Must be called from within a Tokio runtime.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Metrics endpoint listening");
    Ok(())
}

pub fn record_request(method: &str, status: u16, backend: &str, start: Instant) {
    counter!(
        "balancer_requests_total",
        "method" => method.to_string(),
        "status" => status.to_string(),
        "backend" => backend.to_string()
    )
    .increment(1);
    histogram!("balancer_request_duration_seconds").record(start.elapsed().as_secs_f64());
}

pub fn record_attempt(backend: &str, status: u16) {
    counter!(
        "balancer_backend_attempts_total",
        "backend" => backend.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
}

pub fn record_retry() {
    counter!("balancer_retries_total").increment(1);
}

pub fn record_exhausted() {
    counter!("balancer_exhausted_total").increment(1);
}

pub fn record_backend_health(backend: &str, healthy: bool) {
    gauge!("balancer_backend_health", "backend" => backend.to_string())
        .set(if healthy { 1.0 } else { 0.0 });
}

pub fn record_rotation_size(size: usize) {
    gauge!("balancer_rotation_size").set(size as f64);
}

pub fn record_probe_cycle(installed: bool) {
    let outcome = if installed { "installed" } else { "all_unhealthy" };
    counter!("balancer_probe_cycles_total", "outcome" => outcome).increment(1);
}
