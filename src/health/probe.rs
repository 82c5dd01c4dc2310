//! A single health probe against one backend.

use std::time::Duration;

use axum::body::Body;
use axum::http::{header, uri::InvalidUri, Method, Request, StatusCode, Uri};
use hyper_util::client::legacy::{connect::HttpConnector, Client};
use tokio::time;

use crate::health::state::HealthStatus;
use crate::load_balancer::Backend;

/// Largest health payload the prober will read.
const MAX_PAYLOAD_BYTES: usize = 64 * 1024;

/// Why a probe could not establish a health status.
#[derive(Debug, thiserror::Error)]
pub enum ProbeError {
    #[error("invalid health check url: {0}")]
    Url(#[from] url::ParseError),

    #[error("invalid health check uri: {0}")]
    Uri(#[from] InvalidUri),

    #[error("failed to build health check request: {0}")]
    Request(#[from] axum::http::Error),

    #[error("connection error: {0}")]
    Connect(#[from] hyper_util::client::legacy::Error),

    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error("non-success status {0}")]
    Status(StatusCode),

    #[error("failed to read body: {0}")]
    Body(#[from] axum::Error),

    #[error("malformed health payload: {0}")]
    Payload(#[from] serde_json::Error),
}

/// Probe `backend` at `path` on its origin and parse the reported status.
pub async fn probe(
    client: &Client<HttpConnector, Body>,
    backend: &Backend,
    path: &str,
    timeout: Duration,
) -> Result<HealthStatus, ProbeError> {
    let url = backend.endpoint.join(path)?;
    let uri: Uri = url.as_str().parse()?;

    let request = Request::builder()
        .method(Method::GET)
        .uri(uri)
        .header(header::USER_AGENT, "failover-proxy-health-check")
        .header(header::ACCEPT, "application/json")
        .body(Body::empty())?;

    let exchange = async {
        let response = client.request(request).await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ProbeError::Status(status));
        }
        let bytes = axum::body::to_bytes(Body::new(response.into_body()), MAX_PAYLOAD_BYTES).await?;
        Ok(serde_json::from_slice::<HealthStatus>(&bytes)?)
    };

    time::timeout(timeout, exchange)
        .await
        .map_err(|_| ProbeError::Timeout(timeout))?
}
