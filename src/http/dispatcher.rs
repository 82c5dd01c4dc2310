//! Failover dispatch.
//!
//! # Data Flow
//! ```text
//! ForwardRequest
//!     → RotationSelector::begin_walk (claim start, snapshot rotation)
//!     → loop:
//!         Transport::forward(candidate) → fresh BufferedResponse
//!         200 → stop
//!         otherwise → RetryWalk::advance, stop when back at the start
//!     → last BufferedResponse handed back for commit
//! ```
//!
//! # Design Decisions
//! - Attempts are strictly sequential
//! - Each rotation member is attempted at most once per request
//! - A failed attempt's buffer is dropped, never written to the client
//! - When every candidate fails, the last backend's response is relayed as-is

use std::sync::Arc;

use crate::http::request::ForwardRequest;
use crate::http::response::BufferedResponse;
use crate::http::transport::Transport;
use crate::load_balancer::{NoHealthyBackends, RotationSelector};
use crate::observability::metrics;

/// How a retry walk ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// A backend answered 200.
    Success,
    /// Every candidate was tried once without a 200.
    Exhausted,
}

/// Final result of one request's walk.
#[derive(Debug)]
pub struct Dispatched {
    /// The response to commit to the client.
    pub response: BufferedResponse,
    /// Id of the backend that produced `response`.
    pub backend_id: usize,
    /// `host:port` of that backend.
    pub backend: String,
    /// Backend ids in the order they were attempted.
    pub attempted: Vec<usize>,
    pub outcome: Outcome,
}

/// Per-request failover over the healthy rotation.
pub struct FailoverDispatcher<T> {
    selector: Arc<RotationSelector>,
    transport: T,
}

impl<T: Transport> FailoverDispatcher<T> {
    pub fn new(selector: Arc<RotationSelector>, transport: T) -> Self {
        Self {
            selector,
            transport,
        }
    }

    /// Walk the rotation until a backend returns 200 or every member has
    /// been tried once.
    pub async fn handle(
        &self,
        request: &ForwardRequest,
        request_id: &str,
    ) -> Result<Dispatched, NoHealthyBackends> {
        let mut walk = self.selector.begin_walk()?;
        let start_id = walk.start_id();
        let mut attempted = Vec::new();

        loop {
            let candidate = Arc::clone(walk.current());
            attempted.push(candidate.id);

            let mut buffer = BufferedResponse::new();
            self.transport
                .forward(&candidate.endpoint, request, &mut buffer)
                .await;

            let status = buffer.status();
            let label = candidate.label();
            metrics::record_attempt(&label, status.as_u16());
            tracing::debug!(
                request_id = %request_id,
                attempt = walk.visited(),
                backend = %label,
                status = %status,
                "Backend attempt finished"
            );

            if buffer.is_success() {
                return Ok(Dispatched {
                    response: buffer,
                    backend_id: candidate.id,
                    backend: label,
                    attempted,
                    outcome: Outcome::Success,
                });
            }

            if walk.advance().is_none() {
                tracing::warn!(
                    request_id = %request_id,
                    start = start_id,
                    attempts = attempted.len(),
                    status = %status,
                    "All backends failed, relaying last response"
                );
                metrics::record_exhausted();
                return Ok(Dispatched {
                    response: buffer,
                    backend_id: candidate.id,
                    backend: label,
                    attempted,
                    outcome: Outcome::Exhausted,
                });
            }

            metrics::record_retry();
            tracing::info!(
                request_id = %request_id,
                failed = %label,
                status = %status,
                next = %walk.current().label(),
                "Retrying on next backend"
            );
        }
    }
}
