//! Health endpoint payload.
//!
//! Backends answer `GET /_health` with `{"state": "...", "message": "..."}`.
//! Only `state == "healthy"` counts as healthy; anything else, including a
//! missing or malformed payload, is unhealthy.

use serde::{Deserialize, Serialize};

/// The state string a backend reports when it can take traffic.
pub const HEALTHY_STATE: &str = "healthy";

/// Body returned by a backend health endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct HealthStatus {
    pub state: String,
    #[serde(default)]
    pub message: String,
}

impl HealthStatus {
    pub fn healthy(message: impl Into<String>) -> Self {
        Self {
            state: HEALTHY_STATE.to_string(),
            message: message.into(),
        }
    }

    pub fn is_healthy(&self) -> bool {
        self.state == HEALTHY_STATE
    }
}
