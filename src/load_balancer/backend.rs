//! Backend abstraction.
//!
//! # Responsibilities
//! - Represent a single backend server
//! - Keep a stable, dense id assigned by the registry
//! - Track health state (Unknown/Healthy/Unhealthy), written only by the prober

use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};
use url::Url;

/// Health State enum.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthState {
    /// Not probed yet. Treated as unhealthy.
    Unknown = 0,
    Healthy = 1,
    Unhealthy = 2,
}

impl From<u8> for HealthState {
    fn from(val: u8) -> Self {
        match val {
            1 => HealthState::Healthy,
            2 => HealthState::Unhealthy,
            _ => HealthState::Unknown,
        }
    }
}

impl fmt::Display for HealthState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            HealthState::Unknown => "unknown",
            HealthState::Healthy => "healthy",
            HealthState::Unhealthy => "unhealthy",
        };
        f.write_str(s)
    }
}

/// A single backend server.
#[derive(Debug)]
pub struct Backend {
    /// Dense index into the registry.
    pub id: usize,
    /// Origin the backend is reached at. Never changes after construction.
    pub endpoint: Url,
    /// Current health state (0=Unknown, 1=Healthy, 2=Unhealthy).
    state: AtomicU8,
}

impl Backend {
    /// Create a new backend. Backends start out not healthy.
    pub fn new(id: usize, endpoint: Url) -> Self {
        Self {
            id,
            endpoint,
            state: AtomicU8::new(HealthState::Unknown as u8),
        }
    }

    /// Current health state.
    pub fn health(&self) -> HealthState {
        HealthState::from(self.state.load(Ordering::Acquire))
    }

    /// Return true only if the last probe reported the backend healthy.
    pub fn is_healthy(&self) -> bool {
        self.health() == HealthState::Healthy
    }

    /// Record a probe outcome. Returns true if the state changed.
    pub fn set_healthy(&self, healthy: bool) -> bool {
        let next = if healthy {
            HealthState::Healthy
        } else {
            HealthState::Unhealthy
        };
        let prev = self.state.swap(next as u8, Ordering::AcqRel);
        prev != next as u8
    }

    /// `host:port` label used in logs and metrics.
    pub fn label(&self) -> String {
        match (self.endpoint.host_str(), self.endpoint.port_or_known_default()) {
            (Some(host), Some(port)) => format!("{}:{}", host, port),
            _ => self.endpoint.to_string(),
        }
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{} {}", self.id, self.endpoint)
    }
}
