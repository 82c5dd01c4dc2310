//! Backend registry.
//!
//! # Responsibilities
//! - Build the fixed backend list from configured origins
//! - Assign sequential ids `0..n-1` in input order
//! - Provide read access for the prober and diagnostics

use std::sync::Arc;

use crate::config::validation::parse_endpoint;
use crate::config::ConfigError;
use crate::load_balancer::backend::Backend;

/// The static list of configured backends.
#[derive(Debug)]
pub struct BackendRegistry {
    backends: Vec<Arc<Backend>>,
}

impl BackendRegistry {
    /// Create the registry from configured endpoint strings.
    ///
    /// Fails on the first endpoint that is not a usable `http` origin.
    pub fn initialize<I, S>(endpoints: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let backends = endpoints
            .into_iter()
            .enumerate()
            .map(|(id, endpoint)| {
                let endpoint = endpoint.as_ref();
                parse_endpoint(endpoint)
                    .map(|url| Arc::new(Backend::new(id, url)))
                    .map_err(|reason| ConfigError::InvalidEndpoint {
                        endpoint: endpoint.to_string(),
                        reason,
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;

        for b in &backends {
            tracing::debug!(id = b.id, endpoint = %b.endpoint, "Backend registered");
        }

        Ok(Self { backends })
    }

    /// Look up a backend by id.
    pub fn get(&self, id: usize) -> Option<&Arc<Backend>> {
        self.backends.get(id)
    }

    /// All backends, in registry order.
    pub fn all(&self) -> &[Arc<Backend>] {
        &self.backends
    }

    pub fn len(&self) -> usize {
        self.backends.len()
    }

    pub fn is_empty(&self) -> bool {
        self.backends.is_empty()
    }
}
