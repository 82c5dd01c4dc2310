//! Round-robin selection over the healthy rotation.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use arc_swap::ArcSwapOption;

use crate::load_balancer::backend::Backend;
use crate::load_balancer::rotation::{HealthyRotation, RetryWalk};

/// No rotation has been installed yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("no healthy backends available")]
pub struct NoHealthyBackends;

/// Round-robin selector.
///
/// Holds the installed rotation behind an atomic pointer and a shared cursor.
/// The prober replaces the rotation wholesale with [`install`](Self::install);
/// readers see either the old or the new rotation, never a mix.
#[derive(Debug, Default)]
pub struct RotationSelector {
    rotation: ArcSwapOption<HealthyRotation>,
    cursor: AtomicUsize,
}

impl RotationSelector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Atomically replace the installed rotation.
    pub fn install(&self, rotation: HealthyRotation) {
        let ids = rotation.ids();
        self.rotation.store(Some(Arc::new(rotation)));
        tracing::debug!(rotation = ?ids, "Healthy rotation installed");
    }

    /// The rotation currently installed, if any.
    pub fn current(&self) -> Option<Arc<HealthyRotation>> {
        self.rotation.load_full()
    }

    /// Return the backend at the cursor and advance the cursor by one.
    pub fn next_start(&self) -> Result<Arc<Backend>, NoHealthyBackends> {
        let rotation = self.current().ok_or(NoHealthyBackends)?;
        let position = self.claim(&rotation);
        Ok(Arc::clone(rotation.get(position)))
    }

    /// The backend following `of` in the currently installed rotation.
    ///
    /// Does not touch the shared cursor. Request dispatch walks its own
    /// [`RetryWalk`] snapshot instead, so a swap mid-walk cannot change its
    /// candidates; this reads whatever rotation is live right now.
    pub fn successor(&self, of: &Backend) -> Result<Arc<Backend>, NoHealthyBackends> {
        let rotation = self.current().ok_or(NoHealthyBackends)?;
        Ok(Arc::clone(rotation.successor(of)))
    }

    /// Claim a starting point and snapshot the rotation for one request.
    pub fn begin_walk(&self) -> Result<RetryWalk, NoHealthyBackends> {
        let rotation = self.current().ok_or(NoHealthyBackends)?;
        let position = self.claim(&rotation);
        Ok(RetryWalk::new(rotation, position))
    }

    /// Read-and-advance the cursor modulo the rotation length.
    fn claim(&self, rotation: &HealthyRotation) -> usize {
        let len = rotation.len();
        // The closure never returns None, so both arms carry the previous value.
        let prev = match self
            .cursor
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |c| Some((c % len + 1) % len))
        {
            Ok(prev) | Err(prev) => prev,
        };
        prev % len
    }
}
