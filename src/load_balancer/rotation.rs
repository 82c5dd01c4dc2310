//! Healthy rotation and per-request retry walks.
//!
//! A [`HealthyRotation`] is an immutable, non-empty, circular view of the
//! backends that were healthy when a probe cycle finished. It is never mutated
//! after construction; the prober builds a fresh one every cycle and the
//! selector swaps it in whole.
//!
//! A [`RetryWalk`] holds its own `Arc` to the rotation it started on, so a
//! concurrent rebuild cannot change the successor links seen by an in-flight
//! request.

use std::sync::Arc;

use crate::load_balancer::backend::Backend;

/// Circular sequence of healthy backends, in registry order.
#[derive(Debug, Clone)]
pub struct HealthyRotation {
    members: Vec<Arc<Backend>>,
}

impl HealthyRotation {
    /// Build a rotation from the given members.
    ///
    /// Returns `None` for an empty list: an empty rotation is never installed.
    pub fn new(mut members: Vec<Arc<Backend>>) -> Option<Self> {
        if members.is_empty() {
            return None;
        }
        members.sort_by_key(|b| b.id);
        Some(Self { members })
    }

    /// Build a rotation from a registry snapshot and per-backend probe results.
    ///
    /// `healthy[i]` is the result for `backends[i]`.
    pub fn from_snapshot(backends: &[Arc<Backend>], healthy: &[bool]) -> Option<Self> {
        let members = backends
            .iter()
            .zip(healthy)
            .filter(|(_, ok)| **ok)
            .map(|(b, _)| Arc::clone(b))
            .collect();
        Self::new(members)
    }

    /// Number of members. Always at least one.
    pub fn len(&self) -> usize {
        self.members.len()
    }

    /// Member at `index`, wrapping around the circle.
    pub fn get(&self, index: usize) -> &Arc<Backend> {
        &self.members[index % self.members.len()]
    }

    /// Position of a backend id, if it is a member.
    pub fn position(&self, id: usize) -> Option<usize> {
        self.members.binary_search_by_key(&id, |b| b.id).ok()
    }

    /// The member following `of`.
    ///
    /// If `of` is not a member, this is the first member whose id is greater,
    /// wrapping to the first member. For members this is simply the next
    /// element of the circle.
    pub fn successor(&self, of: &Backend) -> &Arc<Backend> {
        self.members
            .iter()
            .find(|b| b.id > of.id)
            .unwrap_or(&self.members[0])
    }

    /// Member ids in rotation order.
    pub fn ids(&self) -> Vec<usize> {
        self.members.iter().map(|b| b.id).collect()
    }

    pub fn members(&self) -> &[Arc<Backend>] {
        &self.members
    }
}

/// Per-request traversal of one rotation snapshot.
#[derive(Debug, Clone)]
pub struct RetryWalk {
    rotation: Arc<HealthyRotation>,
    start: usize,
    offset: usize,
}

impl RetryWalk {
    /// Start a walk at `start` (a position in `rotation`).
    pub fn new(rotation: Arc<HealthyRotation>, start: usize) -> Self {
        let start = start % rotation.len();
        Self {
            rotation,
            start,
            offset: 0,
        }
    }

    /// The candidate currently being attempted.
    pub fn current(&self) -> &Arc<Backend> {
        self.rotation.get(self.start + self.offset)
    }

    /// Id of the backend the walk started on.
    pub fn start_id(&self) -> usize {
        self.rotation.get(self.start).id
    }

    /// Number of candidates handed out so far, the current one included.
    pub fn visited(&self) -> usize {
        self.offset + 1
    }

    /// Move to the next candidate.
    ///
    /// Returns `None` once the walk would come back to its starting backend,
    /// so every member is visited at most once.
    pub fn advance(&mut self) -> Option<&Arc<Backend>> {
        let next = self.offset + 1;
        if next >= self.rotation.len() {
            return None;
        }
        self.offset = next;
        Some(self.current())
    }
}
