//! Load balancing subsystem.
//!
//! # Data Flow
//! ```text
//! Configured origins
//!     → registry.rs (fixed Backend list, ids 0..n-1)
//!
//! Probe cycle finished
//!     → rotation.rs (immutable circular slice of healthy backends)
//!     → round_robin.rs (atomic swap into the selector)
//!
//! Inbound request
//!     → round_robin.rs (claim start from shared cursor)
//!     → rotation.rs (RetryWalk over the snapshot)
//! ```
//!
//! # Design Decisions
//! - Rotation is copy-on-write; the prober never mutates an installed one
//! - Cursor is a separate atomic index, advanced once per request
//! - Retries walk a per-request snapshot and never touch the cursor
//! - Unhealthy backends are absent from the rotation, not filtered per call

pub mod backend;
pub mod registry;
pub mod rotation;
pub mod round_robin;

pub use backend::{Backend, HealthState};
pub use registry::BackendRegistry;
pub use rotation::{HealthyRotation, RetryWalk};
pub use round_robin::{NoHealthyBackends, RotationSelector};
