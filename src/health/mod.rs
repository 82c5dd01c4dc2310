//! Health checking subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (synchronous) and periodic timer (active.rs):
//!     → probe.rs (GET <origin>/_health on every backend, concurrently)
//!     → join all probes
//!     → state.rs (parse {state, message}; "healthy" or not)
//!     → set backend flags
//!     → build HealthyRotation → atomic swap into RotationSelector
//!
//! Zero healthy backends:
//!     → keep the installed rotation
//!     → sleep a fixed backoff and probe again
//! ```
//!
//! # Design Decisions
//! - A failed probe is an unhealthy result, never a prober failure
//! - Rotation is built from one joined snapshot, not incrementally
//! - The prober is the only writer of backend health

pub mod active;
pub mod probe;
pub mod state;

pub use active::{CycleOutcome, HealthProber};
pub use probe::ProbeError;
pub use state::HealthStatus;
