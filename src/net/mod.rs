//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Configured bind address
//!     → listener.rs (parse, bind)
//!     → Hand off to HTTP layer (axum::serve)
//! ```
//!
//! # Design Decisions
//! - Bind happens before the first probe, so a taken port fails fast
//! - Bind errors are fatal at startup

pub mod listener;

pub use listener::{bind, ListenerError};
