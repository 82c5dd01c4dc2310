//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, request ID, timeout, tracing)
//!     → request.rs (buffer body, strip hop-by-hop, add X-Forwarded-*)
//!     → dispatcher.rs (failover walk over the healthy rotation)
//!         → transport.rs (one proxy attempt per candidate)
//!         → response.rs (capture attempt into a BufferedResponse)
//!     → commit final BufferedResponse to the client
//! ```

pub mod dispatcher;
pub mod headers;
pub mod request;
pub mod response;
pub mod server;
pub mod transport;

pub use dispatcher::{Dispatched, FailoverDispatcher, Outcome};
pub use request::{ForwardRequest, X_REQUEST_ID};
pub use response::{BufferedResponse, ResponseSink};
pub use server::HttpServer;
pub use transport::{HyperTransport, Transport};
