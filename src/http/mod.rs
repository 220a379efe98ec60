//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! Connection (net::connection)
//!     → access_log.rs (start timer, install StatusCapture)
//!     → capture.rs (record the response status)
//!     → cors.rs (cross-origin policy)
//!     → server.rs (route lookup, redirect or 404)
//!     → forwarder.rs (rewrite, forward, relay response)
//!     → response streamed back; access record emitted when it ends
//! ```

pub mod access_log;
pub mod capture;
pub mod cors;
pub mod forwarder;
pub mod headers;
pub mod server;

pub use access_log::{AccessLogRecord, AccessLogSink, MemorySink, Outcome, TracingSink};
pub use capture::StatusCapture;
pub use forwarder::ProxyForwarder;
pub use headers::X_REQUEST_ID;
pub use server::{GatewayServer, ServerError};
