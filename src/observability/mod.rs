//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → tracing events (structured fields)
//!
//! Access log (http::access_log):
//!     → one record per request → AccessLogSink
//!     → default sink re-emits as a tracing event (target "access_log")
//!
//! Consumers:
//!     → logging.rs subscriber (pretty or JSON on stdout)
//! ```

pub mod logging;
