//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming TCP connection
//!     → listener.rs (accept, connection limits)
//!     → connection.rs (HTTP/1.1 + HTTP/2, drain handling)
//!     → Hand off to the gateway app
//! ```
//!
//! # Design Decisions
//! - Bounded accept queue prevents resource exhaustion
//! - Each connection runs in its own task so draining can abort stragglers

pub mod connection;
pub mod listener;

pub use listener::{Listener, ListenerError};
