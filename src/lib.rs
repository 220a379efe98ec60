//! Path-prefix HTTP gateway library.
//!
//! Requests to `/<route>/<rest>` are forwarded to the backend configured
//! for `<route>`, with the route prefix stripped and the backend's static
//! query merged in front of the caller's.

pub mod config;
pub mod http;
pub mod lifecycle;
pub mod net;
pub mod observability;
pub mod routing;

pub use config::{ConfigError, GatewayConfig};
pub use http::GatewayServer;
pub use lifecycle::{LifecycleState, Shutdown};
pub use routing::RouteTable;
