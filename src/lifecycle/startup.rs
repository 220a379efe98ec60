//! Startup orchestration.
//!
//! # Responsibilities
//! - Build the route table from validated configuration
//! - Bind the listener
//! - Hand both to the caller, ready to serve
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal
//! - The route table is complete before the socket is bound
//! - Listeners start last (traffic only when ready)

use thiserror::Error;

use crate::config::{ConfigError, GatewayConfig};
use crate::http::GatewayServer;
use crate::net::{Listener, ListenerError};

/// Error that prevents the gateway from starting.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("listener error: {0}")]
    Listener(#[from] ListenerError),
}

/// Prepare a server and its bound listener.
pub async fn start(config: GatewayConfig) -> Result<(GatewayServer, Listener), StartupError> {
    let server = GatewayServer::from_config(config)?;

    for route in server.routes().routes() {
        tracing::info!(
            prefix = %route.prefix(),
            backend = %route.backend(),
            "Route registered"
        );
    }

    let listener = Listener::bind(&server.config().listener).await?;
    Ok((server, listener))
}
