//! Path-prefix HTTP gateway.
//!
//! # Architecture Overview
//!
//! ```text
//!                       ┌──────────────────────────────────────────────────┐
//!                       │                     GATEWAY                      │
//!   Client Request      │  ┌──────────┐   ┌────────────┐   ┌────────────┐  │
//!   ────────────────────┼─▶│   net    │──▶│ access log │──▶│  routing   │  │
//!                       │  │ listener │   │ + capture  │   │  (prefix)  │  │
//!                       │  └──────────┘   └────────────┘   └─────┬──────┘  │
//!                       │                                        ▼         │
//!   Client Response     │                 ┌────────────┐   ┌────────────┐  │
//!   ◀───────────────────┼─────────────────│  response  │◀──│ forwarder  │◀─┼── Backend
//!                       │                 │  streamed  │   │ + director │  │
//!                       │                 └────────────┘   └────────────┘  │
//!                       │   lifecycle: Starting → Serving → Draining → Stopped
//!                       └──────────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;

use clap::Parser;
use path_gateway::config::load_config;
use path_gateway::lifecycle::{signals, startup, Shutdown};
use path_gateway::observability::logging;
use path_gateway::RouteTable;

#[derive(Parser)]
#[command(name = "path-gateway")]
#[command(about = "Forward /<route>/... to configured backends", long_about = None)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,

    /// Override `listener.bind_address`.
    #[arg(short, long)]
    bind: Option<String>,

    /// Validate the configuration and exit.
    #[arg(long)]
    check: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut config = load_config(&cli.config)?;
    if let Some(bind) = cli.bind {
        config.listener.bind_address = bind;
    }

    if cli.check {
        let routes = RouteTable::from_config(&config.routes)?;
        println!("configuration OK: {} route(s)", routes.len());
        return Ok(());
    }

    logging::init(&config.observability)?;

    tracing::info!("path-gateway v{} starting", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        config = %cli.config.display(),
        bind_address = %config.listener.bind_address,
        routes = config.routes.len(),
        drain_timeout_secs = config.shutdown.drain_timeout_secs,
        "Configuration loaded"
    );

    let (server, listener) = startup::start(config).await?;

    let shutdown = Shutdown::new();
    let server_shutdown = shutdown.subscribe();
    signals::trigger_on_signal(shutdown);

    server.run(listener, server_shutdown).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
