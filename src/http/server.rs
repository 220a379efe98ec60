//! HTTP server setup and lifecycle.
//!
//! # Responsibilities
//! - Build the gateway app: router, CORS, tracing spans, status capture, access log
//! - Dispatch requests to the matching route's forwarder
//! - Accept connections until shutdown is signalled
//! - Drain in-flight requests, bounded by the drain timeout

use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Request, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tower_http::trace::TraceLayer;

use crate::config::{ConfigError, GatewayConfig};
use crate::http::access_log::{AccessLogLayer, AccessLogSink, TracingSink};
use crate::http::capture::StatusCaptureLayer;
use crate::http::cors::cors_layer;
use crate::http::forwarder::{build_client, ProxyForwarder};
use crate::lifecycle::{LifecycleState, ShutdownSignal};
use crate::net::connection::serve_connection;
use crate::net::Listener;
use crate::routing::{Resolution, RouteTable, Router as ProxyRouter};

/// Error type for a running server.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Application state injected into the gateway handler.
#[derive(Clone)]
pub struct GatewayState {
    pub router: Arc<ProxyRouter<ProxyForwarder>>,
}

/// HTTP server for the gateway.
pub struct GatewayServer {
    app: axum::Router,
    config: GatewayConfig,
    routes: Arc<RouteTable>,
    state_tx: watch::Sender<LifecycleState>,
}

impl GatewayServer {
    /// Create a server that logs requests through `tracing`.
    pub fn new(config: GatewayConfig, routes: RouteTable) -> Self {
        Self::with_sink(config, routes, Arc::new(TracingSink))
    }

    /// Create a server that sends access records to `sink`.
    pub fn with_sink(
        config: GatewayConfig,
        routes: RouteTable,
        sink: Arc<dyn AccessLogSink>,
    ) -> Self {
        let routes = Arc::new(routes);
        let app = Self::build_app(&config, &routes, sink);
        let (state_tx, _) = watch::channel(LifecycleState::Starting);

        Self {
            app,
            config,
            routes,
            state_tx,
        }
    }

    /// Build the route table from `config.routes` and create the server.
    pub fn from_config(config: GatewayConfig) -> Result<Self, ConfigError> {
        let routes = RouteTable::from_config(&config.routes)?;
        Ok(Self::new(config, routes))
    }

    /// Build the Axum app with all middleware layers.
    fn build_app(
        config: &GatewayConfig,
        routes: &RouteTable,
        sink: Arc<dyn AccessLogSink>,
    ) -> axum::Router {
        let client = build_client(&config.timeouts);
        let router = ProxyRouter::from_table(routes, |route| {
            ProxyForwarder::new(route, client.clone())
        });

        let state = GatewayState {
            router: Arc::new(router),
        };

        let mut app = axum::Router::new()
            .fallback(gateway_handler)
            .with_state(state);

        if config.cors.enabled {
            app = app.layer(cors_layer(&config.cors));
        }

        app.layer(TraceLayer::new_for_http())
            .layer(StatusCaptureLayer)
            .layer(AccessLogLayer::new(sink))
    }

    /// The fully layered app, usable without a socket.
    pub fn app(&self) -> axum::Router {
        self.app.clone()
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    pub fn routes(&self) -> &RouteTable {
        &self.routes
    }

    /// Observe lifecycle transitions.
    pub fn lifecycle(&self) -> watch::Receiver<LifecycleState> {
        self.state_tx.subscribe()
    }

    /// Run the server, accepting connections on the given listener.
    ///
    /// Returns once `shutdown` fired and every connection finished, or the
    /// drain timeout elapsed and the remaining ones were closed.
    pub async fn run(self, listener: Listener, mut shutdown: ShutdownSignal) -> Result<(), ServerError> {
        let addr = listener.local_addr()?;
        let drain_timeout = Duration::from_secs(self.config.shutdown.drain_timeout_secs);

        self.state_tx.send_replace(LifecycleState::Serving);
        tracing::info!(
            address = %addr,
            routes = self.routes.len(),
            "Gateway serving"
        );

        let (drain_tx, drain_rx) = watch::channel(false);
        let mut connections = JoinSet::new();

        loop {
            tokio::select! {
                accepted = listener.accept() => match accepted {
                    Ok((stream, remote, permit)) => {
                        connections.spawn(serve_connection(
                            stream,
                            remote,
                            self.app.clone(),
                            drain_rx.clone(),
                            permit,
                        ));
                    }
                    Err(error) => {
                        tracing::warn!(error = %error, "Accept failed");
                        tokio::time::sleep(Duration::from_millis(50)).await;
                    }
                },
                Some(_) = connections.join_next(), if !connections.is_empty() => {}
                _ = shutdown.recv() => break,
            }
        }

        // Stop accepting before draining.
        drop(listener);
        self.state_tx.send_replace(LifecycleState::Draining);
        tracing::info!(
            in_flight = connections.len(),
            drain_timeout = ?drain_timeout,
            "Draining connections"
        );
        drain_tx.send_replace(true);

        let drained = tokio::time::timeout(drain_timeout, async {
            while connections.join_next().await.is_some() {}
        })
        .await;

        if drained.is_err() {
            tracing::warn!(
                remaining = connections.len(),
                "Drain timeout elapsed, closing remaining connections"
            );
            connections.shutdown().await;
        }

        self.state_tx.send_replace(LifecycleState::Stopped);
        tracing::info!("Gateway stopped");
        Ok(())
    }
}

/// Resolve the route and forward, redirect, or answer 404.
async fn gateway_handler(State(state): State<GatewayState>, request: Request) -> Response {
    match state.router.resolve(request.uri()) {
        Resolution::Matched(forwarder) => forwarder.forward(request).await,
        Resolution::Redirect(location) => {
            (StatusCode::MOVED_PERMANENTLY, [(header::LOCATION, location)]).into_response()
        }
        Resolution::NotFound => {
            tracing::debug!(path = %request.uri().path(), "No route matched");
            (StatusCode::NOT_FOUND, "404 page not found\n").into_response()
        }
    }
}
