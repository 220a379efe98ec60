//! Forwarding of routed requests to their backend.
//!
//! # Responsibilities
//! - Rewrite the request URI with the route's [`Director`]
//! - Send it over the shared connection pool
//! - Relay status, headers and body back without buffering
//!
//! # Design Decisions
//! - Backend failures before a response exist become 502 Bad Gateway
//! - Failures after headers are sent surface as a body error, which
//!   the connection turns into a truncated response
//! - Dropping the response body releases the backend connection

use std::net::SocketAddr;
use std::time::Duration;

use axum::body::Body;
use axum::extract::{ConnectInfo, Request};
use axum::http::{StatusCode, Version};
use axum::response::{IntoResponse, Response};
use hyper_util::client::legacy::{connect::HttpConnector, Client};
use hyper_util::rt::TokioExecutor;

use crate::config::TimeoutConfig;
use crate::http::headers::{append_forwarded_for, strip_hop_by_hop};
use crate::routing::{Director, Route};

/// Pooled HTTP/1.1 client shared by every forwarder.
pub type HttpClient = Client<HttpConnector, Body>;

/// Create the backend client.
pub fn build_client(config: &TimeoutConfig) -> HttpClient {
    let mut connector = HttpConnector::new();
    connector.set_connect_timeout(Some(Duration::from_secs(config.connect_secs)));
    Client::builder(TokioExecutor::new()).build(connector)
}

/// Forwards requests for one route.
#[derive(Debug, Clone)]
pub struct ProxyForwarder {
    route: String,
    director: Director,
    client: HttpClient,
}

impl ProxyForwarder {
    pub fn new(route: &Route, client: HttpClient) -> Self {
        Self {
            route: route.name().to_string(),
            director: route.director().clone(),
            client,
        }
    }

    /// Name of the route served by this forwarder.
    pub fn route(&self) -> &str {
        &self.route
    }

    /// Forward `request` and return the backend's response.
    ///
    /// Always produces a response; backend errors become `502 Bad Gateway`.
    pub async fn forward(&self, request: Request) -> Response {
        let (mut parts, body) = request.into_parts();

        let uri = match self.director.rewrite(&parts.uri) {
            Ok(uri) => uri,
            Err(error) => {
                tracing::warn!(
                    route = %self.route,
                    uri = %parts.uri,
                    error = %error,
                    "Could not build backend URI"
                );
                return StatusCode::BAD_GATEWAY.into_response();
            }
        };

        let client_addr = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip());

        tracing::debug!(
            route = %self.route,
            method = %parts.method,
            from = %parts.uri,
            to = %uri,
            "Forwarding request"
        );

        parts.uri = uri;
        parts.version = Version::HTTP_11;
        parts.extensions.clear();
        strip_hop_by_hop(&mut parts.headers);
        if let Some(ip) = client_addr {
            append_forwarded_for(&mut parts.headers, ip);
        }

        match self.client.request(Request::from_parts(parts, body)).await {
            Ok(response) => {
                let (mut parts, body) = response.into_parts();
                strip_hop_by_hop(&mut parts.headers);
                Response::from_parts(parts, Body::new(body))
            }
            Err(error) => {
                tracing::warn!(
                    route = %self.route,
                    backend = %self.director.authority(),
                    error = %error,
                    "Backend request failed"
                );
                StatusCode::BAD_GATEWAY.into_response()
            }
        }
    }
}
