//! Request URI rewriting.
//!
//! A [`Director`] turns the URI of an inbound request into the URI sent to
//! the route's backend:
//!
//! ```text
//! route  /svc → http://backend.local:9000/base?key=abc
//! in     /svc/items?page=2
//! out    http://backend.local:9000/base/items?key=abc&page=2
//! ```

use axum::http::uri::{Authority, Scheme};
use axum::http::Uri;

use crate::routing::normalize::strip_route_prefix;

/// Rewrites inbound URIs to address one backend.
///
/// Holds only immutable data, so rewriting the same URI twice always
/// yields the same result.
#[derive(Debug, Clone)]
pub struct Director {
    prefix: String,
    scheme: Scheme,
    authority: Authority,
    /// Backend path without a trailing slash; empty when the backend has no path.
    base_path: String,
    /// Static query configured on the backend URL, without the `?`.
    target_query: String,
}

impl Director {
    /// Create a director for `prefix` targeting the given backend parts.
    pub fn new(
        prefix: impl Into<String>,
        scheme: Scheme,
        authority: Authority,
        base_path: &str,
        target_query: &str,
    ) -> Self {
        Self {
            prefix: prefix.into(),
            scheme,
            authority,
            base_path: base_path.trim_end_matches('/').to_string(),
            target_query: target_query.to_string(),
        }
    }

    /// The public prefix this director strips.
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Backend host and port.
    pub fn authority(&self) -> &Authority {
        &self.authority
    }

    /// Build the absolute backend URI for an inbound request URI.
    pub fn rewrite(&self, uri: &Uri) -> Result<Uri, axum::http::Error> {
        let path = self.rewrite_path(uri.path());
        let query = merge_query(&self.target_query, uri.query().unwrap_or(""));

        let path_and_query = if query.is_empty() {
            path
        } else {
            format!("{path}?{query}")
        };

        Uri::builder()
            .scheme(self.scheme.clone())
            .authority(self.authority.clone())
            .path_and_query(path_and_query)
            .build()
    }

    /// Strip the route prefix and place the remainder under the backend path.
    pub fn rewrite_path(&self, path: &str) -> String {
        let rest = strip_route_prefix(path, &self.prefix).unwrap_or(path);

        let joined = match (self.base_path.is_empty(), rest.starts_with('/')) {
            (true, _) => rest.to_string(),
            (false, true) => format!("{}{}", self.base_path, rest),
            (false, false) => format!("{}/{}", self.base_path, rest),
        };

        if joined.is_empty() {
            "/".to_string()
        } else {
            joined
        }
    }
}

/// Merge the backend's static query with the inbound one.
///
/// The backend query comes first so that, for a repeated key, the inbound
/// value is the last occurrence.
pub fn merge_query(target: &str, incoming: &str) -> String {
    if target.is_empty() || incoming.is_empty() {
        format!("{target}{incoming}")
    } else {
        format!("{target}&{incoming}")
    }
}
