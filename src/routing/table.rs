//! Route table construction.
//!
//! # Responsibilities
//! - Turn the `name → backend URL` mapping into validated routes
//! - Reject malformed backend URLs and colliding names
//! - Freeze the result; nothing mutates it while serving

use std::collections::btree_map::Entry;
use std::collections::BTreeMap;
use std::str::FromStr;

use axum::http::uri::{Authority, Scheme};
use url::Url;

use crate::config::ConfigError;
use crate::routing::director::Director;

/// One forwarding rule: requests under `prefix` go to `backend`.
#[derive(Debug, Clone)]
pub struct Route {
    name: String,
    prefix: String,
    backend: Url,
    director: Director,
}

impl Route {
    /// Validate a configured route.
    pub fn new(name: &str, backend_url: &str) -> Result<Self, ConfigError> {
        let prefix = normalize_route_name(name)
            .ok_or_else(|| ConfigError::InvalidRouteName(name.to_string()))?;

        let invalid = |reason: String| ConfigError::InvalidBackendUrl {
            route: name.to_string(),
            url: backend_url.to_string(),
            reason,
        };

        let backend = Url::parse(backend_url).map_err(|e| invalid(e.to_string()))?;

        if backend.scheme() != "http" {
            return Err(ConfigError::UnsupportedScheme {
                route: name.to_string(),
                scheme: backend.scheme().to_string(),
            });
        }

        let host = backend
            .host_str()
            .filter(|h| !h.is_empty())
            .ok_or_else(|| invalid("missing host".to_string()))?;

        let authority = match backend.port() {
            Some(port) => format!("{host}:{port}"),
            None => host.to_string(),
        };
        let authority = Authority::from_str(&authority).map_err(|e| invalid(e.to_string()))?;

        let director = Director::new(
            prefix.clone(),
            Scheme::HTTP,
            authority,
            backend.path(),
            backend.query().unwrap_or(""),
        );

        Ok(Self {
            name: name.to_string(),
            prefix,
            backend,
            director,
        })
    }

    /// Configured route name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Public path prefix, e.g. `/svc`.
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Parsed backend base URL.
    pub fn backend(&self) -> &Url {
        &self.backend
    }

    pub fn director(&self) -> &Director {
        &self.director
    }
}

/// Immutable set of routes keyed by prefix.
#[derive(Debug, Clone, Default)]
pub struct RouteTable {
    routes: Vec<Route>,
}

impl RouteTable {
    /// Build the table from the configured mapping.
    ///
    /// Fails on the first invalid entry; a partial table is never returned.
    pub fn from_config(routes: &BTreeMap<String, String>) -> Result<Self, ConfigError> {
        let mut by_prefix: BTreeMap<String, Route> = BTreeMap::new();

        for (name, backend_url) in routes {
            let route = Route::new(name, backend_url)?;
            match by_prefix.entry(route.prefix.clone()) {
                Entry::Vacant(slot) => {
                    slot.insert(route);
                }
                Entry::Occupied(existing) => {
                    return Err(ConfigError::DuplicateRoute {
                        first: existing.get().name.clone(),
                        second: route.name,
                        prefix: route.prefix,
                    });
                }
            }
        }

        Ok(Self {
            routes: by_prefix.into_values().collect(),
        })
    }

    /// Routes ordered by prefix.
    pub fn routes(&self) -> &[Route] {
        &self.routes
    }

    pub fn get(&self, prefix: &str) -> Option<&Route> {
        self.routes.iter().find(|r| r.prefix == prefix)
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

/// Map a route name to its public prefix.
///
/// Surrounding slashes are ignored; empty, `.` and `..` segments and
/// characters that cannot appear in a request path are rejected.
fn normalize_route_name(name: &str) -> Option<String> {
    let trimmed = name.trim_matches('/');
    if trimmed.is_empty() {
        return None;
    }

    let valid = trimmed.split('/').all(|segment| {
        !segment.is_empty()
            && segment != "."
            && segment != ".."
            && !segment
                .chars()
                .any(|c| c.is_whitespace() || c.is_control() || c == '?' || c == '#')
    });

    valid.then(|| format!("/{trimmed}"))
}
