//! Route lookup and dispatch.
//!
//! # Responsibilities
//! - Store one handler per route prefix
//! - Look up the handler for a request path
//! - Return matched handler, redirect, or explicit no-match
//!
//! # Design Decisions
//! - Immutable after construction (thread-safe without locks)
//! - Longest prefix checked first; a prefix only matches when followed by `/`
//! - Path segments are compared percent-decoded
//! - O(n) prefix scan (acceptable for typical route counts)
//! - Explicit NotFound rather than silent default

use axum::http::Uri;

use crate::routing::normalize::{clean_path, strip_route_prefix, with_query};
use crate::routing::table::{Route, RouteTable};

/// Result of resolving a request URI.
#[derive(Debug, PartialEq, Eq)]
pub enum Resolution<'a, T> {
    /// The path is under a route prefix.
    Matched(&'a T),
    /// The path must be normalized first; the value is the new location.
    Redirect(String),
    /// No route prefix covers the path.
    NotFound,
}

/// Prefix router holding a `T` per route (e.g. a forwarder).
#[derive(Debug)]
pub struct Router<T> {
    entries: Vec<(String, T)>,
}

impl<T> Router<T> {
    /// Build one entry per route in the table.
    pub fn from_table(table: &RouteTable, mut build: impl FnMut(&Route) -> T) -> Self {
        let mut entries: Vec<(String, T)> = table
            .routes()
            .iter()
            .map(|route| (route.prefix().to_string(), build(route)))
            .collect();

        // Longest prefix first so the most specific route wins.
        entries.sort_by(|(a, _), (b, _)| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));

        Self { entries }
    }

    /// Resolve a request URI.
    pub fn resolve(&self, uri: &Uri) -> Resolution<'_, T> {
        let path = uri.path();

        let cleaned = clean_path(path);
        if cleaned != path {
            return Resolution::Redirect(with_query(&cleaned, uri.query()));
        }

        for (prefix, entry) in &self.entries {
            match strip_route_prefix(path, prefix) {
                Some("") => {
                    return Resolution::Redirect(with_query(&format!("{path}/"), uri.query()));
                }
                Some(_) => return Resolution::Matched(entry),
                None => {}
            }
        }

        Resolution::NotFound
    }

    #[cfg(test)]
    fn match_path(&self, path: &str) -> Option<&T> {
        self.entries.iter().find_map(|(prefix, entry)| {
            strip_route_prefix(path, prefix)
                .filter(|rest| rest.starts_with('/'))
                .map(|_| entry)
        })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
