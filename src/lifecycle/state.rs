//! Server lifecycle states.

use std::fmt;

/// Where the server is in its lifecycle.
///
/// Transitions only move forward:
/// `Starting → Serving → Draining → Stopped`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LifecycleState {
    /// Route table and listener are being prepared.
    Starting,
    /// Accepting connections.
    Serving,
    /// No new connections; in-flight requests are finishing.
    Draining,
    /// All connections are closed.
    Stopped,
}

impl LifecycleState {
    pub fn as_str(&self) -> &'static str {
        match self {
            LifecycleState::Starting => "starting",
            LifecycleState::Serving => "serving",
            LifecycleState::Draining => "draining",
            LifecycleState::Stopped => "stopped",
        }
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
