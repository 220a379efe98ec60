//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Route compilation (at startup):
//!     name → backend URL mapping
//!     → table.rs (validate, build Route + Director per entry)
//!     → router.rs (order by prefix length, freeze)
//!
//! Incoming request (path, query)
//!     → normalize.rs (clean path, redirect if changed)
//!     → router.rs (longest `<prefix>/` match)
//!     → director.rs (rewrite URI for the backend)
//! ```
//!
//! # Design Decisions
//! - Routes compiled at startup, immutable at runtime
//! - No regex in hot path (prefix matching only)
//! - Deterministic: same input always matches same route

pub mod director;
pub mod normalize;
pub mod router;
pub mod table;

pub use director::{merge_query, Director};
pub use router::{Resolution, Router};
pub use table::{Route, RouteTable};
