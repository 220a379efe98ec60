//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → GatewayConfig (validated, immutable)
//!     → routes handed to routing::RouteTable
//! ```
//!
//! # Design Decisions
//! - Config is loaded once; routes never change while serving
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, parse_config, ConfigError};
pub use schema::{
    CorsConfig, GatewayConfig, ListenerConfig, LogFormat, ObservabilityConfig, ShutdownConfig,
    TimeoutConfig,
};
