//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML, or legacy JSON)
//!     → loader.rs (parse & deserialize, fold legacy fields)
//!     → validation.rs (semantic checks)
//!     → ProxyConfig (validated, immutable)
//!     → host list handed to the registry once at startup
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; there is no hot reload because the
//!   host registry is fixed for the process lifetime
//! - All fields except a host's name and timeout have defaults
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, parse_config, ConfigError, ConfigFormat};
pub use schema::{
    AdminConfig, BreakerConfig, HostConfig, ListenerConfig, ObservabilityConfig, ProxyConfig,
    TimeoutConfig,
};
