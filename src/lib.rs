//! Tunneling HTTP proxy with per-host circuit breakers.

// Core subsystems
pub mod config;
pub mod http;
pub mod net;
pub mod routing;
pub mod tunnel;

// Cross-cutting concerns
pub mod lifecycle;
pub mod observability;
pub mod resilience;

// Management
pub mod admin;

pub use config::schema::ProxyConfig;
pub use http::ProxyServer;
pub use lifecycle::Shutdown;
