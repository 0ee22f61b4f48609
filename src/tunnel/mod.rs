//! Client tunnels.
//!
//! `manager` runs tunnels to monitored hosts and reports each outcome to the
//! host's breaker. `passthrough` forwards everything else.

pub mod manager;
pub mod passthrough;

pub use manager::{TunnelManager, TunnelOutcome, TunnelTarget};
pub use passthrough::Passthrough;
