//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Admitted tunnel:
//!     → timeouts.rs (dial upstream under the host's deadline)
//!     → circuit_breaker.rs (record success / failure, trip when policy is met)
//! ```
//!
//! # Design Decisions
//! - Every upstream dial has a deadline
//! - No per-request retries; the half-open trial is the only retry mechanism
//! - Breakers are per host, never global

pub mod circuit_breaker;
pub mod timeouts;

pub use circuit_breaker::{
    Breaker, BreakerKind, BreakerOptions, BreakerSnapshot, BreakerStatus, TripPolicy,
};
pub use timeouts::{dial, DialError};
