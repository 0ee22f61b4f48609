//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Breakers, tunnels and the accept loop produce:
//!     → logging.rs (structured log events via `tracing`)
//!     → metrics.rs (counters, gauges, histograms via `metrics`)
//!
//! Consumers:
//!     → stdout (human-readable or JSON lines)
//!     → Prometheus scrape endpoint (optional)
//! ```
//!
//! # Design Decisions
//! - Every tunnel runs in a span carrying its connection id and host
//! - Metric updates are no-ops until a recorder is installed, so library
//!   code and tests never need to set one up

pub mod logging;
pub mod metrics;
