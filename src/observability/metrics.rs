//! Metrics collection and exposition.
//!
//! # Metrics
//! - `breaker_proxy_tunnels_total` (counter): tunnel outcomes by host, outcome
//! - `breaker_proxy_tunnel_duration_seconds` (histogram): dial to teardown
//! - `breaker_proxy_denied_total` (counter): fast-fail denials by host
//! - `breaker_proxy_breaker_state` (gauge): 0=closed, 1=half-open, 2=open
//! - `breaker_proxy_passthrough_total` (counter): unmonitored traffic by kind
//! - `breaker_proxy_active_connections` (gauge): open client connections

use std::net::SocketAddr;
use std::time::Instant;

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

use crate::resilience::circuit_breaker::BreakerStatus;

/// Install the Prometheus recorder and its scrape endpoint.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Metrics endpoint listening");
    Ok(())
}

pub fn record_tunnel(host: &str, outcome: &'static str, started: Instant) {
    counter!(
        "breaker_proxy_tunnels_total",
        "host" => host.to_string(),
        "outcome" => outcome
    )
    .increment(1);
    histogram!("breaker_proxy_tunnel_duration_seconds", "host" => host.to_string())
        .record(started.elapsed().as_secs_f64());
}

pub fn record_denied(host: &str) {
    counter!("breaker_proxy_denied_total", "host" => host.to_string()).increment(1);
}

pub fn record_breaker_state(host: &str, status: BreakerStatus) {
    let value = match status {
        BreakerStatus::Closed => 0.0,
        BreakerStatus::HalfOpen => 1.0,
        BreakerStatus::Open => 2.0,
    };
    gauge!("breaker_proxy_breaker_state", "host" => host.to_string()).set(value);
}

pub fn record_passthrough(kind: &'static str) {
    counter!("breaker_proxy_passthrough_total", "kind" => kind).increment(1);
}

pub fn set_active_connections(count: u64) {
    gauge!("breaker_proxy_active_connections").set(count as f64);
}
