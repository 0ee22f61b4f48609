//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the proxy.
//! All types derive Serde traits for deserialization from config files.
//! Field aliases accept the legacy JSON layout (`Hosts`, `breakType`).

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::resilience::circuit_breaker::{
    BreakerOptions, DEFAULT_COOLDOWN, DEFAULT_HALF_OPEN_TRIALS, DEFAULT_RATE_WINDOW,
};

/// Root configuration for the proxy.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ProxyConfig {
    /// Listener configuration (bind address, connection limit).
    pub listener: ListenerConfig,

    /// Timeouts outside the per-host tunnel deadline.
    pub timeouts: TimeoutConfig,

    /// Breaker defaults applied to every host.
    pub breaker: BreakerConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    /// Admin API settings.
    pub admin: AdminConfig,

    /// Hosts whose tunnels are gated by a circuit breaker.
    #[serde(alias = "Hosts")]
    pub hosts: Vec<HostConfig>,

    /// Legacy listen port; overrides the port of `listener.bind_address`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,

    /// Legacy verbosity flag; forces debug logging.
    pub verbose: bool,
}

impl ProxyConfig {
    /// Fold the legacy top-level fields into the structured sections.
    pub fn normalize(&mut self) {
        if let Some(port) = self.port.take() {
            let host = self
                .listener
                .bind_address
                .rsplit_once(':')
                .map(|(host, _)| host.to_string())
                .unwrap_or_else(|| "0.0.0.0".to_string());
            self.listener.bind_address = format!("{}:{}", host, port);
        }
        if self.verbose {
            self.observability.log_level = "debug".to_string();
        }
    }
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,

    /// Maximum concurrent client connections (backpressure).
    pub max_connections: usize,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            max_connections: 10_000,
        }
    }
}

/// Timeout configuration for the non-tunnel parts of a connection.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Time allowed for a client to send its request head, in milliseconds.
    pub header_read_ms: u64,

    /// Connect timeout for unmonitored pass-through traffic, in milliseconds.
    pub passthrough_connect_ms: u64,

    /// How long shutdown waits for open connections, in seconds.
    pub drain_secs: u64,
}

impl TimeoutConfig {
    pub fn header_read(&self) -> Duration {
        Duration::from_millis(self.header_read_ms)
    }

    pub fn passthrough_connect(&self) -> Duration {
        Duration::from_millis(self.passthrough_connect_ms)
    }

    pub fn drain(&self) -> Duration {
        Duration::from_secs(self.drain_secs)
    }
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            header_read_ms: 5_000,
            passthrough_connect_ms: 10_000,
            drain_secs: 30,
        }
    }
}

/// Breaker defaults.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BreakerConfig {
    /// Time an open breaker waits before admitting a trial, in milliseconds.
    pub cooldown_ms: u64,

    /// Concurrent trial tunnels admitted while half-open.
    pub half_open_max_trials: u32,

    /// Outcomes considered by the rate policy.
    pub rate_window: usize,
}

impl BreakerConfig {
    /// Options for one host, honouring its cool-down override.
    pub fn options_for(&self, host: &HostConfig) -> BreakerOptions {
        BreakerOptions {
            cooldown: Duration::from_millis(host.cooldown_ms.unwrap_or(self.cooldown_ms)),
            half_open_max_trials: self.half_open_max_trials,
        }
    }
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            cooldown_ms: DEFAULT_COOLDOWN.as_millis() as u64,
            half_open_max_trials: DEFAULT_HALF_OPEN_TRIALS,
            rate_window: DEFAULT_RATE_WINDOW,
        }
    }
}

/// A monitored upstream host.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HostConfig {
    /// Hostname matched against the tunnel target, without port.
    pub host: String,

    /// Breaker kind: "consecutive", "threshold" or "rate".
    #[serde(alias = "breakType", default)]
    pub break_type: String,

    /// Dial and tunnel deadline in milliseconds.
    #[serde(alias = "timeout")]
    pub timeout_ms: u64,

    /// Failure count for the consecutive and threshold kinds.
    #[serde(default)]
    pub threshold: u64,

    /// Failure percentage (0-100) for the rate kind.
    #[serde(default)]
    pub rate: f64,

    /// Per-host cool-down override in milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cooldown_ms: Option<u64>,
}

impl HostConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Emit JSON log lines instead of the human-readable format.
    pub json_logs: bool,

    /// Enable the Prometheus endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json_logs: false,
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9090".to_string(),
        }
    }
}

/// Admin API configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AdminConfig {
    /// Enable the admin API.
    pub enabled: bool,

    /// API key for authentication (Bearer token).
    pub api_key: String,

    /// Admin API bind address.
    pub bind_address: String,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            api_key: String::new(),
            bind_address: "127.0.0.1:8081".to_string(),
        }
    }
}
