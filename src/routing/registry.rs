//! Per-host breaker registry.
//!
//! # Responsibilities
//! - Build one breaker per configured host at startup
//! - Resolve a tunnel target's hostname to its entry
//!
//! The map is never modified after `build`; only the breakers inside it
//! change state, so it is shared as a plain `Arc<HostRegistry>`.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use crate::config::{BreakerConfig, HostConfig};
use crate::observability::metrics;
use crate::resilience::circuit_breaker::{
    Breaker, BreakerKind, BreakerStatus, TripPolicy, FALLBACK_CONSECUTIVE_THRESHOLD,
};

/// A monitored host and its breaker.
#[derive(Debug)]
pub struct HostEntry {
    pub host: String,
    /// Dial deadline and tunnel lifetime deadline.
    pub timeout: Duration,
    pub breaker: Arc<Breaker>,
}

/// Immutable map from hostname to breaker.
#[derive(Debug, Default)]
pub struct HostRegistry {
    hosts: HashMap<String, HostEntry>,
}

impl HostRegistry {
    /// Build the registry from configuration.
    ///
    /// A repeated hostname replaces the earlier entry.
    pub fn build(configs: &[HostConfig], defaults: &BreakerConfig) -> Self {
        let mut hosts = HashMap::with_capacity(configs.len());

        for config in configs {
            let policy = trip_policy(config, defaults);
            let breaker = Breaker::new(config.host.clone(), policy, defaults.options_for(config));
            metrics::record_breaker_state(&config.host, BreakerStatus::Closed);

            tracing::info!(
                host = %config.host,
                kind = policy.kind().as_str(),
                timeout_ms = config.timeout_ms,
                "Monitoring host"
            );

            let entry = HostEntry {
                host: config.host.clone(),
                timeout: config.timeout(),
                breaker: Arc::new(breaker),
            };
            if hosts.insert(config.host.clone(), entry).is_some() {
                tracing::warn!(host = %config.host, "Duplicate host in configuration; last entry wins");
            }
        }

        Self { hosts }
    }

    /// Look up a hostname (exact match, no port).
    pub fn lookup(&self, host: &str) -> Option<&HostEntry> {
        self.hosts.get(host)
    }

    pub fn contains(&self, host: &str) -> bool {
        self.hosts.contains_key(host)
    }

    /// All entries, in no particular order.
    pub fn entries(&self) -> impl Iterator<Item = &HostEntry> {
        self.hosts.values()
    }

    pub fn len(&self) -> usize {
        self.hosts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hosts.is_empty()
    }
}

fn trip_policy(config: &HostConfig, defaults: &BreakerConfig) -> TripPolicy {
    match BreakerKind::from_tag(&config.break_type) {
        Some(BreakerKind::Consecutive) => TripPolicy::Consecutive {
            threshold: config.threshold,
        },
        Some(BreakerKind::Threshold) => TripPolicy::Threshold {
            threshold: config.threshold,
        },
        Some(BreakerKind::Rate) => TripPolicy::Rate {
            rate: config.rate / 100.0,
            window: defaults.rate_window,
        },
        None => {
            tracing::warn!(
                host = %config.host,
                break_type = %config.break_type,
                threshold = FALLBACK_CONSECUTIVE_THRESHOLD,
                "Unknown breaker kind, using consecutive breaker"
            );
            TripPolicy::Consecutive {
                threshold: FALLBACK_CONSECUTIVE_THRESHOLD,
            }
        }
    }
}
