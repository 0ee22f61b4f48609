//! Admission decisions for tunnel requests.
//!
//! Hosts that are not in the registry are never intercepted and never touch
//! a breaker. For monitored hosts the breaker's `ready()` decides.

use std::sync::Arc;

use crate::observability::metrics;
use crate::routing::registry::{HostEntry, HostRegistry};

/// Outcome of an admission check.
#[derive(Debug)]
pub enum Admission<'a> {
    /// Monitored host, breaker ready: dial it.
    ///
    /// The caller owes the breaker exactly one outcome.
    Allow(&'a HostEntry),
    /// Monitored host, breaker open: fail fast without dialing.
    Deny,
    /// Unmonitored host.
    PassThrough,
}

/// Gate in front of the tunnel manager.
#[derive(Debug, Clone)]
pub struct AdmissionGate {
    registry: Arc<HostRegistry>,
}

impl AdmissionGate {
    pub fn new(registry: Arc<HostRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Arc<HostRegistry> {
        &self.registry
    }

    /// Whether tunnels to `host` are handled by the breaker path at all.
    pub fn should_intercept(&self, host: &str) -> bool {
        self.registry.contains(host)
    }

    pub fn decide(&self, host: &str) -> Admission<'_> {
        let Some(entry) = self.registry.lookup(host) else {
            return Admission::PassThrough;
        };

        if entry.breaker.ready() {
            Admission::Allow(entry)
        } else {
            tracing::warn!(host = %host, "Circuit breaker is open, rejecting tunnel");
            metrics::record_denied(host);
            Admission::Deny
        }
    }
}
