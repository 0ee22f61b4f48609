//! Configuration validation.
//!
//! Serde handles syntax; this module checks value ranges and addresses.
//! Every problem is reported, not just the first one.

use std::net::SocketAddr;

use thiserror::Error;

use crate::config::schema::{HostConfig, ProxyConfig};
use crate::resilience::circuit_breaker::BreakerKind;

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("{field}: invalid socket address {value:?}")]
    InvalidAddress { field: &'static str, value: String },

    #[error("{field} must be greater than zero")]
    Zero { field: String },

    #[error("hosts[{index}]: host name is empty")]
    EmptyHost { index: usize },

    #[error("hosts[{index}] ({host}): rate {rate} is outside 0-100")]
    RateOutOfRange { index: usize, host: String, rate: f64 },

    #[error("admin.api_key must be set when the admin API is enabled")]
    MissingAdminKey,
}

/// Validate a parsed configuration.
pub fn validate_config(config: &ProxyConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    check_addr(&mut errors, "listener.bind_address", &config.listener.bind_address);
    if config.listener.max_connections == 0 {
        errors.push(ValidationError::Zero {
            field: "listener.max_connections".to_string(),
        });
    }

    if config.breaker.half_open_max_trials == 0 {
        errors.push(ValidationError::Zero {
            field: "breaker.half_open_max_trials".to_string(),
        });
    }
    if config.breaker.rate_window == 0 {
        errors.push(ValidationError::Zero {
            field: "breaker.rate_window".to_string(),
        });
    }

    if config.observability.metrics_enabled {
        check_addr(
            &mut errors,
            "observability.metrics_address",
            &config.observability.metrics_address,
        );
    }

    if config.admin.enabled {
        check_addr(&mut errors, "admin.bind_address", &config.admin.bind_address);
        if config.admin.api_key.is_empty() {
            errors.push(ValidationError::MissingAdminKey);
        }
    }

    for (index, host) in config.hosts.iter().enumerate() {
        check_host(&mut errors, index, host);
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_addr(errors: &mut Vec<ValidationError>, field: &'static str, value: &str) {
    if value.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::InvalidAddress {
            field,
            value: value.to_string(),
        });
    }
}

fn check_host(errors: &mut Vec<ValidationError>, index: usize, host: &HostConfig) {
    if host.host.is_empty() {
        errors.push(ValidationError::EmptyHost { index });
    }
    if host.timeout_ms == 0 {
        errors.push(ValidationError::Zero {
            field: format!("hosts[{}].timeout", index),
        });
    }

    // Unknown kinds fall back to a consecutive breaker at registry build time.
    match BreakerKind::from_tag(&host.break_type) {
        Some(BreakerKind::Consecutive) | Some(BreakerKind::Threshold) if host.threshold == 0 => {
            errors.push(ValidationError::Zero {
                field: format!("hosts[{}].threshold", index),
            });
        }
        Some(BreakerKind::Rate) if !(0.0..=100.0).contains(&host.rate) => {
            errors.push(ValidationError::RateOutOfRange {
                index,
                host: host.host.clone(),
                rate: host.rate,
            });
        }
        _ => {}
    }
}
