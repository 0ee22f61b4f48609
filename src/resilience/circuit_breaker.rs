//! Circuit breaker for upstream hosts.
//!
//! # States
//! - Closed: normal operation, tunnels are admitted
//! - Open: host assumed down, tunnels fail fast
//! - Half-Open: a bounded number of trial tunnels probe for recovery
//!
//! # State Transitions
//! ```text
//! Closed → Open: trip policy satisfied (consecutive / threshold / rate)
//! Open → Half-Open: first ready() call after the cool-down
//! Half-Open → Closed: a trial succeeds (all counters reset)
//! Half-Open → Open: a trial fails (cool-down restarts)
//! ```
//!
//! # Design Decisions
//! - One breaker per configured host, shared by every tunnel to it
//! - All state behind a single mutex so each call is atomic
//! - The trip policy is checked after failures only; a success never trips
//! - Outcomes arriving while Open belong to attempts admitted before the
//!   trip and are ignored

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use serde::Serialize;
use tokio::time::Instant;

use crate::observability::metrics;

/// Cool-down before an open breaker admits a trial.
pub const DEFAULT_COOLDOWN: Duration = Duration::from_secs(5);

/// Concurrent trials admitted while half-open.
pub const DEFAULT_HALF_OPEN_TRIALS: u32 = 1;

/// Number of outcomes the rate policy looks at.
pub const DEFAULT_RATE_WINDOW: usize = 100;

/// Threshold used when a host names an unknown breaker kind.
pub const FALLBACK_CONSECUTIVE_THRESHOLD: u64 = 5;

/// The three supported trip strategies, as named in configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BreakerKind {
    Consecutive,
    Threshold,
    Rate,
}

impl BreakerKind {
    /// Map a configuration tag to a kind. Tags are matched exactly.
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "consecutive" => Some(Self::Consecutive),
            "threshold" => Some(Self::Threshold),
            "rate" => Some(Self::Rate),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Consecutive => "consecutive",
            Self::Threshold => "threshold",
            Self::Rate => "rate",
        }
    }
}

/// Trip policy with its parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TripPolicy {
    /// Trip after `threshold` failures with no success in between.
    Consecutive { threshold: u64 },
    /// Trip after `threshold` failures since the last reset.
    Threshold { threshold: u64 },
    /// Trip when the failure fraction over the last `window` outcomes
    /// reaches `rate` (0.0..=1.0). Only evaluated on a full window.
    Rate { rate: f64, window: usize },
}

impl TripPolicy {
    pub fn kind(&self) -> BreakerKind {
        match self {
            Self::Consecutive { .. } => BreakerKind::Consecutive,
            Self::Threshold { .. } => BreakerKind::Threshold,
            Self::Rate { .. } => BreakerKind::Rate,
        }
    }
}

/// Timing parameters shared by every policy.
#[derive(Debug, Clone, Copy)]
pub struct BreakerOptions {
    pub cooldown: Duration,
    pub half_open_max_trials: u32,
}

impl Default for BreakerOptions {
    fn default() -> Self {
        Self {
            cooldown: DEFAULT_COOLDOWN,
            half_open_max_trials: DEFAULT_HALF_OPEN_TRIALS,
        }
    }
}

/// Externally visible breaker status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BreakerStatus {
    Closed,
    Open,
    HalfOpen,
}

/// Point-in-time view of a breaker, for logging and the admin API.
#[derive(Debug, Clone, Serialize)]
pub struct BreakerSnapshot {
    pub host: String,
    pub kind: BreakerKind,
    pub status: BreakerStatus,
    /// Failures counted by the active policy since the last reset.
    pub failures: u64,
    /// Outcomes currently in the rate window (rate policy only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub window_len: Option<usize>,
    /// Number of Closed/Half-Open → Open transitions so far.
    pub trips: u64,
}

#[derive(Debug, Clone, Copy)]
enum Status {
    Closed,
    Open { tripped_at: Instant },
    HalfOpen { trials: u32 },
}

impl Status {
    fn public(&self) -> BreakerStatus {
        match self {
            Status::Closed => BreakerStatus::Closed,
            Status::Open { .. } => BreakerStatus::Open,
            Status::HalfOpen { .. } => BreakerStatus::HalfOpen,
        }
    }
}

#[derive(Debug)]
enum Counters {
    Consecutive { failures: u64 },
    Threshold { failures: u64 },
    Rate { outcomes: VecDeque<bool>, failures: usize },
}

impl Counters {
    fn new(policy: &TripPolicy) -> Self {
        match policy {
            TripPolicy::Consecutive { .. } => Counters::Consecutive { failures: 0 },
            TripPolicy::Threshold { .. } => Counters::Threshold { failures: 0 },
            TripPolicy::Rate { window, .. } => Counters::Rate {
                outcomes: VecDeque::with_capacity(*window),
                failures: 0,
            },
        }
    }

    fn record(&mut self, policy: &TripPolicy, failed: bool) {
        match self {
            Counters::Consecutive { failures } => {
                *failures = if failed { *failures + 1 } else { 0 };
            }
            Counters::Threshold { failures } => {
                if failed {
                    *failures += 1;
                }
            }
            Counters::Rate { outcomes, failures } => {
                let window = match policy {
                    TripPolicy::Rate { window, .. } => *window,
                    _ => return,
                };
                if outcomes.len() == window && outcomes.pop_front() == Some(true) {
                    *failures -= 1;
                }
                outcomes.push_back(failed);
                if failed {
                    *failures += 1;
                }
            }
        }
    }

    fn should_trip(&self, policy: &TripPolicy) -> bool {
        match (self, policy) {
            (Counters::Consecutive { failures }, TripPolicy::Consecutive { threshold })
            | (Counters::Threshold { failures }, TripPolicy::Threshold { threshold }) => {
                *failures >= *threshold
            }
            (Counters::Rate { outcomes, failures }, TripPolicy::Rate { rate, window }) => {
                outcomes.len() == *window && (*failures as f64 / *window as f64) >= *rate
            }
            _ => false,
        }
    }

    fn failures(&self) -> u64 {
        match self {
            Counters::Consecutive { failures } | Counters::Threshold { failures } => *failures,
            Counters::Rate { failures, .. } => *failures as u64,
        }
    }

    fn window_len(&self) -> Option<usize> {
        match self {
            Counters::Rate { outcomes, .. } => Some(outcomes.len()),
            _ => None,
        }
    }
}

#[derive(Debug)]
struct Inner {
    status: Status,
    counters: Counters,
    trips: u64,
}

/// A circuit breaker guarding one upstream host.
#[derive(Debug)]
pub struct Breaker {
    host: String,
    policy: TripPolicy,
    options: BreakerOptions,
    inner: Mutex<Inner>,
}

impl Breaker {
    pub fn new(host: impl Into<String>, policy: TripPolicy, options: BreakerOptions) -> Self {
        let options = BreakerOptions {
            half_open_max_trials: options.half_open_max_trials.max(1),
            ..options
        };
        Self {
            host: host.into(),
            inner: Mutex::new(Inner {
                status: Status::Closed,
                counters: Counters::new(&policy),
                trips: 0,
            }),
            policy,
            options,
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn policy(&self) -> &TripPolicy {
        &self.policy
    }

    /// Whether a new attempt may proceed.
    ///
    /// A `true` while half-open consumes one trial slot; the caller must
    /// report the attempt's outcome.
    pub fn ready(&self) -> bool {
        let mut inner = self.lock();
        match inner.status {
            Status::Closed => true,
            Status::Open { tripped_at } => {
                if tripped_at.elapsed() >= self.options.cooldown {
                    self.transition(&mut inner, Status::HalfOpen { trials: 1 });
                    true
                } else {
                    false
                }
            }
            Status::HalfOpen { trials } => {
                if trials < self.options.half_open_max_trials {
                    inner.status = Status::HalfOpen { trials: trials + 1 };
                    true
                } else {
                    false
                }
            }
        }
    }

    /// Report a successful attempt.
    pub fn record_success(&self) {
        let mut inner = self.lock();
        match inner.status {
            Status::Closed => self.record_closed(&mut inner, false),
            Status::HalfOpen { .. } => {
                inner.counters = Counters::new(&self.policy);
                self.transition(&mut inner, Status::Closed);
            }
            Status::Open { .. } => {}
        }
    }

    /// Report a failed attempt.
    pub fn record_failure(&self) {
        let mut inner = self.lock();
        match inner.status {
            Status::Closed => self.record_closed(&mut inner, true),
            Status::HalfOpen { .. } => self.trip(&mut inner),
            Status::Open { .. } => {}
        }
    }

    /// Current status without side effects.
    ///
    /// An open breaker whose cool-down has elapsed still reports `Open`
    /// until the next `ready()` call moves it to half-open.
    pub fn status(&self) -> BreakerStatus {
        self.lock().status.public()
    }

    pub fn snapshot(&self) -> BreakerSnapshot {
        let inner = self.lock();
        BreakerSnapshot {
            host: self.host.clone(),
            kind: self.policy.kind(),
            status: inner.status.public(),
            failures: inner.counters.failures(),
            window_len: inner.counters.window_len(),
            trips: inner.trips,
        }
    }

    fn record_closed(&self, inner: &mut Inner, failed: bool) {
        inner.counters.record(&self.policy, failed);
        // Only a failure can trip the breaker.
        if failed && inner.counters.should_trip(&self.policy) {
            self.trip(inner);
        }
    }

    fn trip(&self, inner: &mut Inner) {
        inner.counters = Counters::new(&self.policy);
        inner.trips += 1;
        self.transition(
            inner,
            Status::Open {
                tripped_at: Instant::now(),
            },
        );
    }

    fn transition(&self, inner: &mut Inner, to: Status) {
        let from = inner.status.public();
        inner.status = to;
        let to = to.public();

        match to {
            BreakerStatus::Open => tracing::warn!(
                host = %self.host,
                kind = self.policy.kind().as_str(),
                from = ?from,
                cooldown_ms = self.options.cooldown.as_millis() as u64,
                "Circuit breaker tripped"
            ),
            BreakerStatus::HalfOpen => tracing::info!(
                host = %self.host,
                "Circuit breaker half-open, admitting trial"
            ),
            BreakerStatus::Closed => tracing::info!(
                host = %self.host,
                "Circuit breaker closed"
            ),
        }
        metrics::record_breaker_state(&self.host, to);
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
