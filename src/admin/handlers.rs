use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Serialize;

use super::AdminState;
use crate::resilience::{BreakerSnapshot, BreakerStatus};

#[derive(Debug, Serialize)]
pub struct SystemStatus {
    pub version: &'static str,
    pub status: &'static str,
    pub monitored_hosts: usize,
    pub open_breakers: usize,
    pub active_connections: u64,
}

pub async fn get_status(State(state): State<AdminState>) -> Json<SystemStatus> {
    let open_breakers = state
        .registry
        .entries()
        .filter(|e| e.breaker.status() == BreakerStatus::Open)
        .count();

    Json(SystemStatus {
        version: env!("CARGO_PKG_VERSION"),
        status: "operational",
        monitored_hosts: state.registry.len(),
        open_breakers,
        active_connections: state.tracker.active_count(),
    })
}

/// Every breaker, sorted by host.
pub async fn get_breakers(State(state): State<AdminState>) -> Json<Vec<BreakerSnapshot>> {
    let mut snapshots: Vec<_> = state
        .registry
        .entries()
        .map(|e| e.breaker.snapshot())
        .collect();
    snapshots.sort_by(|a, b| a.host.cmp(&b.host));
    Json(snapshots)
}

pub async fn get_breaker(
    State(state): State<AdminState>,
    Path(host): Path<String>,
) -> Result<Json<BreakerSnapshot>, StatusCode> {
    state
        .registry
        .lookup(&host)
        .map(|e| Json(e.breaker.snapshot()))
        .ok_or(StatusCode::NOT_FOUND)
}
