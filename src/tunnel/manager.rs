//! Breaker-gated tunnels.
//!
//! # Flow
//! ```text
//! dial upstream (deadline = host timeout)
//!     ├─ error   → 500 to client, record failure
//!     └─ ok      → 200 to client
//!                  relay client⇄upstream, both directions joined
//!                  race against one deadline (= host timeout)
//!                      ├─ both done → record success
//!                      └─ deadline  → 504 to client, record failure
//! ```
//!
//! The deadline covers the whole tunnel lifetime, not just the handshake: a
//! slow but healthy transfer that outlives it is torn down and counted as a
//! failure.
//!
//! Each admitted attempt records exactly one outcome. On timeout the relay
//! future is dropped, which cancels both directions, and the socket halves
//! are dropped before `run` returns.

use std::time::{Duration, Instant};

use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time;

use crate::http::response::{self, DIAL_FAILED, GATEWAY_TIMEOUT, TUNNEL_ESTABLISHED};
use crate::observability::metrics;
use crate::resilience::circuit_breaker::Breaker;
use crate::resilience::timeouts::dial;

/// Where an admitted tunnel goes.
#[derive(Debug, Clone)]
pub struct TunnelTarget {
    /// `host:port` to dial.
    pub addr: String,
    /// Dial deadline, reused as the relay deadline.
    pub timeout: Duration,
    /// Client bytes received after the CONNECT head.
    pub early_data: Vec<u8>,
}

/// How an admitted tunnel ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TunnelOutcome {
    DialFailed,
    Completed {
        client_to_upstream: u64,
        upstream_to_client: u64,
    },
    TimedOut,
}

impl TunnelOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, TunnelOutcome::Completed { .. })
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TunnelOutcome::DialFailed => "dial_failed",
            TunnelOutcome::Completed { .. } => "success",
            TunnelOutcome::TimedOut => "timeout",
        }
    }
}

/// Runs admitted tunnels and reports their outcome to the host's breaker.
#[derive(Debug, Clone, Copy, Default)]
pub struct TunnelManager;

impl TunnelManager {
    pub fn new() -> Self {
        Self
    }

    /// Dial, relay and report. Consumes and closes the client connection.
    pub async fn run<S>(&self, mut client: S, target: TunnelTarget, breaker: &Breaker) -> TunnelOutcome
    where
        S: AsyncRead + AsyncWrite + Unpin + Send,
    {
        let started = Instant::now();

        let outcome = match dial(&target.addr, target.timeout).await {
            Ok(upstream) => {
                tracing::debug!(addr = %target.addr, "Accepting CONNECT");
                relay(client, upstream, &target).await
            }
            Err(e) => {
                tracing::warn!(error = %e, timed_out = e.is_timeout(), "Error connecting to upstream");
                response::reply_and_close(&mut client, DIAL_FAILED).await;
                TunnelOutcome::DialFailed
            }
        };

        if outcome.is_success() {
            breaker.record_success();
        } else {
            breaker.record_failure();
        }
        metrics::record_tunnel(breaker.host(), outcome.as_str(), started);

        tracing::debug!(outcome = ?outcome, elapsed_ms = started.elapsed().as_millis() as u64, "Tunnel finished");
        outcome
    }
}

async fn relay<S>(client: S, upstream: TcpStream, target: &TunnelTarget) -> TunnelOutcome
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    let (mut client_rd, mut client_wr) = tokio::io::split(client);
    let (mut upstream_rd, mut upstream_wr) = upstream.into_split();

    if let Err(e) = client_wr.write_all(TUNNEL_ESTABLISHED).await {
        // The upstream answered; the client left before it could be told.
        tracing::debug!(error = %e, "Client gone before tunnel was established");
        return TunnelOutcome::Completed {
            client_to_upstream: 0,
            upstream_to_client: 0,
        };
    }

    let finished = {
        let to_upstream = pipe(&mut client_rd, &mut upstream_wr, &target.early_data, "client_to_upstream");
        let to_client = pipe(&mut upstream_rd, &mut client_wr, &[], "upstream_to_client");

        tokio::select! {
            (sent, received) = async { tokio::join!(to_upstream, to_client) } => Some((sent, received)),
            _ = time::sleep(target.timeout) => None,
        }
    };

    match finished {
        Some((client_to_upstream, upstream_to_client)) => TunnelOutcome::Completed {
            client_to_upstream,
            upstream_to_client,
        },
        None => {
            tracing::warn!(
                timeout_ms = target.timeout.as_millis() as u64,
                "Call error, tunnel timed out. Breaker failure recorded"
            );
            response::reply_and_close(&mut client_wr, GATEWAY_TIMEOUT).await;
            TunnelOutcome::TimedOut
        }
    }
}

/// Copy one direction until EOF or error, then half-close the writer.
///
/// Errors end the direction and are logged; they never produce an outcome
/// of their own.
async fn pipe<R, W>(reader: &mut R, writer: &mut W, prefix: &[u8], direction: &'static str) -> u64
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut copied = 0u64;
    let result = async {
        if !prefix.is_empty() {
            writer.write_all(prefix).await?;
            copied += prefix.len() as u64;
        }
        copied += tokio::io::copy(reader, writer).await?;
        writer.shutdown().await
    }
    .await;

    if let Err(e) = result {
        tracing::warn!(direction, error = %e, "Error copying tunnel data");
    }
    copied
}
