//! Proxy server: accept loop and per-connection dispatch.
//!
//! # Responsibilities
//! - Accept client connections until shutdown is signalled
//! - Read the first request head of each connection
//! - Send CONNECT requests for monitored hosts through the admission gate
//! - Hand everything else to the pass-through forwarder
//! - Drain open connections on shutdown, bounded by `timeouts.drain_secs`
//!
//! # Data Flow
//! ```text
//! accept → read head
//!     ├─ CONNECT, monitored host
//!     │     ├─ Allow → TunnelManager (dial, 200, relay, outcome)
//!     │     └─ Deny  → 503, close
//!     └─ otherwise → Passthrough
//! ```

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpStream;
use tokio::sync::broadcast;
use tokio::time;
use tracing::Instrument;

use crate::config::{ProxyConfig, TimeoutConfig};
use crate::http::request::{read_request_head, RequestError};
use crate::http::response::{self, BAD_REQUEST, BREAKER_OPEN};
use crate::net::{ConnectionGuard, ConnectionTracker, Listener, ListenerError};
use crate::routing::{Admission, AdmissionGate, HostRegistry};
use crate::tunnel::{Passthrough, TunnelManager, TunnelTarget};

/// State shared by every connection task.
struct ServerState {
    gate: AdmissionGate,
    tunnels: TunnelManager,
    passthrough: Passthrough,
    tracker: ConnectionTracker,
    timeouts: TimeoutConfig,
}

/// The tunneling proxy.
pub struct ProxyServer {
    state: Arc<ServerState>,
}

impl ProxyServer {
    /// Build the host registry and every per-connection component.
    pub fn new(config: &ProxyConfig) -> Self {
        let registry = Arc::new(HostRegistry::build(&config.hosts, &config.breaker));
        if registry.is_empty() {
            tracing::warn!("No hosts configured, every tunnel passes through");
        } else {
            tracing::info!(hosts = registry.len(), "Host registry built");
        }

        let state = ServerState {
            gate: AdmissionGate::new(registry),
            tunnels: TunnelManager::new(),
            passthrough: Passthrough::new(config.timeouts.passthrough_connect()),
            tracker: ConnectionTracker::new(),
            timeouts: config.timeouts.clone(),
        };
        Self {
            state: Arc::new(state),
        }
    }

    /// Shared host registry, for the admin API and tests.
    pub fn registry(&self) -> Arc<HostRegistry> {
        Arc::clone(self.state.gate.registry())
    }

    /// Open connection tracker.
    pub fn tracker(&self) -> ConnectionTracker {
        self.state.tracker.clone()
    }

    /// Accept connections until `shutdown` fires, then drain.
    pub async fn run(
        self,
        listener: Listener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), ListenerError> {
        if let Ok(addr) = listener.local_addr() {
            tracing::info!(address = %addr, "Proxy server starting");
        }

        loop {
            tokio::select! {
                _ = shutdown.recv() => {
                    tracing::info!("Shutdown signal received, no longer accepting connections");
                    break;
                }
                accepted = listener.accept() => {
                    let (stream, peer, permit) = match accepted {
                        Ok(accepted) => accepted,
                        Err(ListenerError::Accept(e)) => {
                            tracing::warn!(error = %e, "Failed to accept connection");
                            continue;
                        }
                        Err(e) => return Err(e),
                    };

                    let guard = self.state.tracker.track();
                    let state = Arc::clone(&self.state);
                    tokio::spawn(async move {
                        let _permit = permit;
                        handle_connection(state, stream, peer, guard).await;
                    });
                }
            }
        }

        drop(listener);
        self.drain().await;
        tracing::info!("Proxy server stopped");
        Ok(())
    }

    async fn drain(&self) {
        let tracker = &self.state.tracker;
        let active = tracker.active_count();
        if active == 0 {
            return;
        }

        let drain = self.state.timeouts.drain();
        tracing::info!(active, drain_secs = drain.as_secs(), "Waiting for open connections");
        if time::timeout(drain, tracker.wait_idle()).await.is_err() {
            tracing::warn!(
                remaining = tracker.active_count(),
                "Drain period elapsed, abandoning open connections"
            );
        }
    }
}

async fn handle_connection(
    state: Arc<ServerState>,
    mut stream: TcpStream,
    peer: SocketAddr,
    guard: ConnectionGuard,
) {
    let span = tracing::info_span!("connection", id = %guard.id(), peer = %peer);

    async move {
        let head = match read_request_head(&mut stream, state.timeouts.header_read()).await {
            Ok(head) => head,
            Err(RequestError::Closed) => {
                tracing::trace!("Client closed before sending a request");
                return;
            }
            Err(e @ (RequestError::Malformed(_) | RequestError::TooLarge)) => {
                tracing::debug!(error = %e, "Rejecting request");
                response::reply_and_close(&mut stream, BAD_REQUEST).await;
                return;
            }
            Err(e) => {
                tracing::debug!(error = %e, "Failed to read request");
                return;
            }
        };

        if head.is_connect() {
            if let Some(destination) = head.destination() {
                match state.gate.decide(&destination.host) {
                    Admission::Allow(entry) => {
                        let target = TunnelTarget {
                            addr: destination.dial_addr(),
                            timeout: entry.timeout,
                            early_data: head.trailing,
                        };
                        let span = tracing::info_span!("tunnel", host = %entry.host);
                        state
                            .tunnels
                            .run(stream, target, &entry.breaker)
                            .instrument(span)
                            .await;
                        return;
                    }
                    Admission::Deny => {
                        response::reply_and_close(&mut stream, BREAKER_OPEN).await;
                        return;
                    }
                    Admission::PassThrough => {}
                }
            }
        }

        state.passthrough.forward(&mut stream, &head).await;
    }
    .instrument(span)
    .await;

    drop(guard);
}
