//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use breaker_proxy::config::{HostConfig, ProxyConfig};
use breaker_proxy::net::Listener;
use breaker_proxy::resilience::{BreakerSnapshot, BreakerStatus};
use breaker_proxy::routing::HostRegistry;
use breaker_proxy::{ProxyServer, Shutdown};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

/// Start an upstream that echoes every connection until the client closes.
pub async fn start_echo_upstream() -> SocketAddr {
    start_programmable_upstream(|_| false).await.0
}

/// Start an upstream that accepts connections and never answers.
pub async fn start_silent_upstream() -> (SocketAddr, Arc<AtomicU32>) {
    start_programmable_upstream(|_| true).await
}

/// Start an upstream that counts accepted connections.
///
/// `hold(n)` is asked for the n-th connection (0-based): `true` keeps it open
/// without answering, `false` echoes.
pub async fn start_programmable_upstream<F>(hold: F) -> (SocketAddr, Arc<AtomicU32>)
where
    F: Fn(u32) -> bool + Send + Sync + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let accepted = Arc::new(AtomicU32::new(0));
    let counter = accepted.clone();

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            let n = counter.fetch_add(1, Ordering::SeqCst);
            let hold = hold(n);
            tokio::spawn(async move {
                if hold {
                    let mut sink = Vec::new();
                    let _ = socket.read_to_end(&mut sink).await;
                } else {
                    let (mut rd, mut wr) = socket.split();
                    let _ = tokio::io::copy(&mut rd, &mut wr).await;
                }
            });
        }
    });

    (addr, accepted)
}

/// Start an upstream that answers one plain HTTP request and closes.
pub async fn start_http_upstream(body: &'static str) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            tokio::spawn(async move {
                let mut buf = [0u8; 1024];
                let _ = socket.read(&mut buf).await;
                let response = format!(
                    "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    body.len(),
                    body
                );
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            });
        }
    });

    addr
}

/// An address nothing listens on.
pub async fn dead_addr() -> SocketAddr {
    TcpListener::bind("127.0.0.1:0").await.unwrap().local_addr().unwrap()
}

pub fn host_config(host: &str, kind: &str, threshold: u64, timeout_ms: u64) -> HostConfig {
    HostConfig {
        host: host.to_string(),
        break_type: kind.to_string(),
        timeout_ms,
        threshold,
        rate: 50.0,
        cooldown_ms: None,
    }
}

pub struct TestProxy {
    pub addr: SocketAddr,
    pub registry: Arc<HostRegistry>,
    pub shutdown: Shutdown,
    pub handle: JoinHandle<()>,
}

impl TestProxy {
    pub fn snapshot(&self, host: &str) -> BreakerSnapshot {
        self.registry.lookup(host).unwrap().breaker.snapshot()
    }

    /// Poll until the host's snapshot satisfies `check`, or panic after 2s.
    pub async fn wait_for<F>(&self, host: &str, check: F) -> BreakerSnapshot
    where
        F: Fn(&BreakerSnapshot) -> bool,
    {
        for _ in 0..200 {
            let snap = self.snapshot(host);
            if check(&snap) {
                return snap;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("breaker for {} never reached expected state: {:?}", host, self.snapshot(host));
    }

    pub async fn wait_for_status(&self, host: &str, status: BreakerStatus) -> BreakerSnapshot {
        self.wait_for(host, |s| s.status == status).await
    }
}

/// Start a proxy on an ephemeral port.
pub async fn start_proxy(config: ProxyConfig) -> TestProxy {
    let inner = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = inner.local_addr().unwrap();
    let listener = Listener::from_listener(inner, config.listener.max_connections);

    let server = ProxyServer::new(&config);
    let registry = server.registry();
    let shutdown = Shutdown::new();
    let rx = shutdown.subscribe();

    let handle = tokio::spawn(async move {
        server.run(listener, rx).await.unwrap();
    });

    TestProxy {
        addr,
        registry,
        shutdown,
        handle,
    }
}

/// Send a CONNECT for `target` and return the stream and the response head.
pub async fn connect_via(proxy: SocketAddr, target: &str) -> (TcpStream, String) {
    let mut stream = TcpStream::connect(proxy).await.unwrap();
    let request = format!("CONNECT {} HTTP/1.1\r\nHost: {}\r\n\r\n", target, target);
    stream.write_all(request.as_bytes()).await.unwrap();
    let head = read_head(&mut stream).await;
    (stream, head)
}

/// Read up to and including the blank line ending a response head.
pub async fn read_head(stream: &mut TcpStream) -> String {
    let mut head = Vec::new();
    let mut byte = [0u8; 1];
    while !head.ends_with(b"\r\n\r\n") {
        match stream.read(&mut byte).await.unwrap() {
            0 => break,
            _ => head.push(byte[0]),
        }
    }
    String::from_utf8(head).unwrap()
}

/// Write `payload` through an established tunnel and expect it echoed back.
pub async fn assert_echo(stream: &mut TcpStream, payload: &[u8]) {
    stream.write_all(payload).await.unwrap();
    let mut echoed = vec![0u8; payload.len()];
    stream.read_exact(&mut echoed).await.unwrap();
    assert_eq!(echoed, payload);
}

/// Half-close and wait for the proxy to close its side.
pub async fn finish(mut stream: TcpStream) {
    stream.shutdown().await.unwrap();
    let mut rest = Vec::new();
    let _ = stream.read_to_end(&mut rest).await;
}
