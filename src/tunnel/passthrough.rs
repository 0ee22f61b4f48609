//! Forwarding for traffic that no breaker watches.
//!
//! Unmonitored CONNECT requests get a plain tunnel; plain HTTP requests are
//! forwarded byte for byte to the host they name. Neither path records a
//! breaker outcome.

use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};

use crate::http::request::RequestHead;
use crate::http::response::{self, BAD_GATEWAY, BAD_REQUEST, TUNNEL_ESTABLISHED};
use crate::observability::metrics;
use crate::resilience::timeouts::dial;

/// Pass-through forwarder.
#[derive(Debug, Clone)]
pub struct Passthrough {
    connect_timeout: Duration,
}

impl Passthrough {
    pub fn new(connect_timeout: Duration) -> Self {
        Self { connect_timeout }
    }

    /// Forward one client connection whose request head has been read.
    pub async fn forward<S>(&self, client: &mut S, head: &RequestHead)
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let Some(destination) = head.destination() else {
            tracing::debug!(method = %head.method, target = %head.target, "Request has no destination");
            metrics::record_passthrough("bad_request");
            response::reply_and_close(client, BAD_REQUEST).await;
            return;
        };

        let addr = destination.dial_addr();
        let mut upstream = match dial(&addr, self.connect_timeout).await {
            Ok(upstream) => upstream,
            Err(e) => {
                tracing::warn!(error = %e, "Pass-through upstream unreachable");
                metrics::record_passthrough("bad_gateway");
                response::reply_and_close(client, BAD_GATEWAY).await;
                return;
            }
        };

        let kind = if head.is_connect() { "connect" } else { "http" };
        metrics::record_passthrough(kind);

        let preface = async {
            if head.is_connect() {
                client.write_all(TUNNEL_ESTABLISHED).await?;
            } else {
                upstream.write_all(&head.raw).await?;
            }
            upstream.write_all(&head.trailing).await
        };
        if let Err(e) = preface.await {
            tracing::debug!(error = %e, addr = %addr, "Pass-through setup failed");
            return;
        }

        match tokio::io::copy_bidirectional(client, &mut upstream).await {
            Ok((sent, received)) => {
                tracing::debug!(addr = %addr, kind, sent, received, "Pass-through finished")
            }
            Err(e) => tracing::debug!(addr = %addr, kind, error = %e, "Pass-through ended with error"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::request::parse_head;
    use std::net::SocketAddr;
    use tokio::io::AsyncReadExt;
    use tokio::net::TcpListener;

    /// Accepts one connection and returns everything it received.
    async fn spawn_recorder(reply: &'static [u8]) -> (SocketAddr, tokio::task::JoinHandle<Vec<u8>>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            socket.write_all(reply).await.unwrap();
            let mut received = Vec::new();
            let _ = socket.read_to_end(&mut received).await;
            received
        });
        (addr, handle)
    }

    fn head(raw: String) -> RequestHead {
        parse_head(raw.as_bytes()).unwrap().unwrap()
    }

    #[tokio::test]
    async fn plain_request_is_forwarded_verbatim() {
        let (upstream, received) = spawn_recorder(b"HTTP/1.1 204 No Content\r\n\r\n").await;
        let raw = format!("GET http://{}/status HTTP/1.1\r\nHost: {}\r\n\r\nbody", upstream, upstream);
        let head = head(raw.clone());

        let (mut proxy_side, mut client) = tokio::io::duplex(1024);
        let client_task = tokio::spawn(async move {
            let mut reply = [0u8; 27];
            client.read_exact(&mut reply).await.unwrap();
            client.shutdown().await.unwrap();
            reply
        });

        Passthrough::new(Duration::from_secs(1))
            .forward(&mut proxy_side, &head)
            .await;

        assert_eq!(&client_task.await.unwrap(), b"HTTP/1.1 204 No Content\r\n\r\n");
        assert_eq!(received.await.unwrap(), raw.as_bytes());
    }

    #[tokio::test]
    async fn connect_gets_tunnel() {
        let (upstream, received) = spawn_recorder(b"").await;
        let head = head(format!("CONNECT {} HTTP/1.1\r\n\r\n", upstream));

        let (mut proxy_side, mut client) = tokio::io::duplex(1024);
        let client_task = tokio::spawn(async move {
            let mut status = vec![0u8; TUNNEL_ESTABLISHED.len()];
            client.read_exact(&mut status).await.unwrap();
            client.write_all(b"tls bytes").await.unwrap();
            client.shutdown().await.unwrap();
            status
        });

        Passthrough::new(Duration::from_secs(1))
            .forward(&mut proxy_side, &head)
            .await;

        assert_eq!(client_task.await.unwrap(), TUNNEL_ESTABLISHED);
        assert_eq!(received.await.unwrap(), b"tls bytes");
    }

    #[tokio::test]
    async fn unreachable_upstream_is_bad_gateway() {
        let dead = TcpListener::bind("127.0.0.1:0").await.unwrap().local_addr().unwrap();
        let head = head(format!("CONNECT {} HTTP/1.1\r\n\r\n", dead));

        let (mut proxy_side, mut client) = tokio::io::duplex(1024);
        Passthrough::new(Duration::from_secs(1))
            .forward(&mut proxy_side, &head)
            .await;
        drop(proxy_side);

        let mut reply = Vec::new();
        client.read_to_end(&mut reply).await.unwrap();
        assert_eq!(reply, BAD_GATEWAY);
    }

    #[tokio::test]
    async fn missing_destination_is_bad_request() {
        let head = head("GET /only-a-path HTTP/1.1\r\n\r\n".to_string());

        let (mut proxy_side, mut client) = tokio::io::duplex(1024);
        Passthrough::new(Duration::from_secs(1))
            .forward(&mut proxy_side, &head)
            .await;
        drop(proxy_side);

        let mut reply = Vec::new();
        client.read_to_end(&mut reply).await.unwrap();
        assert_eq!(reply, BAD_REQUEST);
    }
}
