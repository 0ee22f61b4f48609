//! Fixed status lines written straight to the client socket.
//!
//! Tunnel clients only look at the status line, so no headers are sent.

use std::time::Duration;

use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::time;

/// Upstream dialed; raw bytes follow.
pub const TUNNEL_ESTABLISHED: &[u8] = b"HTTP/1.0 200 OK\r\n\r\n";

/// Breaker open; the upstream was not dialed.
pub const BREAKER_OPEN: &[u8] = b"HTTP/1.1 503 Cannot reach destination\r\n\r\n";

/// Dial to a monitored host failed or timed out.
pub const DIAL_FAILED: &[u8] = b"HTTP/1.1 500 Cannot reach destination\r\n\r\n";

/// Tunnel outlived the host's deadline.
pub const GATEWAY_TIMEOUT: &[u8] = b"HTTP/1.1 504 Gateway Timeout\r\n\r\n";

/// Pass-through upstream unreachable.
pub const BAD_GATEWAY: &[u8] = b"HTTP/1.1 502 Bad Gateway\r\nContent-Length: 0\r\nConnection: close\r\n\r\n";

/// Unparseable request or unknown destination.
pub const BAD_REQUEST: &[u8] = b"HTTP/1.1 400 Bad Request\r\nContent-Length: 0\r\nConnection: close\r\n\r\n";

/// Upper bound on writing a closing status line to a client that may not
/// be reading.
const CLOSING_WRITE_TIMEOUT: Duration = Duration::from_secs(1);

/// Best-effort write of a final status line followed by a write shutdown.
///
/// Errors are logged at debug level; the connection is being torn down
/// either way.
pub async fn reply_and_close<W>(writer: &mut W, status_line: &[u8])
where
    W: AsyncWrite + Unpin,
{
    let write = async {
        writer.write_all(status_line).await?;
        writer.flush().await?;
        writer.shutdown().await
    };
    match time::timeout(CLOSING_WRITE_TIMEOUT, write).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => tracing::debug!(error = %e, "Failed to send closing response"),
        Err(_) => tracing::debug!("Timed out sending closing response"),
    }
}
