//! Timeout enforcement for upstream dials.
//!
//! # Design Decisions
//! - Uses Tokio's timeout facilities
//! - Timeout errors are distinct from other errors
//! - The caller decides how a failed dial is reported to the client

use std::time::Duration;

use thiserror::Error;
use tokio::net::TcpStream;
use tokio::time;

/// Why an upstream connection could not be established.
#[derive(Debug, Error)]
pub enum DialError {
    #[error("connect to {addr} timed out after {}ms", .timeout.as_millis())]
    TimedOut { addr: String, timeout: Duration },

    #[error("connect to {addr} failed: {source}")]
    Io {
        addr: String,
        #[source]
        source: std::io::Error,
    },
}

impl DialError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, DialError::TimedOut { .. })
    }
}

/// Connect to `addr` (`host:port`), giving up after `timeout`.
///
/// Name resolution counts against the same deadline.
pub async fn dial(addr: &str, timeout: Duration) -> Result<TcpStream, DialError> {
    match time::timeout(timeout, TcpStream::connect(addr)).await {
        Ok(Ok(stream)) => {
            let _ = stream.set_nodelay(true);
            Ok(stream)
        }
        Ok(Err(source)) => Err(DialError::Io {
            addr: addr.to_string(),
            source,
        }),
        Err(_) => Err(DialError::TimedOut {
            addr: addr.to_string(),
            timeout,
        }),
    }
}
