//! Request head reading and parsing.
//!
//! # Responsibilities
//! - Read the first request head from a client, bounded in size and time
//! - Parse it with `httparse`
//! - Locate the destination (`host:port`) of a CONNECT or plain request
//!
//! Bytes the client sent after the head are kept so they can be forwarded.

use std::fmt;
use std::time::Duration;

use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::time;

/// Largest request head accepted.
pub const MAX_HEAD_SIZE: usize = 8192;

const MAX_HEADERS: usize = 64;
const READ_CHUNK: usize = 2048;

/// Why a request head could not be read.
#[derive(Debug, Error)]
pub enum RequestError {
    #[error("connection closed before a complete request head")]
    Closed,

    #[error("request head exceeds {} bytes", MAX_HEAD_SIZE)]
    TooLarge,

    #[error("timed out waiting for request head")]
    TimedOut,

    #[error("malformed request head: {0}")]
    Malformed(#[from] httparse::Error),

    #[error("I/O error reading request head: {0}")]
    Io(#[from] std::io::Error),
}

/// A parsed request head.
#[derive(Debug, Clone)]
pub struct RequestHead {
    pub method: String,
    /// Request target as sent: an authority for CONNECT, a path or
    /// absolute URI otherwise.
    pub target: String,
    pub headers: Vec<(String, String)>,
    /// The head exactly as received, including the blank line.
    pub raw: Vec<u8>,
    /// Bytes received after the head.
    pub trailing: Vec<u8>,
}

impl RequestHead {
    pub fn is_connect(&self) -> bool {
        self.method.eq_ignore_ascii_case("CONNECT")
    }

    /// First header value with the given name (case-insensitive).
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Where this request wants to go.
    ///
    /// CONNECT targets default to port 443; plain requests use the
    /// absolute-form URI or the `Host` header and default to port 80.
    pub fn destination(&self) -> Option<Authority> {
        if self.is_connect() {
            return Authority::parse(&self.target, 443);
        }

        if let Some(rest) = self.target.strip_prefix("http://") {
            let authority = rest.split('/').next().unwrap_or_default();
            let authority = authority.rsplit('@').next().unwrap_or(authority);
            return Authority::parse(authority, 80);
        }

        self.header("host").and_then(|host| Authority::parse(host, 80))
    }
}

/// Host and port of a request destination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Authority {
    /// Host without port or IPv6 brackets.
    pub host: String,
    pub port: u16,
}

impl Authority {
    /// Parse `host`, `host:port`, `[v6]` or `[v6]:port`.
    pub fn parse(input: &str, default_port: u16) -> Option<Self> {
        let input = input.trim();

        let (host, port) = if let Some(rest) = input.strip_prefix('[') {
            let (host, after) = rest.split_once(']')?;
            let port = match after {
                "" => default_port,
                other => other.strip_prefix(':')?.parse().ok()?,
            };
            (host, port)
        } else {
            match input.rsplit_once(':') {
                Some((host, _)) if host.contains(':') => return None,
                Some((host, port)) => (host, port.parse().ok()?),
                None => (input, default_port),
            }
        };

        if host.is_empty() {
            return None;
        }
        Some(Self {
            host: host.to_string(),
            port,
        })
    }

    /// Address suitable for `TcpStream::connect`.
    pub fn dial_addr(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Authority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

/// Read one request head, giving up after `timeout`.
pub async fn read_request_head<R>(reader: &mut R, timeout: Duration) -> Result<RequestHead, RequestError>
where
    R: AsyncRead + Unpin,
{
    time::timeout(timeout, read_head(reader))
        .await
        .map_err(|_| RequestError::TimedOut)?
}

async fn read_head<R>(reader: &mut R) -> Result<RequestHead, RequestError>
where
    R: AsyncRead + Unpin,
{
    let mut buf = Vec::with_capacity(READ_CHUNK);
    let mut chunk = [0u8; READ_CHUNK];

    loop {
        let n = reader.read(&mut chunk).await?;
        if n == 0 {
            return Err(RequestError::Closed);
        }
        buf.extend_from_slice(&chunk[..n]);

        if let Some(head) = parse_head(&buf)? {
            return Ok(head);
        }
        if buf.len() >= MAX_HEAD_SIZE {
            return Err(RequestError::TooLarge);
        }
    }
}

/// Parse a complete head out of `buf`, or `None` if more bytes are needed.
pub fn parse_head(buf: &[u8]) -> Result<Option<RequestHead>, RequestError> {
    let mut headers = [httparse::EMPTY_HEADER; MAX_HEADERS];
    let mut req = httparse::Request::new(&mut headers);

    match req.parse(buf)? {
        httparse::Status::Complete(len) if len > MAX_HEAD_SIZE => Err(RequestError::TooLarge),
        httparse::Status::Complete(len) => Ok(Some(RequestHead {
            method: req.method.unwrap_or_default().to_string(),
            target: req.path.unwrap_or_default().to_string(),
            headers: req
                .headers
                .iter()
                .map(|h| {
                    (
                        h.name.to_string(),
                        String::from_utf8_lossy(h.value).into_owned(),
                    )
                })
                .collect(),
            raw: buf[..len].to_vec(),
            trailing: buf[len..].to_vec(),
        })),
        httparse::Status::Partial => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_connect_head() {
        let head = parse_head(b"CONNECT a.test:8443 HTTP/1.1\r\nHost: a.test:8443\r\n\r\n")
            .unwrap()
            .unwrap();
        assert!(head.is_connect());
        assert_eq!(head.target, "a.test:8443");
        assert_eq!(head.header("HOST"), Some("a.test:8443"));
        assert!(head.trailing.is_empty());
        assert_eq!(
            head.destination(),
            Some(Authority {
                host: "a.test".to_string(),
                port: 8443
            })
        );
    }

    #[test]
    fn keeps_bytes_after_head() {
        let head = parse_head(b"CONNECT a.test HTTP/1.1\r\n\r\n\x16\x03\x01")
            .unwrap()
            .unwrap();
        assert_eq!(head.trailing, b"\x16\x03\x01");
        assert_eq!(head.destination().unwrap().port, 443);
    }

    #[test]
    fn partial_head_needs_more() {
        assert!(parse_head(b"CONNECT a.test:443 HTTP/1.1\r\nHost: a").unwrap().is_none());
    }

    #[test]
    fn malformed_head_is_error() {
        assert!(matches!(
            parse_head(b"\x00\x01 nonsense\r\n\r\n"),
            Err(RequestError::Malformed(_))
        ));
    }

    #[test]
    fn plain_request_destination() {
        let absolute = parse_head(b"GET http://user@b.test:8080/x HTTP/1.1\r\nHost: ignored\r\n\r\n")
            .unwrap()
            .unwrap();
        assert_eq!(absolute.destination().unwrap().to_string(), "b.test:8080");

        let origin = parse_head(b"GET /x HTTP/1.1\r\nHost: c.test\r\n\r\n")
            .unwrap()
            .unwrap();
        assert_eq!(origin.destination().unwrap().to_string(), "c.test:80");

        let nowhere = parse_head(b"GET /x HTTP/1.1\r\n\r\n").unwrap().unwrap();
        assert!(nowhere.destination().is_none());
    }

    #[test]
    fn authority_forms() {
        assert_eq!(
            Authority::parse("[::1]:8443", 443),
            Some(Authority {
                host: "::1".to_string(),
                port: 8443
            })
        );
        assert_eq!(Authority::parse("[::1]", 443).unwrap().port, 443);
        assert_eq!(Authority::parse("[::1]:8443", 443).unwrap().dial_addr(), "[::1]:8443");
        assert_eq!(Authority::parse("a.test", 443).unwrap().dial_addr(), "a.test:443");
        assert!(Authority::parse("a.test:http", 443).is_none());
        assert!(Authority::parse(":443", 443).is_none());
        assert!(Authority::parse("::1", 443).is_none());
    }

    #[tokio::test]
    async fn reads_head_split_across_writes() {
        let (mut client, mut server) = tokio::io::duplex(64);
        let writer = tokio::spawn(async move {
            use tokio::io::AsyncWriteExt;
            client.write_all(b"CONNECT a.test:443 HT").await.unwrap();
            tokio::time::sleep(Duration::from_millis(10)).await;
            client.write_all(b"TP/1.1\r\n\r\nhello").await.unwrap();
            client
        });

        let head = read_request_head(&mut server, Duration::from_secs(1)).await.unwrap();
        assert_eq!(head.target, "a.test:443");
        assert_eq!(head.trailing, b"hello");
        let _client = writer.await.unwrap();
    }

    #[tokio::test]
    async fn oversize_head_is_rejected() {
        let mut data = b"GET / HTTP/1.1\r\nX-Fill: ".to_vec();
        data.extend(std::iter::repeat(b'a').take(MAX_HEAD_SIZE));
        let mut reader = &data[..];

        let err = read_request_head(&mut reader, Duration::from_secs(1)).await.unwrap_err();
        assert!(matches!(err, RequestError::TooLarge));
    }

    #[tokio::test]
    async fn eof_before_head_is_closed() {
        let mut reader = &b"CONNECT a.test:443 HTTP/1.1\r\n"[..];
        let err = read_request_head(&mut reader, Duration::from_secs(1)).await.unwrap_err();
        assert!(matches!(err, RequestError::Closed));
    }

    #[tokio::test(start_paused = true)]
    async fn silent_client_times_out() {
        let (_client, mut server) = tokio::io::duplex(64);
        let err = read_request_head(&mut server, Duration::from_millis(100)).await.unwrap_err();
        assert!(matches!(err, RequestError::TimedOut));
    }
}
