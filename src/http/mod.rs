//! Client-facing HTTP/1 handling.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → request.rs (read and parse the first request head)
//!     → server.rs (admission, tunnel or pass-through)
//!     → response.rs (fixed status lines back to the client)
//! ```

pub mod request;
pub mod response;
pub mod server;

pub use request::{read_request_head, Authority, RequestError, RequestHead};
pub use server::ProxyServer;
