//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! CONNECT target host
//!     → registry.rs (hostname → breaker entry, built once at startup)
//!     → admission.rs (Allow / Deny / PassThrough)
//!     → tunnel manager or pass-through proxy
//! ```
//!
//! # Design Decisions
//! - Exact hostname match, port ignored
//! - Registry is read-only after startup; no locking around the map
//! - A denial is not an attempt and records nothing

pub mod admission;
pub mod registry;

pub use admission::{Admission, AdmissionGate};
pub use registry::{HostEntry, HostRegistry};
