//! Forwarding proxy
//!
//! This module implements the core proxy logic: destination allow-listing,
//! outbound transport, bounded retry, and response relay with forced CORS.

pub mod allowlist;
pub mod cors;
pub mod error;
pub mod forwarder;
pub mod retry;
pub mod transport;

pub use allowlist::{AllowList, AllowListMode};
pub use error::ProxyError;
pub use forwarder::ProxyForwarder;
pub use retry::{Backoff, RetryPolicy};
pub use transport::{ForwardRequest, ForwardResult, HttpTransport, Transport, TransportError};
