//! BitSave Proxy - allow-listed forwarding proxy
//!
//! Relays browser requests to a fixed set of third-party origins, retrying
//! transient upstream failures and forcing permissive CORS on the way back.

pub mod config;
pub mod http;
pub mod proxy;
pub mod server;
