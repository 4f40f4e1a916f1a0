//! Listener, routing and per-client limits.

pub mod listener;
pub mod rate_limit;
pub mod router;

pub use listener::{build_router, run, serve};
pub use router::Router;
