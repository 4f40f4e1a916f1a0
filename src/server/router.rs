//! Request routing
//!
//! Thin adapter between the HTTP front end and the [`ProxyForwarder`].

use std::net::SocketAddr;

use crate::http::request::{Method, Request};
use crate::http::response::Response;
use crate::proxy::cors;
use crate::proxy::error::ProxyError;
use crate::proxy::forwarder::ProxyForwarder;
use crate::server::rate_limit::RateLimiter;

pub struct Router {
    forwarder: ProxyForwarder,
    rate_limiter: Option<RateLimiter>,
    proxy_paths: Vec<String>,
}

impl Router {
    pub fn new(
        forwarder: ProxyForwarder,
        rate_limiter: Option<RateLimiter>,
        proxy_paths: Vec<String>,
    ) -> Self {
        Self {
            forwarder,
            rate_limiter,
            proxy_paths,
        }
    }

    pub fn rate_limiter(&self) -> Option<&RateLimiter> {
        self.rate_limiter.as_ref()
    }

    /// Produces exactly one response for `request`.
    pub async fn handle(&self, request: &Request, peer: SocketAddr) -> Response {
        let route = request.route();

        if !self.proxy_paths.iter().any(|p| p == route) {
            tracing::debug!(path = route, peer = %peer, "No route");
            return Response::not_found();
        }

        if request.method == Method::OPTIONS {
            return cors::preflight();
        }

        if let Some(limiter) = &self.rate_limiter {
            if !limiter.check(peer.ip()).await {
                tracing::warn!(peer = %peer, "Rate limit exceeded");
                return ProxyError::RateLimited.into_response();
            }
        }

        match self.forwarder.forward(request).await {
            Ok(response) => response,
            Err(err) => {
                let details = err.details().unwrap_or_default();
                tracing::warn!(
                    peer = %peer,
                    method = %request.method,
                    status = err.status().as_u16(),
                    error = %err,
                    details = %details,
                    "Proxy request rejected or failed"
                );
                err.into_response()
            }
        }
    }
}
