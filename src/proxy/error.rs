//! Errors surfaced to proxy callers.

use serde_json::json;

use crate::http::response::{Response, StatusCode};
use crate::proxy::cors;
use crate::proxy::transport::TransportError;

#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum ProxyError {
    #[error("Missing \"url\" query parameter")]
    MissingTarget,

    #[error("Invalid target URL")]
    InvalidTarget(String),

    #[error("Domain not allowed")]
    ForbiddenTarget(String),

    #[error("Too many requests")]
    RateLimited,

    /// Every attempt ended in a network error or timeout.
    #[error("Proxy request failed")]
    UpstreamExhausted {
        attempts: u32,
        #[source]
        last: TransportError,
    },

    #[error("Proxy request failed")]
    Internal(String),
}

impl ProxyError {
    pub fn status(&self) -> StatusCode {
        match self {
            ProxyError::MissingTarget | ProxyError::InvalidTarget(_) => StatusCode::BAD_REQUEST,
            ProxyError::ForbiddenTarget(_) => StatusCode::FORBIDDEN,
            ProxyError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            ProxyError::UpstreamExhausted { .. } | ProxyError::Internal(_) => {
                StatusCode::BAD_GATEWAY
            }
        }
    }

    pub fn details(&self) -> Option<String> {
        match self {
            ProxyError::MissingTarget | ProxyError::RateLimited => None,
            ProxyError::InvalidTarget(reason) => Some(reason.clone()),
            ProxyError::ForbiddenTarget(host) => Some(host.clone()),
            ProxyError::UpstreamExhausted { last, .. } => Some(last.to_string()),
            ProxyError::Internal(message) => Some(message.clone()),
        }
    }

    /// JSON `{ error, details }` body with the CORS headers applied.
    pub fn into_response(self) -> Response {
        let body = match self.details() {
            Some(details) => json!({ "error": self.to_string(), "details": details }),
            None => json!({ "error": self.to_string() }),
        };
        let mut response = Response::json(self.status(), &body);
        cors::apply(&mut response.headers);
        response
    }
}
