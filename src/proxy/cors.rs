//! CORS headers forced onto every proxy response.

use crate::http::headers::HeaderMap;
use crate::http::response::{Response, ResponseBuilder, StatusCode};

pub const ALLOW_ORIGIN: &str = "Access-Control-Allow-Origin";
pub const ALLOW_METHODS: &str = "Access-Control-Allow-Methods";
pub const ALLOW_HEADERS: &str = "Access-Control-Allow-Headers";

pub const ANY_ORIGIN: &str = "*";
pub const METHODS: &str = "GET, POST, OPTIONS";
pub const RELAY_HEADERS: &str = "Content-Type, Authorization";
pub const PREFLIGHT_HEADERS: &str = "Content-Type, Authorization, x-csrf-token";

/// Sets the three CORS headers, overwriting whatever the upstream sent.
pub fn apply(headers: &mut HeaderMap) {
    headers.insert(ALLOW_ORIGIN, ANY_ORIGIN);
    headers.insert(ALLOW_METHODS, METHODS);
    headers.insert(ALLOW_HEADERS, RELAY_HEADERS);
}

/// Answer to a browser preflight. Never touches the upstream.
pub fn preflight() -> Response {
    ResponseBuilder::new(StatusCode::OK)
        .header(ALLOW_ORIGIN, ANY_ORIGIN)
        .header(ALLOW_METHODS, METHODS)
        .header(ALLOW_HEADERS, PREFLIGHT_HEADERS)
        .build()
}
