//! Outbound HTTP transport.
//!
//! The forwarder only needs "send this request, give me the buffered
//! response". [`Transport`] is that seam; [`HttpTransport`] implements it on
//! top of `reqwest` so that TLS origins work.

use async_trait::async_trait;
use bytes::Bytes;
use std::time::Duration;
use url::Url;

use crate::http::headers::HeaderMap;
use crate::http::request::Method;

/// A request ready to leave the proxy.
#[derive(Debug, Clone)]
pub struct ForwardRequest {
    pub method: Method,
    pub target: Url,
    /// Already stripped of hop-specific headers.
    pub headers: HeaderMap,
    /// `None` for GET and HEAD.
    pub body: Option<Bytes>,
}

/// What the upstream answered.
#[derive(Debug, Clone)]
pub struct ForwardResult {
    pub status: u16,
    pub status_text: String,
    pub headers: HeaderMap,
    pub body: Bytes,
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum TransportError {
    /// Connection refused, DNS failure, reset, invalid request...
    #[error("{0}")]
    Network(String),

    #[error("upstream did not answer within {0:?}")]
    Timeout(Duration),
}

#[async_trait]
pub trait Transport: Send + Sync {
    /// Sends one request and buffers the whole response.
    ///
    /// Dropping the returned future must abort the in-flight call.
    async fn send(&self, request: &ForwardRequest) -> Result<ForwardResult, TransportError>;
}

/// Production transport backed by a pooled `reqwest::Client`.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new() -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("bitsave-proxy/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: &ForwardRequest) -> Result<ForwardResult, TransportError> {
        let method = reqwest::Method::from_bytes(request.method.as_str().as_bytes())
            .map_err(|e| TransportError::Network(e.to_string()))?;

        let mut builder = self
            .client
            .request(method, request.target.clone())
            .headers(outbound_headers(&request.headers));
        if let Some(body) = &request.body {
            builder = builder.body(body.clone());
        }

        let response = builder.send().await.map_err(network_error)?;

        let status = response.status();
        let headers = response
            .headers()
            .iter()
            .map(|(name, value)| {
                (
                    name.as_str().to_string(),
                    String::from_utf8_lossy(value.as_bytes()).into_owned(),
                )
            })
            .collect();
        let body = response.bytes().await.map_err(network_error)?;

        Ok(ForwardResult {
            status: status.as_u16(),
            status_text: status.canonical_reason().unwrap_or_default().to_string(),
            headers,
            body,
        })
    }
}

/// Converts to reqwest headers, keeping order and duplicates.
///
/// Values go over as raw bytes so non-ASCII text survives; only names or
/// values with control characters are dropped.
fn outbound_headers(headers: &HeaderMap) -> reqwest::header::HeaderMap {
    let mut out = reqwest::header::HeaderMap::with_capacity(headers.len());
    for (name, value) in headers.iter() {
        match (
            reqwest::header::HeaderName::from_bytes(name.as_bytes()),
            reqwest::header::HeaderValue::from_bytes(value.as_bytes()),
        ) {
            (Ok(name), Ok(value)) => {
                out.append(name, value);
            }
            _ => tracing::debug!(header = name, "Dropping header that is not valid on the wire"),
        }
    }
    out
}

fn network_error(err: reqwest::Error) -> TransportError {
    // reqwest's Display hides the cause ("error sending request"); keep the chain.
    let mut message = err.to_string();
    let mut source = std::error::Error::source(&err);
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    TransportError::Network(message)
}
