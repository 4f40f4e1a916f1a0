//! Request forwarding with allow-listing and bounded retry.
//!
//! ```text
//! Idle → Validating ─┬─ Rejected
//!                    └─ Forwarding(1) ─┬─ Succeeded
//!                                      ├─ Retrying → Forwarding(n + 1)
//!                                      └─ Exhausted
//! ```

use std::sync::Arc;
use tokio::time::{sleep, timeout};
use url::Url;

use crate::http::headers::HeaderMap;
use crate::http::request::{Method, Request};
use crate::http::response::{Response, ResponseBuilder, StatusCode};
use crate::proxy::allowlist::{AllowList, AllowListMode};
use crate::proxy::cors;
use crate::proxy::error::ProxyError;
use crate::proxy::retry::RetryPolicy;
use crate::proxy::transport::{ForwardRequest, ForwardResult, Transport, TransportError};

/// Query parameter naming the destination.
pub const TARGET_PARAM: &str = "url";

/// Stripped from the inbound request; the outbound transport recomputes them.
pub const HOP_REQUEST_HEADERS: &[&str] = &["host", "connection", "content-length", "transfer-encoding"];

/// Stripped from the upstream response; they describe the upstream
/// connection, not the one we answer on.
const HOP_RESPONSE_HEADERS: &[&str] = &["connection", "keep-alive", "transfer-encoding"];

/// Relays inbound requests to allow-listed origins.
///
/// Holds no per-request state, so one instance is shared by every
/// connection.
pub struct ProxyForwarder {
    allow_list: AllowList,
    mode: AllowListMode,
    policy: RetryPolicy,
    transport: Arc<dyn Transport>,
}

/// Result of a single attempt.
enum Attempt {
    /// Status below 500, relayed as-is.
    Done(ForwardResult),
    /// 5xx from the upstream.
    ServerError(ForwardResult),
    Failed(TransportError),
}

impl ProxyForwarder {
    pub fn new(
        allow_list: AllowList,
        mode: AllowListMode,
        policy: RetryPolicy,
        transport: Arc<dyn Transport>,
    ) -> Self {
        Self {
            allow_list,
            mode,
            policy,
            transport,
        }
    }

    /// Validates, forwards and relays one inbound request.
    pub async fn forward(&self, request: &Request) -> Result<Response, ProxyError> {
        let outbound = self.prepare(request)?;

        tracing::info!(
            method = %outbound.method,
            target = %outbound.target,
            "Forwarding request"
        );

        let result = self.send_with_retry(&outbound).await?;
        relay(result, &outbound.method)
    }

    /// Turns the inbound request into an outbound one, or rejects it before
    /// any network call.
    pub fn prepare(&self, request: &Request) -> Result<ForwardRequest, ProxyError> {
        let raw = request
            .query_param(TARGET_PARAM)
            .filter(|value| !value.trim().is_empty())
            .ok_or(ProxyError::MissingTarget)?;

        let target = parse_target(raw.trim())?;
        let host = target.host_str().unwrap_or_default();

        if !self.allow_list.permits(host) {
            match self.mode {
                AllowListMode::Enforce => {
                    tracing::warn!(host, "Blocked request to unauthorized domain");
                    return Err(ProxyError::ForbiddenTarget(host.to_string()));
                }
                AllowListMode::Permissive => {
                    tracing::warn!(host, "Forwarding to domain outside the allow-list (permissive mode)");
                }
            }
        }

        let body = request
            .method
            .has_body_semantics()
            .then(|| request.body.clone());

        Ok(ForwardRequest {
            method: request.method.clone(),
            target,
            headers: request.headers.without(HOP_REQUEST_HEADERS),
            body,
        })
    }

    /// Runs up to `max_attempts` strictly sequential attempts.
    ///
    /// Statuses below 500 end the loop at once. When the budget runs out on
    /// a 5xx, that response is returned; on a network error or timeout, the
    /// last error is.
    pub async fn send_with_retry(&self, request: &ForwardRequest) -> Result<ForwardResult, ProxyError> {
        let max_attempts = self.policy.max_attempts.max(1);
        let mut attempt = 1;

        loop {
            let outcome = self.attempt(request, attempt).await;
            let last = attempt >= max_attempts;

            match outcome {
                Attempt::Done(result) => return Ok(result),
                Attempt::ServerError(result) if last => {
                    tracing::error!(
                        method = %request.method,
                        target = %request.target,
                        status = result.status,
                        attempts = attempt,
                        "Upstream still failing after all attempts, relaying last response"
                    );
                    return Ok(result);
                }
                Attempt::Failed(err) if last => {
                    tracing::error!(
                        method = %request.method,
                        target = %request.target,
                        error = %err,
                        attempts = attempt,
                        "All attempts failed"
                    );
                    return Err(ProxyError::UpstreamExhausted {
                        attempts: attempt,
                        last: err,
                    });
                }
                Attempt::ServerError(_) | Attempt::Failed(_) => {
                    let delay = self.policy.delay_after(attempt);
                    tracing::warn!(
                        method = %request.method,
                        target = %request.target,
                        attempt,
                        remaining = max_attempts - attempt,
                        delay_ms = delay.as_millis() as u64,
                        "Retrying upstream request"
                    );
                    sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }

    async fn attempt(&self, request: &ForwardRequest, attempt: u32) -> Attempt {
        let deadline = self.policy.attempt_timeout;

        // Elapsed deadline drops the send future, which closes its connection.
        let outcome = match timeout(deadline, self.transport.send(request)).await {
            Ok(outcome) => outcome,
            Err(_) => Err(TransportError::Timeout(deadline)),
        };

        match outcome {
            Ok(result) if result.status >= 500 => {
                tracing::warn!(
                    method = %request.method,
                    target = %request.target,
                    attempt,
                    status = result.status,
                    "Upstream answered with a server error"
                );
                Attempt::ServerError(result)
            }
            Ok(result) => {
                tracing::info!(
                    method = %request.method,
                    target = %request.target,
                    attempt,
                    status = result.status,
                    "Upstream answered"
                );
                Attempt::Done(result)
            }
            Err(err) => {
                tracing::warn!(
                    method = %request.method,
                    target = %request.target,
                    attempt,
                    error = %err,
                    "Upstream attempt failed"
                );
                Attempt::Failed(err)
            }
        }
    }
}

fn parse_target(raw: &str) -> Result<Url, ProxyError> {
    let target = Url::parse(raw).map_err(|e| ProxyError::InvalidTarget(e.to_string()))?;

    if !matches!(target.scheme(), "http" | "https") {
        return Err(ProxyError::InvalidTarget(format!(
            "unsupported scheme: {}",
            target.scheme()
        )));
    }
    if target.host_str().is_none_or(str::is_empty) {
        return Err(ProxyError::InvalidTarget("missing host".to_string()));
    }

    Ok(target)
}

/// Copies the upstream answer into a response for the caller, forcing CORS.
fn relay(result: ForwardResult, method: &Method) -> Result<Response, ProxyError> {
    let status = StatusCode::from_u16(result.status).ok_or_else(|| {
        ProxyError::Internal(format!("upstream returned invalid status {}", result.status))
    })?;

    let mut headers: HeaderMap = result.headers.without(HOP_RESPONSE_HEADERS);
    // Body is buffered, so its length is ours to state. HEAD keeps the
    // upstream's Content-Length since there is no body to measure.
    if *method != Method::HEAD {
        headers.remove("content-length");
    }
    cors::apply(&mut headers);

    Ok(ResponseBuilder::new(status)
        .reason(result.status_text)
        .headers(headers)
        .body(result.body)
        .build())
}
