use anyhow::Context;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;

use crate::config::Config;
use crate::http::connection::Connection;
use crate::proxy::{HttpTransport, ProxyForwarder, Transport};
use crate::server::rate_limit::RateLimiter;
use crate::server::router::Router;

/// Builds the router described by `cfg` around the given transport.
pub fn build_router(cfg: &Config, transport: Arc<dyn Transport>) -> Router {
    let forwarder = ProxyForwarder::new(
        cfg.proxy.allow_list(),
        cfg.proxy.allow_list_mode,
        cfg.proxy.retry_policy(),
        transport,
    );
    let rate_limiter = RateLimiter::from_config(&cfg.rate_limit);

    Router::new(forwarder, rate_limiter, cfg.server.proxy_paths.clone())
}

pub async fn run(cfg: &Config) -> anyhow::Result<()> {
    let listener = TcpListener::bind(&cfg.server.listen_addr)
        .await
        .with_context(|| format!("Failed to bind {}", cfg.server.listen_addr))?;
    info!("Listening on {}", cfg.server.listen_addr);

    let transport = Arc::new(HttpTransport::new().context("Failed to build HTTP client")?);
    let router = Arc::new(build_router(cfg, transport));

    serve(listener, router, cfg.server.max_body_bytes).await
}

/// Accept loop. One task per connection.
pub async fn serve(listener: TcpListener, router: Arc<Router>, max_body: usize) -> anyhow::Result<()> {
    if let Some(limiter) = router.rate_limiter().cloned() {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(limiter.window());
            loop {
                ticker.tick().await;
                let pruned = limiter.prune().await;
                if pruned > 0 {
                    tracing::debug!(pruned, "Pruned expired rate limit windows");
                }
            }
        });
    }

    loop {
        let (socket, peer) = listener.accept().await?;
        info!("Accepted connection from {}", peer);

        let router = Arc::clone(&router);
        tokio::spawn(async move {
            let mut conn = Connection::new(socket, peer, router, max_body);
            if let Err(e) = conn.run().await {
                tracing::error!("Connection error from {}: {}", peer, e);
            }
        });
    }
}
