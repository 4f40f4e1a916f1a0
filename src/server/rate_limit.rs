//! Per-client request limiting
//!
//! Fixed window counter keyed by client IP. Shared by every connection task.

use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::config::RateLimitConfig;

#[derive(Debug, Clone, Copy)]
struct Window {
    started: Instant,
    count: u32,
}

#[derive(Debug, Clone)]
pub struct RateLimiter {
    max_requests: u32,
    window: Duration,
    clients: Arc<Mutex<HashMap<IpAddr, Window>>>,
}

impl RateLimiter {
    pub fn new(max_requests: u32, window: Duration) -> Self {
        Self {
            max_requests,
            window,
            clients: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Returns `None` when limiting is disabled.
    pub fn from_config(config: &RateLimitConfig) -> Option<Self> {
        config
            .enabled
            .then(|| Self::new(config.max_requests, config.window()))
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Counts one request from `client`; false once it is over the limit
    /// for the current window.
    pub async fn check(&self, client: IpAddr) -> bool {
        let now = Instant::now();
        let mut clients = self.clients.lock().await;

        let entry = clients.entry(client).or_insert(Window {
            started: now,
            count: 0,
        });

        if now.duration_since(entry.started) >= self.window {
            entry.started = now;
            entry.count = 0;
        }

        if entry.count >= self.max_requests {
            return false;
        }
        entry.count += 1;
        true
    }

    /// Drops windows that have expired. Returns how many were removed.
    pub async fn prune(&self) -> usize {
        let now = Instant::now();
        let mut clients = self.clients.lock().await;
        let before = clients.len();
        clients.retain(|_, w| now.duration_since(w.started) < self.window);
        before - clients.len()
    }

    pub async fn tracked_clients(&self) -> usize {
        self.clients.lock().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    const CLIENT: IpAddr = IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1));
    const OTHER: IpAddr = IpAddr::V4(Ipv4Addr::new(10, 0, 0, 2));

    #[tokio::test(start_paused = true)]
    async fn limits_each_client_separately() {
        let limiter = RateLimiter::new(2, Duration::from_secs(60));

        assert!(limiter.check(CLIENT).await);
        assert!(limiter.check(CLIENT).await);
        assert!(!limiter.check(CLIENT).await);
        assert!(limiter.check(OTHER).await);
    }

    #[tokio::test(start_paused = true)]
    async fn window_resets_after_expiry() {
        let limiter = RateLimiter::new(1, Duration::from_secs(60));

        assert!(limiter.check(CLIENT).await);
        assert!(!limiter.check(CLIENT).await);

        tokio::time::advance(Duration::from_secs(61)).await;
        assert!(limiter.check(CLIENT).await);
    }

    #[tokio::test(start_paused = true)]
    async fn prune_drops_expired_windows() {
        let limiter = RateLimiter::new(5, Duration::from_secs(10));
        limiter.check(CLIENT).await;

        tokio::time::advance(Duration::from_secs(5)).await;
        limiter.check(OTHER).await;

        tokio::time::advance(Duration::from_secs(6)).await;
        assert_eq!(limiter.prune().await, 1);
        assert_eq!(limiter.tracked_clients().await, 1);
    }

    #[test]
    fn disabled_config_yields_no_limiter() {
        let config = RateLimitConfig {
            enabled: false,
            ..RateLimitConfig::default()
        };
        assert!(RateLimiter::from_config(&config).is_none());
    }
}
