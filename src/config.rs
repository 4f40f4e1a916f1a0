use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

use crate::proxy::allowlist::{AllowList, AllowListMode, DEFAULT_ALLOWED_DOMAINS};
use crate::proxy::retry::{Backoff, RetryPolicy};

/// Environment variable naming the YAML config file.
pub const CONFIG_PATH_ENV: &str = "BITSAVE_PROXY_CONFIG";
/// Environment variable overriding `server.listen_addr`.
pub const LISTEN_ENV: &str = "LISTEN";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub server: ServerConfig,
    pub proxy: ProxyConfig,
    pub rate_limit: RateLimitConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerConfig {
    pub listen_addr: String,
    /// Paths served by the proxy handler.
    pub proxy_paths: Vec<String>,
    pub max_body_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: "127.0.0.1:3001".to_string(),
            proxy_paths: vec!["/proxy-endpoint".to_string(), "/proxy".to_string()],
            max_body_bytes: crate::http::parser::DEFAULT_MAX_BODY_BYTES,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProxyConfig {
    pub allowed_domains: Vec<String>,
    pub allow_list_mode: AllowListMode,
    pub max_attempts: u32,
    pub attempt_timeout_ms: u64,
    pub backoff_unit_ms: u64,
    pub backoff: Backoff,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        let policy = RetryPolicy::default();
        Self {
            allowed_domains: DEFAULT_ALLOWED_DOMAINS.iter().map(|d| d.to_string()).collect(),
            allow_list_mode: AllowListMode::Enforce,
            max_attempts: policy.max_attempts,
            attempt_timeout_ms: policy.attempt_timeout.as_millis() as u64,
            backoff_unit_ms: policy.backoff_unit.as_millis() as u64,
            backoff: policy.backoff,
        }
    }
}

impl ProxyConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            attempt_timeout: Duration::from_millis(self.attempt_timeout_ms),
            backoff_unit: Duration::from_millis(self.backoff_unit_ms),
            backoff: self.backoff,
        }
    }

    pub fn allow_list(&self) -> AllowList {
        AllowList::new(&self.allowed_domains)
    }
}

/// Per-client fixed-window request limit.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RateLimitConfig {
    pub enabled: bool,
    pub max_requests: u32,
    pub window_secs: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_requests: 1000,
            window_secs: 15 * 60,
        }
    }
}

impl RateLimitConfig {
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }
}

impl Config {
    /// Loads the file named by `BITSAVE_PROXY_CONFIG` (defaults if unset),
    /// then applies the `LISTEN` override.
    pub fn load() -> Result<Self> {
        let mut cfg = match std::env::var(CONFIG_PATH_ENV) {
            Ok(path) => Self::from_file(&path)?,
            Err(_) => Self::default(),
        };

        if let Ok(listen) = std::env::var(LISTEN_ENV) {
            cfg.server.listen_addr = listen;
        }

        cfg.validate()?;
        Ok(cfg)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::from_yaml_str(&text)
            .with_context(|| format!("Invalid config file {}", path.display()))
    }

    pub fn from_yaml_str(text: &str) -> Result<Self> {
        // An empty document means "all defaults".
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        let cfg: Config = serde_yaml::from_str(text)?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        if self.proxy.max_attempts == 0 {
            anyhow::bail!("proxy.max_attempts must be at least 1");
        }
        if self.proxy.attempt_timeout_ms == 0 {
            anyhow::bail!("proxy.attempt_timeout_ms must be positive");
        }
        if self.proxy.allow_list_mode == AllowListMode::Enforce && self.proxy.allow_list().is_empty()
        {
            anyhow::bail!("proxy.allowed_domains is empty while allow_list_mode is enforce");
        }
        if self.server.proxy_paths.is_empty() {
            anyhow::bail!("server.proxy_paths must name at least one path");
        }
        if let Some(path) = self.server.proxy_paths.iter().find(|p| !p.starts_with('/')) {
            anyhow::bail!("server.proxy_paths entry {path:?} must start with '/'");
        }
        if self.rate_limit.enabled && (self.rate_limit.max_requests == 0 || self.rate_limit.window_secs == 0)
        {
            anyhow::bail!("rate_limit.max_requests and rate_limit.window_secs must be positive");
        }
        Ok(())
    }
}
