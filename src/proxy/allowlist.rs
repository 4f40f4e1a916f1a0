//! Destination allow-list.

use serde::Deserialize;

/// Domains the proxy may reach out of the box.
pub const DEFAULT_ALLOWED_DOMAINS: &[&str] = &[
    "api.coinbase.com",
    "api.developer.coinbase.com",
    "base.org",
    "mainnet.base.org",
    "sepolia.base.org",
    "rpc.ankr.com",
    "base-mainnet.g.alchemy.com",
    "keys.coinbase.com",
    "pay.coinbase.com",
    "bc.coinbase.com",
];

/// What to do with a target whose host is not on the allow-list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AllowListMode {
    /// Reject with 403.
    #[default]
    Enforce,
    /// Log a warning and forward anyway.
    Permissive,
}

/// Immutable set of permitted domain suffixes.
#[derive(Debug, Clone)]
pub struct AllowList {
    domains: Vec<String>,
}

impl AllowList {
    pub fn new<I, S>(domains: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let domains = domains
            .into_iter()
            .map(|d| normalize(d.as_ref()))
            .filter(|d| !d.is_empty())
            .collect();
        Self { domains }
    }

    /// Returns true if `host` equals an allowed domain or is a subdomain of one.
    ///
    /// Matching happens on label boundaries, so `base.org` admits
    /// `mainnet.base.org` but not `evilbase.org`.
    pub fn permits(&self, host: &str) -> bool {
        let host = normalize(host);
        self.domains.iter().any(|domain| {
            host == *domain
                || host
                    .strip_suffix(domain.as_str())
                    .is_some_and(|prefix| prefix.ends_with('.'))
        })
    }

    pub fn domains(&self) -> &[String] {
        &self.domains
    }

    pub fn is_empty(&self) -> bool {
        self.domains.is_empty()
    }
}

impl Default for AllowList {
    fn default() -> Self {
        Self::new(DEFAULT_ALLOWED_DOMAINS)
    }
}

fn normalize(name: &str) -> String {
    name.trim().trim_end_matches('.').to_ascii_lowercase()
}
