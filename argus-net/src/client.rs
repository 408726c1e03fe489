//! HTTP client construction under proxy policy
//!
//! Collectors never build their own reqwest clients; they go through here so
//! proxy routing (ghost mode), timeouts, and user-agent rotation are applied
//! uniformly.

use reqwest::{Client, Proxy};
use std::time::Duration;
use thiserror::Error;

/// Errors from client construction
#[derive(Debug, Error)]
pub enum NetError {
    #[error("failed to build HTTP client: {0}")]
    ClientBuild(String),

    #[error("invalid proxy URL '{0}'")]
    InvalidProxy(String),
}

/// Proxy and timeout policy for outbound HTTP.
#[derive(Debug, Clone)]
pub struct NetConfig {
    /// Explicit proxy URL (http or socks5), if any
    pub proxy: Option<String>,
    /// SOCKS proxy used when ghost mode is on (default: local Tor)
    pub tor_proxy: String,
    /// Route everything through the anonymizing proxy
    pub ghost_mode: bool,
    /// Request timeout in seconds
    pub timeout_secs: u64,
    /// Accept invalid TLS certificates (some probed hosts are self-signed)
    pub insecure_skip_verify: bool,
}

impl Default for NetConfig {
    fn default() -> Self {
        Self {
            proxy: None,
            tor_proxy: "socks5h://127.0.0.1:9050".to_string(),
            ghost_mode: false,
            timeout_secs: 30,
            insecure_skip_verify: false,
        }
    }
}

impl NetConfig {
    /// The proxy URL that should be applied, honoring ghost mode precedence.
    pub fn effective_proxy(&self) -> Option<&str> {
        if self.ghost_mode {
            Some(self.tor_proxy.as_str())
        } else {
            self.proxy.as_deref()
        }
    }
}

/// User agents for rotation
const USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/135.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/135.0.0.0 Safari/537.36",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/135.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:137.0) Gecko/20100101 Firefox/137.0",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 14.7; rv:137.0) Gecko/20100101 Firefox/137.0",
];

/// Get a random user agent
pub fn random_user_agent() -> &'static str {
    use rand::Rng;
    let idx = rand::thread_rng().gen_range(0..USER_AGENTS.len());
    USER_AGENTS[idx]
}

/// Create an HTTP client configured per policy.
pub fn build_client(config: &NetConfig) -> Result<Client, NetError> {
    let mut builder = Client::builder()
        .timeout(Duration::from_secs(config.timeout_secs))
        .user_agent(random_user_agent());

    if let Some(proxy_url) = config.effective_proxy() {
        let proxy =
            Proxy::all(proxy_url).map_err(|_| NetError::InvalidProxy(proxy_url.to_string()))?;
        builder = builder.proxy(proxy);
    }

    if config.insecure_skip_verify {
        builder = builder.danger_accept_invalid_certs(true);
    }

    builder
        .build()
        .map_err(|e| NetError::ClientBuild(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_builds() {
        let client = build_client(&NetConfig::default());
        assert!(client.is_ok());
    }

    #[test]
    fn test_ghost_mode_overrides_proxy() {
        let config = NetConfig {
            proxy: Some("http://corp-proxy:8080".to_string()),
            ghost_mode: true,
            ..Default::default()
        };
        assert_eq!(config.effective_proxy(), Some("socks5h://127.0.0.1:9050"));
    }

    #[test]
    fn test_random_user_agent() {
        let ua = random_user_agent();
        assert!(ua.contains("Mozilla"));
    }
}
