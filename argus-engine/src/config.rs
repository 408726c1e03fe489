//! TOML configuration
//!
//! Everything is optional: with no config file present the defaults give a
//! working local setup. An explicit path is honored strictly; otherwise
//! `./argus.toml` then `~/.argus.toml` are tried.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;
use tracing::info;

use argus_collectors::PortScanMode;
use argus_net::{NetConfig, RateGovernor, ScopePolicy};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid config file: {0}")]
    Parse(#[from] toml::de::Error),
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub database: DatabaseSection,
    pub storage: StorageSection,
    pub plugins: PluginsSection,
    pub scope: ScopeSection,
    pub collectors: CollectorsSection,
    /// API keys by service name (e.g. `github`)
    pub keys: HashMap<String, String>,
    pub http: HttpSection,
    /// Route all collection traffic through the anonymizing proxy
    pub ghost_mode: bool,
    pub llm: LlmSection,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DatabaseSection {
    pub path: String,
}

impl Default for DatabaseSection {
    fn default() -> Self {
        Self {
            path: "argus.db".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageSection {
    pub evidence_root: String,
}

impl Default for StorageSection {
    fn default() -> Self {
        Self {
            evidence_root: "evidence_storage".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PluginsSection {
    pub dir: String,
    pub timeout_secs: u64,
}

impl Default for PluginsSection {
    fn default() -> Self {
        Self {
            dir: "plugins".to_string(),
            timeout_secs: 60,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct ScopeSection {
    /// Overrides the default blacklist when non-empty
    pub blacklist: Vec<String>,
    /// Strict whitelist; empty means everything not blacklisted
    pub whitelist: Vec<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct CollectorsSection {
    /// Steady-rate overrides by collector name, tokens per second
    pub rate_limits: HashMap<String, f64>,
    pub ports: PortsSection,
    pub screenshot: ScreenshotSection,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PortsSection {
    /// "common", "top-100", or "custom"
    pub mode: String,
    pub custom_ports: Vec<u16>,
}

impl Default for PortsSection {
    fn default() -> Self {
        Self {
            mode: "common".to_string(),
            custom_ports: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ScreenshotSection {
    /// Headless-capable browser binary
    pub browser: String,
}

impl Default for ScreenshotSection {
    fn default() -> Self {
        Self {
            browser: "chromium".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HttpSection {
    pub proxy: Option<String>,
    pub tor_proxy: String,
    pub timeout_secs: u64,
    pub insecure_skip_verify: bool,
}

impl Default for HttpSection {
    fn default() -> Self {
        Self {
            proxy: None,
            tor_proxy: "socks5h://127.0.0.1:9050".to_string(),
            timeout_secs: 30,
            insecure_skip_verify: false,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmSection {
    /// Analysis bridge interpreter and arguments
    pub command: String,
    pub args: Vec<String>,
    pub provider: String,
    pub url: String,
    pub api_key: String,
    pub model: String,
    pub timeout_secs: u64,
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            command: "python3".to_string(),
            args: vec!["-m".to_string(), "analyzer".to_string()],
            provider: "ollama".to_string(),
            url: "http://localhost:11434".to_string(),
            api_key: String::new(),
            model: "llama3:8b".to_string(),
            timeout_secs: 120,
        }
    }
}

impl AppConfig {
    /// Load configuration. An explicit path must parse; otherwise the first
    /// existing default location is used, falling back to defaults.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = path {
            let raw = std::fs::read_to_string(path)?;
            let config = toml::from_str(&raw)?;
            info!(path = %path.display(), "loaded config");
            return Ok(config);
        }

        for candidate in Self::default_locations() {
            if candidate.exists() {
                let raw = std::fs::read_to_string(&candidate)?;
                let config = toml::from_str(&raw)?;
                info!(path = %candidate.display(), "loaded config");
                return Ok(config);
            }
        }

        Ok(Self::default())
    }

    fn default_locations() -> Vec<PathBuf> {
        let mut locations = vec![PathBuf::from("argus.toml")];
        if let Some(home) = std::env::var_os("HOME") {
            locations.push(PathBuf::from(home).join(".argus.toml"));
        }
        locations
    }

    pub fn net_config(&self) -> NetConfig {
        NetConfig {
            proxy: self.http.proxy.clone(),
            tor_proxy: self.http.tor_proxy.clone(),
            ghost_mode: self.ghost_mode,
            timeout_secs: self.http.timeout_secs,
            insecure_skip_verify: self.http.insecure_skip_verify,
        }
    }

    pub fn scope_policy(&self) -> ScopePolicy {
        let mut policy = ScopePolicy::default();
        if !self.scope.blacklist.is_empty() {
            policy = policy.with_blacklist(self.scope.blacklist.clone());
        }
        if !self.scope.whitelist.is_empty() {
            policy = policy.with_whitelist(self.scope.whitelist.clone());
        }
        policy
    }

    pub fn ports_mode(&self) -> PortScanMode {
        match self.collectors.ports.mode.as_str() {
            "top-100" => PortScanMode::Top100,
            "custom" => PortScanMode::Custom(self.collectors.ports.custom_ports.clone()),
            _ => PortScanMode::Common,
        }
    }

    /// Push configured rate overrides into a governor.
    pub fn apply_rate_limits(&self, governor: &RateGovernor) {
        for (name, rate) in &self.collectors.rate_limits {
            governor.set_limit(name, *rate);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_usable() {
        let config = AppConfig::default();
        assert_eq!(config.database.path, "argus.db");
        assert_eq!(config.storage.evidence_root, "evidence_storage");
        assert!(!config.ghost_mode);
        assert!(matches!(config.ports_mode(), PortScanMode::Common));
    }

    #[test]
    fn test_parse_full_config() {
        let raw = r#"
ghost_mode = true

[database]
path = "/var/lib/argus/argus.db"

[scope]
whitelist = ["example.com"]

[collectors.rate_limits]
dns = 2.5

[collectors.ports]
mode = "custom"
custom_ports = [22, 8080]

[keys]
github = "ghp_abc123"

[llm]
model = "llama3:70b"
"#;
        let config: AppConfig = toml::from_str(raw).unwrap();
        assert!(config.ghost_mode);
        assert_eq!(config.database.path, "/var/lib/argus/argus.db");
        assert_eq!(config.keys.get("github").unwrap(), "ghp_abc123");
        assert_eq!(config.collectors.rate_limits.get("dns"), Some(&2.5));
        assert_eq!(config.llm.model, "llama3:70b");
        // Unset sections keep their defaults.
        assert_eq!(config.plugins.dir, "plugins");

        match config.ports_mode() {
            PortScanMode::Custom(ports) => assert_eq!(ports, vec![22, 8080]),
            other => panic!("unexpected mode {other:?}"),
        }
    }

    #[test]
    fn test_scope_policy_from_config() {
        let raw = "[scope]\nwhitelist = [\"example.com\"]\n";
        let config: AppConfig = toml::from_str(raw).unwrap();
        let policy = config.scope_policy();
        assert!(policy.check("example.com").is_ok());
        assert!(policy.check("other.org").is_err());
        // Default blacklist still applies.
        assert!(policy.check("example.com.gov").is_err());
    }

    #[test]
    fn test_ghost_mode_selects_tor_proxy() {
        let raw = "ghost_mode = true\n[http]\nproxy = \"http://corp:8080\"\n";
        let config: AppConfig = toml::from_str(raw).unwrap();
        let net = config.net_config();
        assert_eq!(net.effective_proxy(), Some("socks5h://127.0.0.1:9050"));
    }
}
