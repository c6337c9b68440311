//! Gateway configuration
//!
//! Defaults, then an optional TOML file, then `.env` and the process
//! environment. The `[resolver]` table carries the pipeline settings.

use anyhow::Context;
use curevia_core::ResolverConfig;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use crate::{DEFAULT_HOST, DEFAULT_PORT};

/// Main gateway configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Server host
    pub host: String,

    /// Server port
    pub port: u16,

    /// Request body cap in bytes
    pub max_payload_bytes: usize,

    /// General requests per client per minute
    pub rate_limit_general: u32,

    /// Requests per client per minute that reach the completion provider
    pub rate_limit_generative: u32,

    /// Lead capture webhook; leads are only logged when unset
    pub contact_webhook_url: Option<String>,

    /// Include technical detail in error bodies
    pub debug_errors: bool,

    /// Interval of the counter and session sweep
    pub sweep_interval_secs: u64,

    pub resolver: ResolverConfig,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            max_payload_bytes: 128 * 1024,
            rate_limit_general: 40,
            rate_limit_generative: 10,
            contact_webhook_url: None,
            debug_errors: false,
            sweep_interval_secs: 60,
            resolver: ResolverConfig::default(),
        }
    }
}

impl GatewayConfig {
    /// Create a new configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_max_payload_bytes(mut self, max: usize) -> Self {
        self.max_payload_bytes = max;
        self
    }

    pub fn with_rate_limits(mut self, general: u32, generative: u32) -> Self {
        self.rate_limit_general = general;
        self.rate_limit_generative = generative;
        self
    }

    pub fn with_contact_webhook(mut self, url: impl Into<String>) -> Self {
        self.contact_webhook_url = Some(url.into());
        self
    }

    pub fn with_debug_errors(mut self, debug: bool) -> Self {
        self.debug_errors = debug;
        self
    }

    pub fn with_resolver(mut self, resolver: ResolverConfig) -> Self {
        self.resolver = resolver;
        self
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs.max(1))
    }

    /// Get the socket address
    pub fn socket_addr(&self) -> anyhow::Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .with_context(|| format!("Invalid listen address {}:{}", self.host, self.port))
    }

    /// Load configuration from a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Reading config '{}'", path.display()))?;
        toml::from_str(&content).with_context(|| format!("Parsing config '{}'", path.display()))
    }

    /// Save configuration to a TOML file; the provider key is never written
    pub fn to_file(&self, path: impl AsRef<Path>) -> anyhow::Result<()> {
        let content = self.to_toml()?;
        std::fs::write(path.as_ref(), content)
            .with_context(|| format!("Writing config '{}'", path.as_ref().display()))?;
        Ok(())
    }

    pub fn to_toml(&self) -> anyhow::Result<String> {
        toml::to_string_pretty(self).context("Serializing config")
    }

    /// Defaults, then the optional file, then `.env` and the environment
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let _ = dotenvy::dotenv();
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env_from(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Apply overrides from an arbitrary lookup; unparsable values are ignored
    pub fn apply_env_from(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        if let Some(v) = get("PORT").and_then(|v| v.parse().ok()) {
            self.port = v;
        }
        if let Some(v) = get("CUREVIA_RATE_LIMIT_GENERAL").and_then(|v| v.parse().ok()) {
            self.rate_limit_general = v;
        }
        if let Some(v) = get("CUREVIA_RATE_LIMIT_GENERATIVE").and_then(|v| v.parse().ok()) {
            self.rate_limit_generative = v;
        }
        if let Some(v) = get("CONTACT_WEBHOOK_URL") {
            self.contact_webhook_url = Some(v);
        }
        if let Some(v) = get("CUREVIA_DEBUG_ERRORS") {
            self.debug_errors = matches!(v.as_str(), "1" | "true" | "yes");
        }
        self.resolver.apply_env_from(&lookup);
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.max_payload_bytes == 0 {
            anyhow::bail!("max_payload_bytes must be positive");
        }
        if self.rate_limit_general == 0 {
            anyhow::bail!("rate_limit_general must be positive");
        }
        self.resolver.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let config = GatewayConfig::default();
        assert_eq!(config.port, DEFAULT_PORT);
        assert_eq!(config.max_payload_bytes, 131_072);
        assert_eq!(config.rate_limit_general, 40);
        assert_eq!(config.rate_limit_generative, 10);
        assert!(!config.debug_errors);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_env_overrides_reach_resolver() {
        let env: HashMap<&str, &str> = [
            ("PORT", "9000"),
            ("CUREVIA_RATE_LIMIT_GENERATIVE", "3"),
            ("CUREVIA_RATE_LIMIT_GENERAL", "lots"),
            ("CONTACT_WEBHOOK_URL", "https://hooks.example.com/lead"),
            ("CUREVIA_MODEL", "gpt-test"),
        ]
        .into_iter()
        .collect();

        let mut config = GatewayConfig::default();
        config.apply_env_from(|k| env.get(k).map(|v| v.to_string()));

        assert_eq!(config.port, 9000);
        assert_eq!(config.rate_limit_generative, 3);
        assert_eq!(config.rate_limit_general, 40);
        assert_eq!(config.contact_webhook_url.as_deref(), Some("https://hooks.example.com/lead"));
        assert_eq!(config.resolver.provider.model, "gpt-test");
    }

    #[test]
    fn test_toml_roundtrip_omits_key() {
        let mut config = GatewayConfig::default().with_port(8080);
        config.resolver.provider.api_key = Some("sk-secret".into());
        let text = config.to_toml().unwrap();
        assert!(!text.contains("sk-secret"));

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gateway.toml");
        std::fs::write(&path, &text).unwrap();
        let loaded = GatewayConfig::from_file(&path).unwrap();
        assert_eq!(loaded.port, 8080);
        assert_eq!(loaded.resolver.provider.api_key, None);
    }

    #[test]
    fn test_socket_addr() {
        assert!(GatewayConfig::default().socket_addr().is_ok());
        assert!(GatewayConfig::default().with_host("not a host").socket_addr().is_err());
    }
}
