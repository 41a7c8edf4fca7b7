use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::error::{ZkenvError, ZkenvResult};
use crate::types::Protocol;

/// Top-level configuration (loaded from zkenv.toml)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ZkenvConfig {
    pub service: ServiceConfig,
    pub encrypt: EncryptConfig,
    pub log: LogConfig,
    pub server: ServerConfig,
}

impl ZkenvConfig {
    /// Load from `path`, falling back to defaults when the file does not exist.
    pub fn load(path: &Path) -> ZkenvResult<Self> {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "config file not found, using defaults");
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content)
            .map_err(|e| ZkenvError::Config(format!("parsing {}: {e}", path.display())))
    }
}

/// Where and how to reach the token custodian.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Base URL of the custodian API, e.g. `https://zk.example.com/api`
    pub api_base: String,
    /// Refuse plaintext `http://` bases
    pub enforce_tls: bool,
    /// Whole-request timeout in seconds
    pub timeout_secs: u64,
    /// TCP connect timeout in seconds
    pub connect_timeout_secs: u64,
    /// Retry once on connect or timeout failures
    pub retry_transient: bool,
    /// Lifetime to request for issued pairs; the custodian default when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ttl_hours: Option<u32>,
}

impl ServiceConfig {
    pub fn with_api_base(api_base: impl Into<String>) -> Self {
        Self {
            api_base: api_base.into(),
            ..Default::default()
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    /// Check the API base against the TLS policy.
    ///
    /// A plaintext base is an error under `enforce_tls` and a warning otherwise.
    pub fn check_transport(&self) -> ZkenvResult<()> {
        if !(self.api_base.starts_with("http://") || self.api_base.starts_with("https://")) {
            return Err(ZkenvError::Config(format!(
                "api_base must be an http(s) URL, got '{}'",
                self.api_base
            )));
        }
        if self.api_base.starts_with("http://") {
            if self.enforce_tls {
                return Err(ZkenvError::Config(format!(
                    "api_base uses plaintext HTTP ({}), but enforce_tls is enabled. \
                     Use an HTTPS endpoint or set service.enforce_tls = false for local development.",
                    self.api_base
                )));
            }
            tracing::warn!(
                api_base = %self.api_base,
                "token service uses plaintext HTTP; tokens are transmitted unencrypted"
            );
        }
        Ok(())
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            api_base: "http://localhost:3001/api".into(),
            enforce_tls: false,
            timeout_secs: 30,
            connect_timeout_secs: 10,
            retry_transient: true,
            ttl_hours: None,
        }
    }
}

/// Defaults for `zkenv encrypt`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EncryptConfig {
    /// "pin" (tokenA‖PIN) or "pair" (legacy pair-only)
    pub protocol: Protocol,
    /// Ask the custodian to keep pairs resolvable after a successful decrypt
    pub multi_use: bool,
    /// Per-variable token calls kept in flight at once
    pub concurrency: usize,
}

impl Default for EncryptConfig {
    fn default() -> Self {
        Self {
            protocol: Protocol::PinV2,
            multi_use: false,
            concurrency: 4,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Log level (default: info)
    pub level: String,
    /// Log format: "json" or "text"
    pub format: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: "text".into(),
        }
    }
}

/// Custodian service settings (zkenvd)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Listen address (default: 127.0.0.1:3001)
    pub listen: String,
    /// Lifetime of a pair when the request does not ask for one
    pub default_ttl_hours: u32,
    /// Upper bound on a requested lifetime
    pub max_ttl_hours: u32,
    /// Requests allowed per client IP per window
    pub rate_limit_max: u32,
    /// Rate limit window in seconds
    pub rate_limit_window_secs: u64,
    /// Serve Prometheus text on /metrics
    pub metrics: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: "127.0.0.1:3001".into(),
            default_ttl_hours: 24,
            max_ttl_hours: 720,
            rate_limit_max: 10,
            rate_limit_window_secs: 3600,
            metrics: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_config() {
        let toml_str = r#"
[service]
api_base = "https://zk.example.com/api"
enforce_tls = true
timeout_secs = 5
retry_transient = false
ttl_hours = 48

[encrypt]
protocol = "pair"
multi_use = true
concurrency = 8

[log]
level = "debug"
format = "json"

[server]
listen = "0.0.0.0:8080"
rate_limit_max = 100
metrics = false
"#;
        let config: ZkenvConfig = toml::from_str(toml_str).unwrap();

        assert_eq!(config.service.api_base, "https://zk.example.com/api");
        assert!(config.service.enforce_tls);
        assert_eq!(config.service.timeout(), Duration::from_secs(5));
        assert!(!config.service.retry_transient);
        assert_eq!(config.service.ttl_hours, Some(48));
        assert_eq!(config.encrypt.protocol, Protocol::PairV1);
        assert!(config.encrypt.multi_use);
        assert_eq!(config.encrypt.concurrency, 8);
        assert_eq!(config.log.format, "json");
        assert_eq!(config.server.listen, "0.0.0.0:8080");
        assert_eq!(config.server.rate_limit_max, 100);
        assert!(!config.server.metrics);
    }

    #[test]
    fn test_parse_defaults() {
        let config: ZkenvConfig = toml::from_str("").unwrap();

        assert_eq!(config.service.api_base, "http://localhost:3001/api");
        assert!(!config.service.enforce_tls);
        assert!(config.service.retry_transient);
        assert_eq!(config.encrypt.protocol, Protocol::PinV2);
        assert!(!config.encrypt.multi_use);
        assert_eq!(config.log.level, "info");
        assert_eq!(config.server.default_ttl_hours, 24);
    }

    #[test]
    fn test_parse_partial_config() {
        let toml_str = r#"
[service]
api_base = "http://10.0.0.5:3001/api"
"#;
        let config: ZkenvConfig = toml::from_str(toml_str).unwrap();

        // Overridden
        assert_eq!(config.service.api_base, "http://10.0.0.5:3001/api");
        // Defaults
        assert_eq!(config.service.connect_timeout_secs, 10);
        assert_eq!(config.service.ttl_hours, None);
        assert_eq!(config.encrypt.concurrency, 4);
    }

    #[test]
    fn test_serialize_roundtrip() {
        let config = ZkenvConfig::default();
        let toml_str = toml::to_string(&config).unwrap();
        let parsed: ZkenvConfig = toml::from_str(&toml_str).unwrap();

        assert_eq!(config.service.api_base, parsed.service.api_base);
        assert_eq!(config.encrypt.protocol, parsed.encrypt.protocol);
        assert_eq!(config.server.listen, parsed.server.listen);
    }

    #[test]
    fn test_check_transport() {
        let http = ServiceConfig::with_api_base("http://localhost:3001/api");
        assert!(http.check_transport().is_ok());

        let enforced = ServiceConfig {
            enforce_tls: true,
            ..http.clone()
        };
        let err = enforced.check_transport().unwrap_err();
        assert!(err.to_string().contains("enforce_tls"));

        let https = ServiceConfig {
            api_base: "https://zk.example.com/api".into(),
            enforce_tls: true,
            ..Default::default()
        };
        assert!(https.check_transport().is_ok());

        assert!(ServiceConfig::with_api_base("localhost:3001")
            .check_transport()
            .is_err());
    }

    #[test]
    fn test_load_missing_and_present() {
        let dir = tempfile::tempdir().unwrap();
        let missing = ZkenvConfig::load(&dir.path().join("nope.toml")).unwrap();
        assert_eq!(missing.service.api_base, "http://localhost:3001/api");

        let path = dir.path().join("zkenv.toml");
        std::fs::write(&path, "[encrypt]\nmulti_use = true\n").unwrap();
        let loaded = ZkenvConfig::load(&path).unwrap();
        assert!(loaded.encrypt.multi_use);

        std::fs::write(&path, "[encrypt\n").unwrap();
        assert!(matches!(
            ZkenvConfig::load(&path),
            Err(ZkenvError::Config(_))
        ));
    }
}
