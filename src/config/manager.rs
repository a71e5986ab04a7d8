//! Configuration Manager

use super::ProxyConfig;
use crate::Result;
use anyhow::{bail, Context};
use std::net::IpAddr;
use std::path::Path;
use std::time::Duration;
use tracing::{info, warn};

pub const ENV_TARGET_HOST: &str = "TARGET_HOST";
pub const ENV_TARGET_PORT: &str = "TARGET_PORT";
pub const ENV_LISTEN_PORT: &str = "LISTEN_PORT";
pub const ENV_ALLOWED_IPS: &str = "ALLOWED_IPS";

/// Manages configuration loading and validation
pub struct ConfigManager;

impl ConfigManager {
    /// Load configuration from a TOML file
    pub fn load_from_file(path: &Path) -> Result<ProxyConfig> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: ProxyConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Parse a comma-separated allowlist, trimming whitespace around entries
    pub fn parse_allowed_ips(raw: &str) -> Vec<String> {
        if raw.trim().is_empty() {
            return Vec::new();
        }
        raw.split(',')
            .map(|ip| ip.trim().to_string())
            .collect()
    }

    fn parse_port(key: &str, raw: &str) -> Option<u16> {
        match raw.trim().parse::<u16>() {
            Ok(0) | Err(_) => {
                warn!("Invalid {}: {:?}, keeping current value", key, raw);
                None
            }
            Ok(port) => Some(port),
        }
    }
}

impl ProxyConfig {
    /// Override values from environment-style lookups.
    ///
    /// Empty values count as unset. Malformed or zero ports keep the
    /// current value and log a warning instead of failing.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|value| !value.is_empty());

        if let Some(host) = get(ENV_TARGET_HOST) {
            self.target.host = host;
        }

        if let Some(port) = get(ENV_TARGET_PORT) {
            if let Some(port) = ConfigManager::parse_port(ENV_TARGET_PORT, &port) {
                self.target.port = port;
            }
        }

        if let Some(port) = get(ENV_LISTEN_PORT) {
            if let Some(port) = ConfigManager::parse_port(ENV_LISTEN_PORT, &port) {
                self.server.listen_port = port;
            }
        }

        if let Some(allowed) = get(ENV_ALLOWED_IPS) {
            self.access_control.allowed_ips = ConfigManager::parse_allowed_ips(&allowed);
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        self.validate_server_config()
            .context("Server configuration validation failed")?;

        self.validate_target_config()
            .context("Target configuration validation failed")?;

        self.validate_logging_config()
            .context("Logging configuration validation failed")?;

        Ok(())
    }

    fn validate_server_config(&self) -> Result<()> {
        if self.server.listen_port == 0 {
            bail!("listen_port must be between 1 and 65535");
        }

        if self.server.buffer_size < 1024 {
            bail!("buffer_size must be at least 1024 bytes");
        }

        if self.server.buffer_size > 1048576 {
            bail!("buffer_size cannot exceed 1MB");
        }

        Ok(())
    }

    fn validate_target_config(&self) -> Result<()> {
        if self.target.host.trim().is_empty() {
            bail!("target host must not be empty");
        }

        if self.target.port == 0 {
            bail!("target port must be between 1 and 65535");
        }

        if self.target.connect_timeout.is_zero() {
            bail!("connect_timeout must be greater than 0");
        }

        if self.target.connect_timeout > Duration::from_secs(300) {
            bail!("connect_timeout cannot exceed 5 minutes");
        }

        Ok(())
    }

    fn validate_logging_config(&self) -> Result<()> {
        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&self.logging.level.as_str()) {
            bail!("logging.level must be one of: {}", valid_log_levels.join(", "));
        }

        Ok(())
    }

    /// Merge with CLI arguments
    #[allow(clippy::too_many_arguments)]
    pub fn merge_with_cli_args(
        &mut self,
        bind: Option<IpAddr>,
        listen_port: Option<u16>,
        target_host: Option<&str>,
        target_port: Option<u16>,
        allowed_ips: Option<&str>,
        connect_timeout: Option<Duration>,
        log_level: Option<&str>,
    ) {
        if let Some(addr) = bind {
            self.server.listen_host = addr;
            info!("CLI override: listen host set to {}", addr);
        }

        if let Some(port) = listen_port {
            self.server.listen_port = port;
            info!("CLI override: listen port set to {}", port);
        }

        if let Some(host) = target_host {
            self.target.host = host.to_string();
            info!("CLI override: target host set to {}", host);
        }

        if let Some(port) = target_port {
            self.target.port = port;
            info!("CLI override: target port set to {}", port);
        }

        if let Some(allowed) = allowed_ips {
            self.access_control.allowed_ips = ConfigManager::parse_allowed_ips(allowed);
            info!("CLI override: allowed IPs set to {:?}", self.access_control.allowed_ips);
        }

        if let Some(timeout) = connect_timeout {
            self.target.connect_timeout = timeout;
            info!("CLI override: connect timeout set to {:?}", timeout);
        }

        if let Some(level) = log_level {
            self.logging.level = level.to_string();
        }
    }

    /// Log the effective configuration
    pub fn log_summary(&self) {
        info!("Proxy configuration:");
        info!(target_addr = %self.target_addr(), "Target: {}", self.target_addr());
        info!(
            allowed_ips = ?self.access_control.allowed_ips,
            "Allowed IPs: {:?}",
            self.access_control.allowed_ips
        );
        info!(listen_port = self.server.listen_port, "Listen port: {}", self.server.listen_port);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_without_env() {
        let mut config = ProxyConfig::default();
        config.apply_env(env(&[]));

        assert_eq!(config.target.host, "127.0.0.1");
        assert_eq!(config.target.port, 9000);
        assert_eq!(config.server.listen_port, 9001);
        assert!(config.access_control.allowed_ips.is_empty());
        assert_eq!(config.target.connect_timeout, Duration::from_secs(10));
        assert!(config.validate().is_ok());
        assert_eq!(config.bind_addr(), "[::]:9001".parse::<std::net::SocketAddr>().unwrap());
    }

    #[test]
    fn test_env_overrides() {
        let mut config = ProxyConfig::default();
        config.apply_env(env(&[
            (ENV_TARGET_HOST, "db.internal"),
            (ENV_TARGET_PORT, "5432"),
            (ENV_LISTEN_PORT, "15432"),
            (ENV_ALLOWED_IPS, "10.0.0.5, 10.0.0.6 ,10.0.0.7"),
        ]));

        assert_eq!(config.target.host, "db.internal");
        assert_eq!(config.target.port, 5432);
        assert_eq!(config.server.listen_port, 15432);
        assert_eq!(
            config.access_control.allowed_ips,
            vec!["10.0.0.5", "10.0.0.6", "10.0.0.7"]
        );
        assert_eq!(config.target_addr(), "db.internal:5432");
    }

    #[test]
    fn test_malformed_ports_fall_back() {
        let mut config = ProxyConfig::default();
        config.apply_env(env(&[
            (ENV_TARGET_PORT, "not-a-port"),
            (ENV_LISTEN_PORT, "0"),
        ]));
        assert_eq!(config.target.port, 9000);
        assert_eq!(config.server.listen_port, 9001);

        config.apply_env(env(&[(ENV_TARGET_PORT, "70000")]));
        assert_eq!(config.target.port, 9000);
    }

    #[test]
    fn test_empty_values_are_unset() {
        let mut config = ProxyConfig::default();
        config.apply_env(env(&[(ENV_TARGET_HOST, ""), (ENV_ALLOWED_IPS, "")]));
        assert_eq!(config.target.host, "127.0.0.1");
        assert!(config.access_control.allowed_ips.is_empty());
    }

    #[test]
    fn test_parse_allowed_ips() {
        assert!(ConfigManager::parse_allowed_ips("   ").is_empty());
        assert_eq!(ConfigManager::parse_allowed_ips("1.2.3.4"), vec!["1.2.3.4"]);
        assert_eq!(
            ConfigManager::parse_allowed_ips(" ::1 ,127.0.0.1"),
            vec!["::1", "127.0.0.1"]
        );
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let mut config = ProxyConfig::default();
        config.target.port = 0;
        assert!(config.validate().is_err());

        let mut config = ProxyConfig::default();
        config.target.host = " ".to_string();
        assert!(config.validate().is_err());

        let mut config = ProxyConfig::default();
        config.target.connect_timeout = Duration::ZERO;
        assert!(config.validate().is_err());

        let mut config = ProxyConfig::default();
        config.server.buffer_size = 16;
        assert!(config.validate().is_err());

        let mut config = ProxyConfig::default();
        config.logging.level = "verbose".to_string();
        assert!(config.validate().is_err());

        let mut config = ProxyConfig::default();
        config.merge_with_cli_args(None, Some(0), None, None, None, None, None);
        let err = config.validate().unwrap_err();
        assert!(format!("{:#}", err).contains("listen_port"));
    }

    #[test]
    fn test_cli_overrides_take_precedence() {
        let mut config = ProxyConfig::default();
        config.apply_env(env(&[(ENV_TARGET_PORT, "5000")]));
        config.merge_with_cli_args(
            Some("127.0.0.1".parse().unwrap()),
            Some(7000),
            None,
            Some(6000),
            Some("10.1.1.1"),
            Some(Duration::from_secs(3)),
            Some("debug"),
        );

        assert_eq!(config.bind_addr(), "127.0.0.1:7000".parse::<std::net::SocketAddr>().unwrap());
        assert_eq!(config.target.port, 6000);
        assert_eq!(config.access_control.allowed_ips, vec!["10.1.1.1"]);
        assert_eq!(config.target.connect_timeout, Duration::from_secs(3));
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn test_ipv6_target_address() {
        let mut config = ProxyConfig::default();
        config.target.host = "::1".to_string();
        assert_eq!(config.target_addr(), "[::1]:9000");
    }
}
