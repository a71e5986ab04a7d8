//! Configuration Types

use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv6Addr, SocketAddr};
use std::time::Duration;

/// Default upstream host
pub const DEFAULT_TARGET_HOST: &str = "127.0.0.1";
/// Default upstream port
pub const DEFAULT_TARGET_PORT: u16 = 9000;
/// Default local listen port
pub const DEFAULT_LISTEN_PORT: u16 = 9001;
/// Default bound on dialing the upstream target
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Main configuration structure
///
/// Built once at startup and shared read-only (behind an `Arc`) by the
/// listener and every relay session.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ProxyConfig {
    pub server: ServerConfig,
    pub target: TargetConfig,
    pub access_control: AccessControlConfig,
    pub logging: LoggingConfig,
}

/// Listener configuration
///
/// The default `[::]` host accepts both IPv6 and IPv4 clients on hosts
/// with dual-stack sockets.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    pub listen_host: IpAddr,
    pub listen_port: u16,
    pub buffer_size: usize,
}

/// Upstream target configuration
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct TargetConfig {
    pub host: String,
    pub port: u16,
    #[serde(with = "humantime_serde")]
    pub connect_timeout: Duration,
}

/// Source IP allowlist. An empty list allows every client.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct AccessControlConfig {
    pub allowed_ips: Vec<String>,
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

impl ProxyConfig {
    /// Socket address the listener binds to
    pub fn bind_addr(&self) -> SocketAddr {
        SocketAddr::new(self.server.listen_host, self.server.listen_port)
    }

    /// Upstream address in `host:port` form
    pub fn target_addr(&self) -> String {
        self.target.address()
    }
}

impl TargetConfig {
    /// `host:port`, bracketing IPv6 literals
    pub fn address(&self) -> String {
        match self.host.parse::<IpAddr>() {
            Ok(IpAddr::V6(ip)) => format!("[{}]:{}", ip, self.port),
            _ => format!("{}:{}", self.host, self.port),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_host: IpAddr::V6(Ipv6Addr::UNSPECIFIED),
            listen_port: DEFAULT_LISTEN_PORT,
            buffer_size: 8192,
        }
    }
}

impl Default for TargetConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_TARGET_HOST.to_string(),
            port: DEFAULT_TARGET_PORT,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}
