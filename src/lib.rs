//! tcprelay Library
//!
//! Transparent TCP relay: accepts client connections, filters them against
//! an optional source IP allowlist and splices each one to a fixed upstream
//! target until both directions are done.

pub mod access;
pub mod config;
pub mod connection;
pub mod relay;

pub use access::AccessList;
pub use config::ProxyConfig;
pub use connection::ConnectionManager;
pub use relay::RelayEngine;

/// Common error type for the relay
pub type Result<T> = anyhow::Result<T>;
