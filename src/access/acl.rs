//! Access Control List Implementation

use crate::config::AccessControlConfig;

/// Returns whether `client_ip` may use the relay.
///
/// An empty allowlist admits every client. Otherwise the textual client IP
/// must equal one entry exactly: no CIDR ranges and no address
/// normalization, so `::ffff:10.0.0.5` does not match `10.0.0.5`.
pub fn is_allowed<S: AsRef<str>>(client_ip: &str, allowlist: &[S]) -> bool {
    allowlist.is_empty() || allowlist.iter().any(|allowed| allowed.as_ref() == client_ip)
}

/// Immutable allowlist built once from configuration
#[derive(Debug, Clone, Default)]
pub struct AccessList {
    allowed_ips: Vec<String>,
}

impl AccessList {
    /// Create a new access list from configuration
    pub fn new(config: &AccessControlConfig) -> Self {
        Self {
            allowed_ips: config.allowed_ips.clone(),
        }
    }

    /// Check whether the client IP is allowed
    pub fn is_allowed(&self, client_ip: &str) -> bool {
        is_allowed(client_ip, self.allowed_ips.as_slice())
    }
}
