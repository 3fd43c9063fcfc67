//! PROXY Protocol Configuration
//!
//! Configuration types for HAProxy PROXY protocol v1/v2 intake.

use serde::Deserialize;
use std::time::Duration;

/// PROXY protocol configuration for a listener
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ProxyProtocolConfig {
    /// Enable PROXY header intake on this listener
    pub enabled: bool,

    /// Reject connections that do not open with a PROXY header.
    /// When false, such connections fall back to their socket addresses;
    /// a client that sends nothing is passed through once `timeout` expires.
    pub required: bool,

    /// Timeout for reading PROXY header in seconds.
    /// Default: 5 seconds
    pub timeout: u64,
}

impl Default for ProxyProtocolConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            required: true,
            timeout: 5,
        }
    }
}

impl ProxyProtocolConfig {
    /// Get timeout as Duration
    pub fn timeout_duration(&self) -> Duration {
        Duration::from_secs(self.timeout)
    }
}
