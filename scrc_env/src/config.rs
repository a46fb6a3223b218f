//! Transport configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for the UDP transport.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransportConfig {
    /// Race server host name or IP (default: "localhost")
    pub host: String,

    /// Race server UDP port (default: 3001)
    pub port: u16,

    /// Receive window (default: 1 second)
    pub recv_timeout: Duration,

    /// Largest datagram accepted from the server in bytes (default: 1000)
    pub max_datagram: usize,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 3001,
            recv_timeout: Duration::from_secs(1),
            max_datagram: 1000,
        }
    }
}

impl TransportConfig {
    /// Creates a config for the given endpoint with default timings.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            ..Self::default()
        }
    }

    /// Sets the receive window.
    pub fn with_recv_timeout(mut self, timeout: Duration) -> Self {
        self.recv_timeout = timeout;
        self
    }

    /// Sets the maximum accepted datagram size.
    pub fn with_max_datagram(mut self, bytes: usize) -> Self {
        self.max_datagram = bytes;
        self
    }

    /// Returns `host:port`.
    pub fn endpoint(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
