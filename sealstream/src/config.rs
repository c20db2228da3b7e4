//! Session configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default peer address for the initiator.
pub const DEFAULT_ADDRESS: &str = "127.0.0.1";
/// Default TCP port for both roles.
pub const DEFAULT_PORT: u16 = 8080;
/// Largest application frame accepted from a peer (16 MiB).
pub const DEFAULT_MAX_FRAME_LEN: usize = 16 * 1024 * 1024;

/// Configuration for one session attempt.
///
/// Every field has a default, so a partial JSON document is valid.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Peer host the initiator dials.
    pub address: String,
    /// Port the initiator dials and the responder listens on.
    pub port: u16,
    /// Milliseconds allowed for the TCP connect.
    pub connect_timeout_ms: u64,
    /// Milliseconds allowed for the whole three-message handshake.
    pub handshake_timeout_ms: u64,
    /// Largest declared frame length accepted before it is read.
    pub max_frame_len: usize,
    /// Depth of the decrypted inbound message channel.
    pub inbound_capacity: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            address: DEFAULT_ADDRESS.to_string(),
            port: DEFAULT_PORT,
            connect_timeout_ms: 10_000,
            handshake_timeout_ms: 30_000,
            max_frame_len: DEFAULT_MAX_FRAME_LEN,
            inbound_capacity: 64,
        }
    }
}

impl SessionConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_millis(self.handshake_timeout_ms)
    }

    pub fn with_address(mut self, address: impl Into<String>) -> Self {
        self.address = address.into();
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout_ms = duration_ms(timeout);
        self
    }

    pub fn with_handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout_ms = duration_ms(timeout);
        self
    }

    pub fn with_max_frame_len(mut self, max: usize) -> Self {
        self.max_frame_len = max;
        self
    }
}

/// Whole milliseconds in `d`, saturating; sub-millisecond parts are dropped.
fn duration_ms(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}
