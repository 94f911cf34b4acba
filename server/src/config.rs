//! Server configuration
//!
//! Everything the embedding process can tune about a game server instance.
//! The `server` binary maps each field to a command line flag.

use crate::error::ConfigError;
use std::time::Duration;

/// Reference read size of one inbound message.
pub const DEFAULT_MAX_MESSAGE_BYTES: usize = 2048;
pub const DEFAULT_OUTBOUND_QUEUE: usize = 64;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Interface to bind the listening socket to
    pub host: String,
    /// Port to listen on, `0` picks an ephemeral port
    pub port: u16,
    /// Messages buffered per session before the session is evicted
    pub outbound_queue: usize,
    /// Longest accepted inbound line, newline excluded
    pub max_message_bytes: usize,
    /// Disconnect sessions that stay silent this long
    pub idle_timeout: Option<Duration>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 0,
            outbound_queue: DEFAULT_OUTBOUND_QUEUE,
            max_message_bytes: DEFAULT_MAX_MESSAGE_BYTES,
            idle_timeout: None,
        }
    }
}

impl ServerConfig {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            ..Self::default()
        }
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.host.trim().is_empty() {
            return Err(ConfigError::MissingField {
                field: "host".to_string(),
            });
        }

        if self.outbound_queue == 0 {
            return Err(ConfigError::InvalidLimit {
                field: "outbound_queue".to_string(),
                value: self.outbound_queue,
            });
        }

        if self.max_message_bytes == 0 {
            return Err(ConfigError::InvalidLimit {
                field: "max_message_bytes".to_string(),
                value: self.max_message_bytes,
            });
        }

        if self.idle_timeout == Some(Duration::ZERO) {
            return Err(ConfigError::InvalidDuration {
                field: "idle_timeout".to_string(),
            });
        }

        Ok(())
    }
}
