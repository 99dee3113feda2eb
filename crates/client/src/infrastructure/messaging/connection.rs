//! Connection lifecycle types.

use std::fmt;
use std::time::Duration;

use thiserror::Error;

/// Connection state of the sensor link.
///
/// Only the connection manager transitions it; everyone else reads it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Not connected to the server
    Disconnected,
    /// Attempting to establish connection
    Connecting,
    /// Successfully connected
    Connected,
    /// Connection lost, waiting for the next automatic attempt
    Reconnecting,
}

impl ConnectionState {
    /// Convert to u8 for atomic storage.
    pub fn to_u8(self) -> u8 {
        match self {
            ConnectionState::Disconnected => 0,
            ConnectionState::Connecting => 1,
            ConnectionState::Connected => 2,
            ConnectionState::Reconnecting => 3,
        }
    }

    /// Convert from u8 (atomic storage).
    pub fn from_u8(v: u8) -> Self {
        match v {
            1 => ConnectionState::Connecting,
            2 => ConnectionState::Connected,
            3 => ConnectionState::Reconnecting,
            _ => ConnectionState::Disconnected,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Reconnecting => "reconnecting",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Snapshot returned by `ConnectionManager::status`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionStatus {
    pub state: ConnectionState,
    /// Automatic attempts made since the last successful open
    pub reconnect_attempts: u32,
    pub max_reconnect_attempts: u32,
}

impl ConnectionStatus {
    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum ConnectionError {
    #[error("Invalid server URL: {0}")]
    InvalidUrl(String),

    #[error("WebSocket transport error: {0}")]
    Transport(String),

    #[error("Connection attempt timed out after {}ms", .0.as_millis())]
    ConnectTimeout(Duration),

    #[error("Not connected to the sensor server")]
    NotConnected,

    #[error("Connection writer channel closed")]
    ChannelClosed,

    #[error("Connection attempt cancelled by disconnect")]
    Cancelled,
}
