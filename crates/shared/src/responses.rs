//! Command outcome errors.

use std::time::Duration;

use thiserror::Error;

/// Message used when the server rejects a command without saying why.
pub const GENERIC_FAILURE_MESSAGE: &str = "command failed";

#[derive(Debug, Clone, Error, PartialEq)]
pub enum CommandError {
    #[error("Not connected to the sensor server")]
    NotConnected,

    #[error("Command '{command}' timed out after {}ms", after.as_millis())]
    Timeout { command: String, after: Duration },

    #[error("Command '{command}' failed: {message}")]
    Rejected { command: String, message: String },

    #[error("Failed to send command: {0}")]
    SendFailed(String),

    #[error("Failed to serialize command: {0}")]
    Serialization(String),

    #[error("Command cancelled")]
    Cancelled,
}

impl CommandError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, CommandError::Timeout { .. })
    }

    pub fn is_rejected(&self) -> bool {
        matches!(self, CommandError::Rejected { .. })
    }

    /// Build a rejection, substituting the generic message when the server sent none.
    pub fn rejected(command: impl Into<String>, message: Option<String>) -> Self {
        CommandError::Rejected {
            command: command.into(),
            message: message
                .filter(|m| !m.is_empty())
                .unwrap_or_else(|| GENERIC_FAILURE_MESSAGE.to_string()),
        }
    }
}

impl From<serde_json::Error> for CommandError {
    fn from(err: serde_json::Error) -> Self {
        CommandError::Serialization(err.to_string())
    }
}
