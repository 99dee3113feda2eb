//! WebSocket frame types.
//!
//! Inbound frames are JSON objects discriminated by a `type` field. Outbound
//! frames are commands: `{ command, request_id, timestamp, ...extra }`.
//!
//! Inbound decoding goes through [`serde_json::Value`] first so that an
//! unrecognised `type` can be reported by name instead of failing as a
//! generic decode error.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// Keys owned by [`OutboundCommand`] that extra fields may not override.
pub const RESERVED_COMMAND_KEYS: [&str; 3] = ["command", "request_id", "timestamp"];

// =============================================================================
// Decode Errors
// =============================================================================

#[derive(Debug, Error)]
pub enum FrameError {
    #[error("Invalid JSON frame: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Frame has no string `type` field")]
    MissingType,
}

// =============================================================================
// Inbound Frames
// =============================================================================

/// A decoded server frame.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundFrame {
    /// Greeting sent after the socket opens
    Connection(ConnectionNotice),
    /// Periodic telemetry sample
    WeightData(WeightDataFrame),
    /// Answer to a command
    Response(CommandResponse),
    /// Server-side failure not tied to a specific command
    Error(ServerErrorFrame),
    /// Any other `type`; carried so the receiver can log it
    Unknown { kind: String },
}

impl InboundFrame {
    /// Decode one text frame.
    pub fn parse(text: &str) -> Result<Self, FrameError> {
        let value: Value = serde_json::from_str(text)?;
        Self::from_value(value)
    }

    pub fn from_value(value: Value) -> Result<Self, FrameError> {
        let kind = value
            .get("type")
            .and_then(Value::as_str)
            .map(str::to_owned)
            .ok_or(FrameError::MissingType)?;

        let frame = match kind.as_str() {
            "connection" => InboundFrame::Connection(serde_json::from_value(value)?),
            "weight_data" => InboundFrame::WeightData(serde_json::from_value(value)?),
            "response" => InboundFrame::Response(serde_json::from_value(value)?),
            "error" => InboundFrame::Error(serde_json::from_value(value)?),
            _ => InboundFrame::Unknown { kind },
        };
        Ok(frame)
    }

    /// The wire `type` of this frame.
    pub fn kind(&self) -> &str {
        match self {
            InboundFrame::Connection(_) => "connection",
            InboundFrame::WeightData(_) => "weight_data",
            InboundFrame::Response(_) => "response",
            InboundFrame::Error(_) => "error",
            InboundFrame::Unknown { kind } => kind,
        }
    }
}

/// `{"type": "connection", "message": ...}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionNotice {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Remaining fields, including `type`
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Raw pressure channels as reported by the device.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct PressureSensors {
    #[serde(default)]
    pub sensor1: Option<f64>,
    #[serde(default)]
    pub sensor2: Option<f64>,
    #[serde(default)]
    pub sensor3: Option<f64>,
}

/// `{"type": "weight_data", ...}`
///
/// Every field is optional on the wire; a sensor that failed to read is sent
/// as `null`.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct WeightDataFrame {
    #[serde(rename = "waage1", default, skip_serializing_if = "Option::is_none")]
    pub primary_scale: Option<f64>,
    #[serde(rename = "waage2", default)]
    pub secondary_scale: Option<f64>,
    #[serde(rename = "drucksensoren", default)]
    pub pressure_sensors: Option<PressureSensors>,
    #[serde(default)]
    pub timestamp: Option<f64>,
}

/// `{"type": "response", "command": ..., "status": ..., ...}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandResponse {
    #[serde(default)]
    pub command: String,
    #[serde(default)]
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Echo of the outbound `request_id`; absent on servers that do not echo it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    /// Command-specific payload (e.g. `reference_unit`, `zero_value`, `waage2`)
    #[serde(flatten)]
    pub payload: Map<String, Value>,
}

/// Status value that marks a successful response.
pub const STATUS_SUCCESS: &str = "success";

impl CommandResponse {
    pub fn is_success(&self) -> bool {
        self.status == STATUS_SUCCESS
    }

    /// Look up a command-specific field.
    pub fn field(&self, key: &str) -> Option<&Value> {
        self.payload.get(key)
    }

    /// Numeric command-specific field, if present and numeric.
    pub fn number(&self, key: &str) -> Option<f64> {
        self.field(key).and_then(Value::as_f64)
    }
}

/// `{"type": "error", "message": ...}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerErrorFrame {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

// =============================================================================
// Outbound Frames
// =============================================================================

/// A command sent to the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboundCommand {
    pub command: String,
    pub request_id: String,
    /// Milliseconds since the Unix epoch
    pub timestamp: i64,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl OutboundCommand {
    /// Build a command frame.
    ///
    /// Extra fields named like a reserved key are dropped.
    pub fn new(
        command: impl Into<String>,
        request_id: impl Into<String>,
        timestamp: i64,
        mut extra: Map<String, Value>,
    ) -> Self {
        let command = command.into();
        for key in RESERVED_COMMAND_KEYS {
            if extra.remove(key).is_some() {
                tracing::warn!(
                    command = %command,
                    key = key,
                    "Ignoring extra field that collides with a reserved command key"
                );
            }
        }

        Self {
            command,
            request_id: request_id.into(),
            timestamp,
            extra,
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
