//! Command names understood by the sensor server.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Known server commands.
///
/// The wire protocol is string-based, so [`crate::messages::OutboundCommand`]
/// still accepts arbitrary names; this enum covers the commands the client
/// offers convenience methods for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandName {
    StartMeasuring,
    StopMeasuring,
    TareScale,
    Init,
    StartZeroMeasurement,
    CalibrateScale,
    GetCurrentWeight,
    GetHistory,
}

impl CommandName {
    pub const ALL: [CommandName; 8] = [
        CommandName::StartMeasuring,
        CommandName::StopMeasuring,
        CommandName::TareScale,
        CommandName::Init,
        CommandName::StartZeroMeasurement,
        CommandName::CalibrateScale,
        CommandName::GetCurrentWeight,
        CommandName::GetHistory,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CommandName::StartMeasuring => "start_measuring",
            CommandName::StopMeasuring => "stop_measuring",
            CommandName::TareScale => "tare_scale",
            CommandName::Init => "init",
            CommandName::StartZeroMeasurement => "start_zero_measurement",
            CommandName::CalibrateScale => "calibrate_scale",
            CommandName::GetCurrentWeight => "get_current_weight",
            CommandName::GetHistory => "get_history",
        }
    }
}

impl fmt::Display for CommandName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CommandName {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|name| name.as_str() == s)
            .ok_or_else(|| format!("Unknown command: {s}"))
    }
}
