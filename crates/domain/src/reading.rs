//! Sensor readings streamed from the exercise device.
//!
//! A reading is produced once per telemetry frame and never mutated after
//! construction. Noise filtering returns a new value instead of editing the
//! stored one, so the raw values stay available for display and history.

use serde::{Deserialize, Serialize};

/// Pressure magnitude below which a hand sensor is treated as idle.
pub const DEFAULT_NOISE_FLOOR: f64 = 0.8;

// =============================================================================
// Hand Pressure
// =============================================================================

/// The three hand-grip pressure channels.
///
/// The device reports them as `sensor1` (top of the grip), `sensor2` (front)
/// and `sensor3` (back).
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct HandPressure {
    pub top: f64,
    pub front: f64,
    pub back: f64,
}

impl HandPressure {
    pub fn new(top: f64, front: f64, back: f64) -> Self {
        Self { top, front, back }
    }

    /// Collapse every channel below `noise_floor` to exactly zero.
    ///
    /// Negative and NaN values are always below the floor.
    pub fn filtered(&self, noise_floor: f64) -> Self {
        Self {
            top: filter_channel(self.top, noise_floor),
            front: filter_channel(self.front, noise_floor),
            back: filter_channel(self.back, noise_floor),
        }
    }

    /// True when every channel is strictly above `threshold`.
    pub fn all_above(&self, threshold: f64) -> bool {
        self.top > threshold && self.front > threshold && self.back > threshold
    }

    /// Channels in device order (top, front, back).
    pub fn channels(&self) -> [f64; 3] {
        [self.top, self.front, self.back]
    }
}

fn filter_channel(value: f64, noise_floor: f64) -> f64 {
    // `>=` keeps a value sitting exactly on the floor
    if value >= noise_floor && value > 0.0 {
        value
    } else {
        0.0
    }
}

// =============================================================================
// Sensor Reading
// =============================================================================

/// One telemetry sample.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SensorReading {
    /// Device timestamp as sent by the server (seconds since the epoch).
    pub timestamp: f64,
    /// First load cell (`waage1`). Most devices only carry one scale and omit it.
    pub primary_scale: Option<f64>,
    /// Second load cell (`waage2`), compared against the calibrated reference weight.
    pub secondary_scale: f64,
    /// Hand-grip pressures.
    pub pressure: HandPressure,
}

impl SensorReading {
    pub fn new(
        timestamp: f64,
        primary_scale: Option<f64>,
        secondary_scale: f64,
        pressure: HandPressure,
    ) -> Self {
        Self {
            timestamp,
            primary_scale,
            secondary_scale,
            pressure,
        }
    }

    /// Pressures with the noise floor applied.
    pub fn filtered_pressure(&self, noise_floor: f64) -> HandPressure {
        self.pressure.filtered(noise_floor)
    }
}

// =============================================================================
// Pressure Level
// =============================================================================

/// Coarse load indicator for a single pressure channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PressureLevel {
    /// Idle or light grip
    Low,
    /// Above half of the threshold
    Elevated,
    /// Above the threshold
    High,
}

impl PressureLevel {
    /// Classify one raw channel value after noise filtering.
    pub fn of(value: f64, threshold: f64, noise_floor: f64) -> Self {
        let filtered = filter_channel(value, noise_floor);
        if filtered > threshold {
            PressureLevel::High
        } else if filtered > threshold * 0.5 {
            PressureLevel::Elevated
        } else {
            PressureLevel::Low
        }
    }
}

impl std::fmt::Display for PressureLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PressureLevel::Low => write!(f, "low"),
            PressureLevel::Elevated => write!(f, "elevated"),
            PressureLevel::High => write!(f, "high"),
        }
    }
}
