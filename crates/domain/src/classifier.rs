//! Exercise feedback classification.
//!
//! Maps a sensor reading plus the caller's session context to exactly one
//! [`FeedbackCategory`]. Rules are evaluated top to bottom and the first
//! matching rule wins:
//!
//! 1. Noise filtering (pressure values below the floor become zero)
//! 2. [`FeedbackCategory::ExcessivePull`]: all channels above the threshold and
//!    the top channel dominating both others by the pull factor
//! 3. [`FeedbackCategory::Encouragement`]: all channels above the threshold
//! 4. [`FeedbackCategory::ImbalanceWarning`]: secondary scale outside the warning band
//! 5. [`FeedbackCategory::BalancedPraise`]: secondary scale inside the praise band
//! 6. [`FeedbackCategory::CorrectPosition`]: everything else
//!
//! The classifier keeps no state between calls. Message wording lives in
//! [`crate::messages`] so that this module stays deterministic.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::DomainError;
use crate::reading::{HandPressure, PressureLevel, SensorReading, DEFAULT_NOISE_FLOOR};

/// Lowest pressure threshold the exercise allows.
pub const MIN_PRESSURE_THRESHOLD: f64 = 1.0;

// =============================================================================
// Feedback Category
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedbackCategory {
    /// User is lifting with hand force instead of leg drive
    ExcessivePull,
    /// Sustained grip on all channels; keep going but relax the hand
    Encouragement,
    /// Load on the secondary scale is far from the reference weight
    ImbalanceWarning,
    /// Load on the secondary scale is very close to the reference weight
    BalancedPraise,
    /// Nothing to correct
    CorrectPosition,
}

impl FeedbackCategory {
    /// Stable key used by presentation layers to look up wording.
    pub fn message_key(&self) -> &'static str {
        match self {
            FeedbackCategory::ExcessivePull => "feedback.excessive_pull",
            FeedbackCategory::Encouragement => "feedback.encouragement",
            FeedbackCategory::ImbalanceWarning => "feedback.imbalance_warning",
            FeedbackCategory::BalancedPraise => "feedback.balanced_praise",
            FeedbackCategory::CorrectPosition => "feedback.correct_position",
        }
    }

    /// True for categories that ask the user to change something.
    pub fn is_warning(&self) -> bool {
        matches!(
            self,
            FeedbackCategory::ExcessivePull | FeedbackCategory::ImbalanceWarning
        )
    }

    pub fn all() -> [FeedbackCategory; 5] {
        [
            FeedbackCategory::ExcessivePull,
            FeedbackCategory::Encouragement,
            FeedbackCategory::ImbalanceWarning,
            FeedbackCategory::BalancedPraise,
            FeedbackCategory::CorrectPosition,
        ]
    }
}

impl std::fmt::Display for FeedbackCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            FeedbackCategory::ExcessivePull => "excessive_pull",
            FeedbackCategory::Encouragement => "encouragement",
            FeedbackCategory::ImbalanceWarning => "imbalance_warning",
            FeedbackCategory::BalancedPraise => "balanced_praise",
            FeedbackCategory::CorrectPosition => "correct_position",
        };
        write!(f, "{}", name)
    }
}

// =============================================================================
// Classification Mode
// =============================================================================

/// Which inputs drive classification.
///
/// Devices differ in whether the grip pressures or the secondary scale are
/// the meaningful signal for an exercise, so both are selectable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClassificationMode {
    /// Pressure rules first, then scale rules
    #[default]
    Combined,
    /// Only the grip pressure rules
    PressureOnly,
    /// Only the secondary scale rules
    ScaleOnly,
}

impl ClassificationMode {
    fn uses_pressure(&self) -> bool {
        matches!(
            self,
            ClassificationMode::Combined | ClassificationMode::PressureOnly
        )
    }

    fn uses_scale(&self) -> bool {
        matches!(
            self,
            ClassificationMode::Combined | ClassificationMode::ScaleOnly
        )
    }
}

impl FromStr for ClassificationMode {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "combined" | "both" => Ok(Self::Combined),
            "pressure_only" | "pressure" => Ok(Self::PressureOnly),
            "scale_only" | "scale" => Ok(Self::ScaleOnly),
            other => Err(DomainError::parse(format!(
                "unknown classification mode: {other}"
            ))),
        }
    }
}

// =============================================================================
// Classifier Config
// =============================================================================

/// Tunable constants for the classifier.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClassifierConfig {
    /// Pressure values below this are treated as zero
    pub noise_floor: f64,
    /// A channel counts as loaded when strictly above this value
    pub pressure_threshold: f64,
    /// Top channel must exceed front and back by this factor to count as pulling
    pub pull_factor: f64,
    /// Encouragement counts down to the next multiple of this many seconds
    pub encouragement_interval_secs: u32,
    /// Relative deviation from the reference weight that triggers a warning
    pub warning_tolerance: f64,
    /// Relative deviation from the reference weight that still earns praise
    pub praise_tolerance: f64,
    pub mode: ClassificationMode,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            noise_floor: DEFAULT_NOISE_FLOOR,
            pressure_threshold: MIN_PRESSURE_THRESHOLD,
            pull_factor: 1.5,
            encouragement_interval_secs: 60,
            warning_tolerance: 0.15,
            praise_tolerance: 0.05,
            mode: ClassificationMode::Combined,
        }
    }
}

impl ClassifierConfig {
    pub fn with_mode(mut self, mode: ClassificationMode) -> Self {
        self.mode = mode;
        self
    }

    /// Set the pressure threshold, raising it to [`MIN_PRESSURE_THRESHOLD`] if lower.
    pub fn with_pressure_threshold(mut self, threshold: f64) -> Self {
        self.pressure_threshold = threshold.max(MIN_PRESSURE_THRESHOLD);
        self
    }

    /// Check the settings for internal consistency.
    pub fn validate(&self) -> Result<(), DomainError> {
        let at_least = |value: f64, min: f64| value.is_finite() && value >= min;

        if !at_least(self.noise_floor, 0.0) {
            return Err(DomainError::validation("noise floor cannot be negative"));
        }
        if !at_least(self.pressure_threshold, MIN_PRESSURE_THRESHOLD) {
            return Err(DomainError::validation(format!(
                "pressure threshold must be at least {MIN_PRESSURE_THRESHOLD}"
            )));
        }
        if !at_least(self.pull_factor, 1.0) {
            return Err(DomainError::validation("pull factor must be at least 1.0"));
        }
        if self.encouragement_interval_secs == 0 {
            return Err(DomainError::validation(
                "encouragement interval must be positive",
            ));
        }
        if !at_least(self.praise_tolerance, 0.0)
            || !at_least(self.warning_tolerance, self.praise_tolerance)
        {
            return Err(DomainError::validation(
                "tolerances must satisfy 0 <= praise <= warning",
            ));
        }
        Ok(())
    }
}

// =============================================================================
// Classification
// =============================================================================

/// Session state the caller passes alongside each reading.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ExerciseContext {
    /// Seconds since the exercise started
    pub elapsed_secs: u32,
    /// Calibrated reference weight; scale rules are skipped without one
    pub reference_weight: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassificationResult {
    pub category: FeedbackCategory,
    /// Seconds until the next encouragement interval boundary
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seconds_remaining: Option<u32>,
}

impl ClassificationResult {
    fn of(category: FeedbackCategory) -> Self {
        Self {
            category,
            seconds_remaining: None,
        }
    }

    pub fn message_key(&self) -> &'static str {
        self.category.message_key()
    }
}

/// Stateless classifier over [`ClassifierConfig`].
#[derive(Debug, Clone, Copy, Default)]
pub struct SensorClassifier {
    config: ClassifierConfig,
}

impl SensorClassifier {
    pub fn new(config: ClassifierConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ClassifierConfig {
        &self.config
    }

    pub fn classify(
        &self,
        reading: &SensorReading,
        context: &ExerciseContext,
    ) -> ClassificationResult {
        let cfg = &self.config;
        let pressure = reading.filtered_pressure(cfg.noise_floor);

        if cfg.mode.uses_pressure() && pressure.all_above(cfg.pressure_threshold) {
            if self.is_pulling(&pressure) {
                return ClassificationResult::of(FeedbackCategory::ExcessivePull);
            }
            return ClassificationResult {
                category: FeedbackCategory::Encouragement,
                seconds_remaining: Some(self.seconds_to_next_interval(context.elapsed_secs)),
            };
        }

        if cfg.mode.uses_scale() {
            if let Some(reference) = context.reference_weight {
                let load = reading.secondary_scale;
                if !within_band(load, reference, cfg.warning_tolerance) {
                    return ClassificationResult::of(FeedbackCategory::ImbalanceWarning);
                }
                if within_band(load, reference, cfg.praise_tolerance) {
                    return ClassificationResult::of(FeedbackCategory::BalancedPraise);
                }
            }
        }

        ClassificationResult::of(FeedbackCategory::CorrectPosition)
    }

    /// Per-channel load levels for status indicators.
    pub fn pressure_levels(&self, reading: &SensorReading) -> [PressureLevel; 3] {
        reading.pressure.channels().map(|value| {
            PressureLevel::of(value, self.config.pressure_threshold, self.config.noise_floor)
        })
    }

    /// Summary status of the grip, ignoring the scale.
    pub fn overall_status(&self, reading: &SensorReading) -> PressureLevel {
        let pressure = reading.filtered_pressure(self.config.noise_floor);
        if !pressure.all_above(self.config.pressure_threshold) {
            PressureLevel::Low
        } else if self.is_pulling(&pressure) {
            PressureLevel::High
        } else {
            PressureLevel::Elevated
        }
    }

    fn is_pulling(&self, pressure: &HandPressure) -> bool {
        let factor = self.config.pull_factor;
        pressure.top > factor * pressure.front && pressure.top > factor * pressure.back
    }

    fn seconds_to_next_interval(&self, elapsed_secs: u32) -> u32 {
        let interval = self.config.encouragement_interval_secs.max(1);
        interval - (elapsed_secs % interval)
    }
}

fn within_band(value: f64, reference: f64, tolerance: f64) -> bool {
    let min = reference * (1.0 - tolerance);
    let max = reference * (1.0 + tolerance);
    value >= min && value <= max
}
