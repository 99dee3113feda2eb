//! Exercise session state.
//!
//! Owned by the caller, not by the classifier. Holds the elapsed-time counter,
//! the calibrated reference weight, the latest reading, and a bounded history.

use std::collections::VecDeque;

use crate::classifier::{ClassificationResult, ExerciseContext, SensorClassifier};
use crate::reading::SensorReading;

/// Readings kept in memory per session.
pub const DEFAULT_HISTORY_LIMIT: usize = 100;

/// Feedback is refreshed on every n-th second of an active session.
pub const DEFAULT_FEEDBACK_EVERY_SECS: u32 = 3;

#[derive(Debug, Clone)]
pub struct ExerciseSession {
    active: bool,
    elapsed_secs: u32,
    reference_weight: Option<f64>,
    latest: Option<SensorReading>,
    history: VecDeque<SensorReading>,
    history_limit: usize,
    feedback_every_secs: u32,
}

impl Default for ExerciseSession {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_LIMIT, DEFAULT_FEEDBACK_EVERY_SECS)
    }
}

impl ExerciseSession {
    pub fn new(history_limit: usize, feedback_every_secs: u32) -> Self {
        Self {
            active: false,
            elapsed_secs: 0,
            reference_weight: None,
            latest: None,
            history: VecDeque::with_capacity(history_limit),
            history_limit: history_limit.max(1),
            feedback_every_secs: feedback_every_secs.max(1),
        }
    }

    /// Begin an exercise with the weight used for calibration.
    ///
    /// Resets the elapsed counter. Readings already recorded are kept.
    pub fn start(&mut self, reference_weight: Option<f64>) {
        self.active = true;
        self.elapsed_secs = 0;
        self.reference_weight = reference_weight;
    }

    pub fn stop(&mut self) {
        self.active = false;
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn elapsed_secs(&self) -> u32 {
        self.elapsed_secs
    }

    pub fn reference_weight(&self) -> Option<f64> {
        self.reference_weight
    }

    /// Store a reading as the latest and append it to the bounded history.
    pub fn record(&mut self, reading: SensorReading) {
        if self.history.len() == self.history_limit {
            self.history.pop_front();
        }
        self.history.push_back(reading);
        self.latest = Some(reading);
    }

    pub fn latest(&self) -> Option<&SensorReading> {
        self.latest.as_ref()
    }

    /// Oldest first.
    pub fn history(&self) -> impl Iterator<Item = &SensorReading> {
        self.history.iter()
    }

    pub fn history_len(&self) -> usize {
        self.history.len()
    }

    /// Advance the clock by one second.
    ///
    /// Returns true when periodic feedback is due. Inactive sessions do not
    /// advance.
    pub fn tick(&mut self) -> bool {
        if !self.active {
            return false;
        }
        self.elapsed_secs = self.elapsed_secs.saturating_add(1);
        self.elapsed_secs % self.feedback_every_secs == 0
    }

    pub fn context(&self) -> ExerciseContext {
        ExerciseContext {
            elapsed_secs: self.elapsed_secs,
            reference_weight: self.reference_weight,
        }
    }

    /// Classify the latest reading, if any.
    pub fn classify(&self, classifier: &SensorClassifier) -> Option<ClassificationResult> {
        self.latest
            .as_ref()
            .map(|reading| classifier.classify(reading, &self.context()))
    }
}
