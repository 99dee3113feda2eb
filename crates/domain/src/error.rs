//! Unified error types for the domain layer
//!
//! Provides a common error type for domain operations so adapters do not have
//! to fall back to `String` or `anyhow` for configuration mistakes.

use thiserror::Error;

/// Unified error type for domain operations
#[derive(Debug, Error, Clone, PartialEq)]
pub enum DomainError {
    /// Validation failed (e.g., a threshold outside its allowed range)
    #[error("Validation failed: {0}")]
    Validation(String),

    /// Parse error (for enum-like settings given as strings)
    #[error("Parse error: {0}")]
    Parse(String),
}

impl DomainError {
    /// Creates a validation error for rule violations.
    ///
    /// Use this when a classifier or session setting is out of range:
    /// - Thresholds or floors are negative
    /// - Tolerance bands are inverted
    /// - Intervals are zero
    ///
    /// # Example
    /// ```ignore
    /// if self.pull_factor < 1.0 {
    ///     return Err(DomainError::validation("pull factor must be at least 1.0"));
    /// }
    /// ```
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Creates a parse error for string-to-type conversion failures.
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse(msg.into())
    }
}
