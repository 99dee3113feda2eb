//! RehaFlow Domain - sensor readings and exercise feedback.
//!
//! Pure types and rules with no I/O: the client crate feeds readings in and
//! renders what comes out.

pub mod classifier;
pub mod error;
pub mod messages;
pub mod reading;
pub mod session;

pub use classifier::{
    ClassificationMode, ClassificationResult, ClassifierConfig, ExerciseContext, FeedbackCategory,
    SensorClassifier, MIN_PRESSURE_THRESHOLD,
};
pub use error::DomainError;
pub use messages::{MessageCatalog, SECONDS_PLACEHOLDER};
pub use reading::{HandPressure, PressureLevel, SensorReading, DEFAULT_NOISE_FLOOR};
pub use session::{ExerciseSession, DEFAULT_FEEDBACK_EVERY_SECS, DEFAULT_HISTORY_LIMIT};
