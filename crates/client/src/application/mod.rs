//! Application layer: turning readings into user-facing feedback.

pub mod exercise;
pub mod feedback;

pub use exercise::{ExerciseRun, ExerciseRunner};
pub use feedback::{Feedback, FeedbackPresenter, ThreadRngPicker, VariantPicker};
