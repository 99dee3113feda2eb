//! Feedback text selection.

use rand::Rng;

use rehaflow_domain::{
    ClassificationResult, FeedbackCategory, MessageCatalog, PressureLevel,
};

/// Chooses which message variant to show.
#[cfg_attr(test, mockall::automock)]
pub trait VariantPicker: Send + Sync {
    /// Return an index in `0..len`. `len` is never zero.
    fn pick(&self, len: usize) -> usize;
}

/// Uniform random choice.
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadRngPicker;

impl VariantPicker for ThreadRngPicker {
    fn pick(&self, len: usize) -> usize {
        rand::thread_rng().gen_range(0..len.max(1))
    }
}

/// One rendered feedback update.
#[derive(Debug, Clone, PartialEq)]
pub struct Feedback {
    pub category: FeedbackCategory,
    pub message: String,
    pub seconds_remaining: Option<u32>,
    pub elapsed_secs: u32,
    /// Overall grip level of the latest reading
    pub status: PressureLevel,
}

impl Feedback {
    pub fn is_warning(&self) -> bool {
        self.category.is_warning()
    }
}

pub struct FeedbackPresenter {
    catalog: MessageCatalog,
    picker: Box<dyn VariantPicker>,
}

impl Default for FeedbackPresenter {
    fn default() -> Self {
        Self::new(MessageCatalog::default(), ThreadRngPicker)
    }
}

impl FeedbackPresenter {
    pub fn new(catalog: MessageCatalog, picker: impl VariantPicker + 'static) -> Self {
        Self {
            catalog,
            picker: Box::new(picker),
        }
    }

    pub fn catalog(&self) -> &MessageCatalog {
        &self.catalog
    }

    pub fn render(&self, result: &ClassificationResult) -> String {
        self.catalog.render(result, |len| self.picker.pick(len))
    }
}

impl std::fmt::Debug for FeedbackPresenter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FeedbackPresenter").finish_non_exhaustive()
    }
}
