//! Feedback wording.
//!
//! Each [`FeedbackCategory`] has a pool of equivalent messages. Selection is
//! delegated to a caller-supplied `pick` closure so the domain stays free of
//! randomness; production code passes an RNG-backed closure and tests pass a
//! fixed index.

use std::collections::HashMap;

use crate::classifier::{ClassificationResult, FeedbackCategory};

/// Placeholder replaced with the seconds remaining in encouragement messages.
pub const SECONDS_PLACEHOLDER: &str = "{seconds}";

const EXCESSIVE_PULL: &[&str] = &[
    "Don't pull yourself up, drive from your legs!",
    "Relax your hand! The force should come from your legs!",
    "Less pull with the hand, more push with the legs!",
    "Careful! Too much force in your hand, work from your legs!",
];

const ENCOURAGEMENT: &[&str] = &[
    "You can do it! Try to relax your hand.",
    "Come on, {seconds} more seconds! You've got this!",
    "Strong! But keep your hand relaxed.",
    "Hang in there! Less hand, more legs!",
    "Almost done! Keep your hand loose!",
];

const IMBALANCE_WARNING: &[&str] = &[
    "Your load is one-sided, aim for even pressure.",
    "Watch your balance, one side is clearly carrying more.",
    "You are shifting weight unevenly, engage both sides.",
    "Stay centred, your pressure is not evenly distributed.",
    "Try to split your force symmetrically.",
    "Your body is off balance, find your centre.",
    "One side is doing the work, spread the weight evenly.",
    "Uneven distribution, think about balance and control.",
    "Keep your balance, avoid loading one side.",
    "More balance helps you work more efficiently.",
];

const BALANCED_PRAISE: &[&str] = &[
    "Very good! Your pressure is wonderfully even.",
    "Great! Your force distribution is perfectly balanced.",
    "Excellent! You are working symmetrically, just like that!",
    "Strong! Your posture is stable and aligned.",
    "Nicely balanced! Both sides are working evenly.",
    "Balance found, keep it up!",
    "Optimal balance! You are using your body efficiently.",
    "Your body tension is spot on, great!",
    "This is what controlled technique looks like: even and stable.",
    "Your distribution is perfectly tuned, strong performance!",
];

const CORRECT_POSITION: &[&str] = &[
    "Perfect! Work from your legs, not your hand!",
    "Great! Your hand is relaxed, exactly right!",
    "Excellent! You are using the right technique!",
    "Wonderful! Keep that relaxed grip!",
    "Fantastic! The force is coming from your legs!",
    "Optimal! Your hand only guides, your legs do the work!",
];

/// Message pools keyed by category.
#[derive(Debug, Clone)]
pub struct MessageCatalog {
    pools: HashMap<FeedbackCategory, Vec<String>>,
}

impl Default for MessageCatalog {
    fn default() -> Self {
        let mut catalog = Self::empty();
        for category in FeedbackCategory::all() {
            let pool = match category {
                FeedbackCategory::ExcessivePull => EXCESSIVE_PULL,
                FeedbackCategory::Encouragement => ENCOURAGEMENT,
                FeedbackCategory::ImbalanceWarning => IMBALANCE_WARNING,
                FeedbackCategory::BalancedPraise => BALANCED_PRAISE,
                FeedbackCategory::CorrectPosition => CORRECT_POSITION,
            };
            catalog.set_pool(category, pool.iter().map(|m| m.to_string()).collect());
        }
        catalog
    }
}

impl MessageCatalog {
    /// A catalog with no messages; [`MessageCatalog::render`] falls back to message keys.
    pub fn empty() -> Self {
        Self {
            pools: HashMap::new(),
        }
    }

    /// Replace the pool for one category (e.g., with translated wording).
    pub fn set_pool(&mut self, category: FeedbackCategory, messages: Vec<String>) {
        self.pools.insert(category, messages);
    }

    pub fn pool(&self, category: FeedbackCategory) -> &[String] {
        self.pools
            .get(&category)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Render a result to text.
    ///
    /// `pick` receives the pool size and returns an index; out-of-range
    /// indices wrap around. An empty pool renders the message key.
    pub fn render(
        &self,
        result: &ClassificationResult,
        pick: impl FnOnce(usize) -> usize,
    ) -> String {
        let pool = self.pool(result.category);
        if pool.is_empty() {
            return result.message_key().to_string();
        }

        let template = &pool[pick(pool.len()) % pool.len()];
        match result.seconds_remaining {
            Some(seconds) => template.replace(SECONDS_PLACEHOLDER, &seconds.to_string()),
            None => template.clone(),
        }
    }
}
