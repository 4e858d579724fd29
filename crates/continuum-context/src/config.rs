//! Context window configuration.

use std::time::Duration;

/// Bounds and summarization settings for a [`crate::ContextManager`].
#[derive(Debug, Clone, PartialEq)]
pub struct ContextConfig {
    /// Largest window length that does not trigger a prune.
    pub max_messages: usize,
    /// Share of the window evicted by one prune, in `(0, 1]`.
    pub prune_percentage: f64,
    /// Id prefix of synthetic summary turns.
    pub summary_id_prefix: String,
    /// Word budget handed to the summarizer and enforced on its output.
    pub summary_word_limit: usize,
    /// Upper bound on one summarization call.
    pub summarize_timeout: Duration,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            max_messages: 50,
            prune_percentage: 0.7,
            summary_id_prefix: "summary_".to_string(),
            summary_word_limit: 100,
            summarize_timeout: Duration::from_secs(30),
        }
    }
}

impl ContextConfig {
    /// Check that the settings describe a window that can actually shrink.
    ///
    /// # Errors
    /// Returns a description of the first invalid setting.
    pub fn validate(&self) -> Result<(), String> {
        if self.max_messages == 0 {
            return Err("max_messages must be at least 1".into());
        }
        if !(self.prune_percentage > 0.0 && self.prune_percentage <= 1.0) {
            return Err(format!(
                "prune_percentage must be in (0, 1], got {}",
                self.prune_percentage
            ));
        }
        if self.summary_id_prefix.is_empty() {
            return Err("summary_id_prefix must not be empty".into());
        }
        if self.summary_word_limit == 0 {
            return Err("summary_word_limit must be at least 1".into());
        }
        Ok(())
    }
}
