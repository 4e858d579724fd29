//! Summarization boundary.

use async_trait::async_trait;
use continuum_core::Turn;
use thiserror::Error;

/// Summarizer error.
#[derive(Debug, Error)]
pub enum SummarizeError {
    #[error("Summarizer backend failed: {0}")]
    Backend(String),
    #[error("Summarizer produced no text")]
    Empty,
}

/// Condenses an ordered transcript into prose.
///
/// Implementations are asked to stay within `word_limit` words; callers
/// still clamp the output with [`clamp_words`]. Timeouts are imposed by
/// the caller.
#[async_trait]
pub trait Summarizer: Send + Sync {
    async fn summarize(&self, transcript: &[Turn], word_limit: usize) -> Result<String, SummarizeError>;
}

/// Keep at most `limit` whitespace-separated words, joined by single spaces.
#[must_use]
pub fn clamp_words(text: &str, limit: usize) -> String {
    text.split_whitespace()
        .take(limit)
        .collect::<Vec<_>>()
        .join(" ")
}
