//! Conversation context window.
//!
//! Provides:
//! - `ContextWindow` - the persisted, ordered list of turn ids
//! - `Summarizer` - boundary to whatever condenses evicted turns
//! - `ContextManager` - append, prune-and-summarize, ordered reads
//! - `DigestSummarizer` - deterministic summarizer that needs no backend

pub mod config;
pub mod digest;
pub mod manager;
pub mod summarizer;
pub mod window;

pub use config::ContextConfig;
pub use digest::DigestSummarizer;
pub use manager::{
    AppendOutcome, ContextError, ContextManager, ContextSnapshot, MEMORY_PREFIX, SUMMARY_PREAMBLE,
};
pub use summarizer::{SummarizeError, Summarizer, clamp_words};
pub use window::{ContextWindow, PrunePlan};
