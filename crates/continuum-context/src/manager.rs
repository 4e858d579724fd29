//! Append, prune-and-summarize, ordered reads.

use std::{collections::HashMap, sync::Arc};

use continuum_core::{Clock, DurableKv, PersistedCell, ScopedKv, StorageError, Turn, TurnStore};
use serde::Serialize;
use thiserror::Error;

use crate::{
    config::ContextConfig,
    summarizer::{Summarizer, clamp_words},
    window::{ContextWindow, PrunePlan},
};

/// Key prefix of the context manager's persisted state.
pub const MEMORY_PREFIX: &str = "memory_";

/// Text placed before every summary.
pub const SUMMARY_PREAMBLE: &str = "The following is a summary of the previous messages:\n";

/// Context error.
#[derive(Debug, Error)]
pub enum ContextError {
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
    #[error("Invalid context configuration: {0}")]
    InvalidConfig(String),
}

/// What an append did to the window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppendOutcome {
    /// The window is within its bound; nothing was pruned.
    Appended,
    /// The oldest turns were replaced by a summary.
    Pruned {
        summary_id: String,
        evicted: usize,
        kept: usize,
    },
    /// The window is over its bound but summarization failed or timed
    /// out. The next append retries.
    PruneDeferred { reason: String },
}

/// Serializable view of the context state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContextSnapshot {
    pub window_len: usize,
    pub max_messages: usize,
    pub turns: Vec<Turn>,
    pub total_turns: usize,
}

/// Owns the context window of one session.
///
/// All methods take `&mut self`; one task drives a session, so appends
/// and prunes never interleave.
pub struct ContextManager {
    config: ContextConfig,
    store: Arc<dyn TurnStore>,
    summarizer: Arc<dyn Summarizer>,
    clock: Arc<dyn Clock>,
    window: ContextWindow,
    last_summary_ms: PersistedCell<u64>,
}

impl ContextManager {
    /// Restore the window from `kv` and bind it to `store`.
    ///
    /// # Errors
    /// Returns error if the config is invalid or the window cannot be read.
    pub async fn new(
        config: ContextConfig,
        kv: Arc<dyn DurableKv>,
        store: Arc<dyn TurnStore>,
        summarizer: Arc<dyn Summarizer>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, ContextError> {
        config.validate().map_err(ContextError::InvalidConfig)?;

        let scope = ScopedKv::new(kv, MEMORY_PREFIX);
        let window = ContextWindow::load(scope.clone()).await?;
        tracing::debug!(window_len = window.len(), "restored context window");

        Ok(Self {
            config,
            store,
            summarizer,
            clock,
            window,
            last_summary_ms: PersistedCell::new(scope, "last_summary_ms"),
        })
    }

    #[must_use]
    pub const fn config(&self) -> &ContextConfig {
        &self.config
    }

    /// Ids currently in the window, in replay order.
    #[must_use]
    pub fn window_ids(&self) -> &[String] {
        self.window.ids()
    }

    /// Record a turn and append it to the window, pruning if over bound.
    ///
    /// Safe to retry with the same turn after an error: the record is
    /// replaced and the window keeps a single entry for its id.
    ///
    /// # Errors
    /// Returns error if the turn store or the window store fails.
    /// Summarization failures are reported as
    /// [`AppendOutcome::PruneDeferred`] instead.
    pub async fn append(&mut self, turn: Turn) -> Result<AppendOutcome, ContextError> {
        self.store.upsert(&turn).await?;
        if !self.window.append(turn.id).await? {
            tracing::debug!("turn already in the context window");
        }
        self.prune().await
    }

    /// Prune the window if it is over its bound. A no-op otherwise.
    ///
    /// # Errors
    /// Returns error if the turn store or the window store fails.
    pub async fn prune(&mut self) -> Result<AppendOutcome, ContextError> {
        let Some(plan) = self
            .window
            .plan_prune(self.config.max_messages, self.config.prune_percentage)
        else {
            return Ok(AppendOutcome::Appended);
        };

        let transcript = self.fetch_ordered(&plan.evict).await?;
        let limit = self.config.summary_word_limit;
        let call = self.summarizer.summarize(&transcript, limit);

        let text = match tokio::time::timeout(self.config.summarize_timeout, call).await {
            Ok(Ok(text)) => clamp_words(&text, limit),
            Ok(Err(e)) => return Ok(self.defer(e.to_string())),
            Err(_) => return Ok(self.defer("summarizer timed out".into())),
        };
        if text.is_empty() {
            return Ok(self.defer("summarizer produced no text".into()));
        }

        self.apply_summary(&plan, &text).await
    }

    fn defer(&self, reason: String) -> AppendOutcome {
        tracing::warn!(window_len = self.window.len(), %reason, "prune deferred");
        AppendOutcome::PruneDeferred { reason }
    }

    async fn apply_summary(&mut self, plan: &PrunePlan, text: &str) -> Result<AppendOutcome, ContextError> {
        let summary_id = self.next_summary_id().await?;
        let summary = Turn::user(summary_id.clone(), format!("{SUMMARY_PREAMBLE}{text}"));
        self.store.upsert(&summary).await?;
        self.window.splice(summary_id.clone(), plan).await?;

        tracing::info!(
            %summary_id,
            evicted = plan.evict.len(),
            kept = plan.keep.len(),
            "summarized and pruned context window"
        );
        Ok(AppendOutcome::Pruned {
            summary_id,
            evicted: plan.evict.len(),
            kept: plan.keep.len(),
        })
    }

    /// `<prefix><millis>`, strictly increasing even if the clock is not.
    async fn next_summary_id(&mut self) -> Result<String, StorageError> {
        let now = self.clock.now_ms();
        let ms = match self.last_summary_ms.get().await? {
            Some(last) if now <= last => last + 1,
            _ => now,
        };
        self.last_summary_ms.set(ms).await?;
        Ok(format!("{}{ms}", self.config.summary_id_prefix))
    }

    /// Fetch turns and put them in `ids` order. Missing ids are skipped.
    async fn fetch_ordered(&self, ids: &[String]) -> Result<Vec<Turn>, StorageError> {
        let mut by_id: HashMap<String, Turn> = self
            .store
            .get_many(ids)
            .await?
            .into_iter()
            .map(|t| (t.id.clone(), t))
            .collect();

        let ordered: Vec<Turn> = ids.iter().filter_map(|id| by_id.remove(id)).collect();
        if ordered.len() < ids.len() {
            tracing::warn!(
                missing = ids.len() - ordered.len(),
                "context window references turns missing from the store"
            );
        }
        Ok(ordered)
    }

    /// The turns of the window, in replay order.
    ///
    /// # Errors
    /// Returns error if the turn store fails.
    pub async fn turns(&self) -> Result<Vec<Turn>, ContextError> {
        Ok(self.fetch_ordered(self.window.ids()).await?)
    }

    /// Window contents plus store totals.
    ///
    /// # Errors
    /// Returns error if the turn store fails.
    pub async fn snapshot(&self) -> Result<ContextSnapshot, ContextError> {
        Ok(ContextSnapshot {
            window_len: self.window.len(),
            max_messages: self.config.max_messages,
            turns: self.turns().await?,
            total_turns: self.store.count().await?,
        })
    }
}
