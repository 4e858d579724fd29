//! The session task: turns qualifying direct messages into context turns.

use std::sync::Arc;

use continuum_context::{AppendOutcome, ContextError, ContextManager};
use continuum_core::{DurableKv, PersistedCell, ScopedKv, StorageError, Turn};
use continuum_gateway::DirectMessage;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use uuid::Uuid;

/// Key prefix of the session info.
pub const INFO_PREFIX: &str = "info_";

/// Who the bot is talking to, so replies can find their way back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionInfo {
    pub last_author_id: String,
    pub dm_channel_id: String,
}

pub struct Session {
    context: ContextManager,
    info: PersistedCell<SessionInfo>,
}

impl Session {
    /// # Errors
    /// Returns error if the stored session info cannot be read.
    pub async fn new(context: ContextManager, kv: Arc<dyn DurableKv>) -> Result<Self, StorageError> {
        let mut info: PersistedCell<SessionInfo> = PersistedCell::new(ScopedKv::new(kv, INFO_PREFIX), "session");
        if let Some(existing) = info.get().await? {
            tracing::info!(channel_id = %existing.dm_channel_id, "resuming session");
        }
        Ok(Self { context, info })
    }

    #[must_use]
    pub const fn context(&self) -> &ContextManager {
        &self.context
    }

    /// Record one message.
    ///
    /// # Errors
    /// Returns error if a store write fails.
    pub async fn handle(&mut self, message: DirectMessage) -> Result<AppendOutcome, ContextError> {
        self.info
            .set(SessionInfo {
                last_author_id: message.author_id,
                dm_channel_id: message.channel_id,
            })
            .await?;

        let turn = Turn::user(Uuid::new_v4().to_string(), message.content);
        self.context.append(turn).await
    }

    /// Consume messages until the sender side is dropped.
    pub async fn run(mut self, mut messages: mpsc::UnboundedReceiver<DirectMessage>) {
        while let Some(message) = messages.recv().await {
            let message_id = message.message_id.clone();
            match self.handle(message).await {
                Ok(AppendOutcome::Appended) => {
                    tracing::debug!(%message_id, "message recorded");
                }
                Ok(AppendOutcome::Pruned { summary_id, evicted, .. }) => {
                    tracing::info!(%message_id, %summary_id, evicted, "message recorded; context compacted");
                }
                Ok(AppendOutcome::PruneDeferred { reason }) => {
                    tracing::warn!(%message_id, %reason, "message recorded; compaction deferred");
                }
                Err(e) => {
                    tracing::error!(%message_id, error = %e, "failed to record message");
                }
            }
        }
        tracing::info!("session task stopped");
    }
}
