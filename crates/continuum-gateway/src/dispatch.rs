//! Routing of dispatch events to the session layer.

use serde::Deserialize;
use serde_json::Value;
use tokio::sync::mpsc;

/// Event type of a newly created message.
pub const MESSAGE_CREATE: &str = "message_create";

/// A direct message that qualifies for the session layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectMessage {
    pub channel_id: String,
    pub author_id: String,
    pub content: String,
    pub message_id: String,
}

/// Receiver of qualifying messages.
///
/// Delivery is fire-and-forget: implementations must not block the
/// gateway. Handing the message to a queue owned by the session task is
/// the expected shape.
pub trait SessionHandler: Send + Sync {
    fn on_qualifying_message(&self, message: DirectMessage);
}

impl SessionHandler for mpsc::UnboundedSender<DirectMessage> {
    fn on_qualifying_message(&self, message: DirectMessage) {
        if self.send(message).is_err() {
            tracing::warn!("session handler queue closed; dropping message");
        }
    }
}

#[derive(Debug, Deserialize)]
struct Author {
    id: String,
    #[serde(default)]
    bot: Option<bool>,
    #[serde(default)]
    system: Option<bool>,
}

#[derive(Debug, Deserialize)]
struct MessageCreate {
    id: String,
    channel_id: String,
    #[serde(default)]
    guild_id: Option<String>,
    author: Author,
    #[serde(default)]
    content: Option<String>,
}

impl MessageCreate {
    fn into_direct_message(self) -> Option<DirectMessage> {
        if self.author.bot.unwrap_or(false) || self.author.system.unwrap_or(false) {
            return None;
        }
        if self.guild_id.is_some() {
            return None;
        }
        let content = self.content.filter(|c| !c.is_empty())?;
        Some(DirectMessage {
            channel_id: self.channel_id,
            author_id: self.author.id,
            content,
            message_id: self.id,
        })
    }
}

/// Forwards direct messages from human senders; drops everything else.
pub struct DispatchRouter<H> {
    handler: H,
}

impl<H: SessionHandler> DispatchRouter<H> {
    /// Create a router delivering to `handler`.
    #[must_use]
    pub const fn new(handler: H) -> Self {
        Self { handler }
    }

    /// Route one dispatch event. Returns whether it was forwarded.
    pub fn route(&self, event_type: &str, payload: &Value) -> bool {
        if !event_type.eq_ignore_ascii_case(MESSAGE_CREATE) {
            tracing::trace!(event_type, "ignoring dispatch event");
            return false;
        }

        let message = match MessageCreate::deserialize(payload) {
            Ok(m) => m,
            Err(e) => {
                tracing::warn!(error = %e, "malformed message_create payload");
                return false;
            }
        };

        let Some(dm) = message.into_direct_message() else {
            return false;
        };

        tracing::info!(
            channel_id = %dm.channel_id,
            author_id = %dm.author_id,
            message_id = %dm.message_id,
            "direct message received"
        );
        self.handler.on_qualifying_message(dm);
        true
    }
}
