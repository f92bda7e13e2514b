use std::sync::{Arc, OnceLock};

use {async_trait::async_trait, serde::Serialize, tokio::sync::mpsc};

use crate::error::Result;

/// Points at one message on the platform, for threaded replies.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct MessageRef {
    pub channel_id: String,
    pub message_id: String,
}

/// A chat message as seen by the intake pipeline.
#[derive(Debug, Clone, Serialize)]
pub struct InboundEvent {
    pub message_id: String,
    pub author_id: String,
    pub author_name: String,
    pub author_is_bot: bool,
    pub is_direct_message: bool,
    /// The message mentions the bot account.
    pub mentions_self: bool,
    pub raw_text: String,
    /// Server (guild) the message was posted in. `None` for DMs.
    pub conversation_id: Option<String>,
    pub conversation_name: Option<String>,
    pub channel_id: String,
}

impl InboundEvent {
    #[must_use]
    pub fn message_ref(&self) -> MessageRef {
        MessageRef {
            channel_id: self.channel_id.clone(),
            message_id: self.message_id.clone(),
        }
    }
}

/// The bot's own user id, learned when the gateway session becomes ready.
///
/// Cloned handles share the same slot.
#[derive(Debug, Clone, Default)]
pub struct BotIdentity {
    id: Arc<OnceLock<String>>,
}

impl BotIdentity {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Identity that is already known (tests, reconnects).
    #[must_use]
    pub fn known(id: impl Into<String>) -> Self {
        let identity = Self::default();
        identity.set(id);
        identity
    }

    /// Record the id. Later calls keep the first value.
    pub fn set(&self, id: impl Into<String>) {
        let _ = self.id.set(id.into());
    }

    #[must_use]
    pub fn get(&self) -> Option<&str> {
        self.id.get().map(String::as_str)
    }

    /// Whether `author_id` is the bot itself. False until the id is known.
    #[must_use]
    pub fn is_self(&self, author_id: &str) -> bool {
        self.get() == Some(author_id)
    }
}

/// Outbound capabilities a gateway adapter must provide.
#[async_trait]
pub trait ChannelGateway: Send + Sync {
    /// Show a "typing" indicator in the channel.
    async fn send_typing(&self, channel_id: &str) -> Result<()>;

    /// Send `text` as a threaded reply to `to`.
    async fn reply(&self, to: &MessageRef, text: &str) -> Result<()>;

    /// Send `text` as a plain message in the channel.
    async fn send(&self, channel_id: &str, text: &str) -> Result<()>;
}

/// A live gateway connection.
#[async_trait]
pub trait GatewaySession: Send + Sync {
    /// Outbound handle for replies.
    fn outbound(&self) -> Arc<dyn ChannelGateway>;

    /// Close the connection. Events stop flowing once this returns.
    async fn shutdown(&self);
}

/// Opens a gateway connection that pushes inbound events onto `events`.
#[async_trait]
pub trait GatewayConnector: Send + Sync {
    /// Log in and start receiving events. `identity` is filled in once the
    /// platform reports the bot's own user id.
    async fn connect(
        &self,
        events: mpsc::Sender<InboundEvent>,
        identity: BotIdentity,
    ) -> Result<Box<dyn GatewaySession>>;
}
