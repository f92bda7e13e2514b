use {async_trait::async_trait, serde::Serialize};

use crate::error::Result;

/// What the decider gets to work with for one message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EffectiveRequest {
    /// Message text with mention tokens removed, trimmed.
    pub user_text: String,
    /// Server (regiment) the message came from. `None` for DMs.
    pub conversation_id: Option<String>,
    pub user_id: String,
    pub user_display_name: String,
    pub channel_id: String,
    pub guild_display_name: Option<String>,
}

/// Produces the reply text for a request. May call tools along the way.
#[async_trait]
pub trait Decider: Send + Sync {
    async fn decide(&self, request: &EffectiveRequest) -> Result<String>;
}
