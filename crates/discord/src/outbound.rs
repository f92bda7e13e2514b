use std::sync::Arc;

use {
    async_trait::async_trait,
    serenity::{
        all::{ChannelId, CreateMessage, MessageId},
        http::Http,
    },
    tracing::debug,
};

use quartermaster_channels::{ChannelGateway, Error, MessageRef, Result};

/// Outbound Discord traffic over the REST API.
pub struct DiscordOutbound {
    http: Arc<Http>,
}

impl DiscordOutbound {
    pub fn new(http: Arc<Http>) -> Self {
        Self { http }
    }
}

/// Parse a snowflake id. Discord ids are never zero.
fn parse_id(kind: &str, raw: &str) -> Result<u64> {
    match raw.parse::<u64>() {
        Ok(0) | Err(_) => Err(Error::invalid_input(format!("invalid {kind} id '{raw}'"))),
        Ok(id) => Ok(id),
    }
}

fn channel(raw: &str) -> Result<ChannelId> {
    parse_id("channel", raw).map(ChannelId::new)
}

#[async_trait]
impl ChannelGateway for DiscordOutbound {
    async fn send_typing(&self, channel_id: &str) -> Result<()> {
        channel(channel_id)?
            .broadcast_typing(&self.http)
            .await
            .map_err(|e| Error::external("discord typing", e))
    }

    async fn reply(&self, to: &MessageRef, text: &str) -> Result<()> {
        let channel_id = channel(&to.channel_id)?;
        let message_id = MessageId::new(parse_id("message", &to.message_id)?);
        let builder = CreateMessage::new()
            .content(text)
            .reference_message((channel_id, message_id));
        channel_id
            .send_message(&self.http, builder)
            .await
            .map_err(|e| Error::external("discord reply", e))?;
        debug!(channel_id = %channel_id, len = text.len(), "discord reply sent");
        Ok(())
    }

    async fn send(&self, channel_id: &str, text: &str) -> Result<()> {
        let channel_id = channel(channel_id)?;
        channel_id
            .say(&self.http, text)
            .await
            .map_err(|e| Error::external("discord send", e))?;
        debug!(channel_id = %channel_id, len = text.len(), "discord message sent");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_snowflakes() {
        assert_eq!(parse_id("channel", "1203040506070809").unwrap(), 1203040506070809);
    }

    #[test]
    fn rejects_zero_and_garbage() {
        assert!(matches!(
            parse_id("channel", "0"),
            Err(Error::InvalidInput { .. })
        ));
        assert!(matches!(
            parse_id("message", "abc"),
            Err(Error::InvalidInput { .. })
        ));
    }
}
