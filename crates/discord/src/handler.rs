//! Discord event handler for serenity.
//!
//! Converts gateway messages into [`InboundEvent`]s and pushes them onto the
//! intake channel. All filtering, the bot-author loop guard included, happens
//! in the intake pipeline.

use {
    serenity::{
        all::{ActivityData, Context, EventHandler, GatewayIntents, GuildId, Message, Ready},
        async_trait,
    },
    tokio::sync::mpsc,
    tracing::{debug, info, trace},
};

use quartermaster_channels::{BotIdentity, InboundEvent, mentions};

/// Handler for Discord gateway events.
pub struct DiscordHandler {
    identity: BotIdentity,
    events: mpsc::Sender<InboundEvent>,
    activity: String,
}

impl DiscordHandler {
    pub fn new(
        identity: BotIdentity,
        events: mpsc::Sender<InboundEvent>,
        activity: String,
    ) -> Self {
        Self {
            identity,
            events,
            activity,
        }
    }

    /// Push a message onto the intake channel. Bot authors are forwarded
    /// too; the intake pipeline drops them.
    pub async fn forward(&self, incoming: IncomingMessage<'_>) {
        let event = build_event(incoming, self.identity.get());
        trace!(
            channel_id = %event.channel_id,
            dm = event.is_direct_message,
            mentions_self = event.mentions_self,
            bot = event.author_is_bot,
            "discord message"
        );

        if self.events.send(event).await.is_err() {
            debug!("intake closed, dropping discord message");
        }
    }

    /// Required gateway intents for the bot.
    pub fn intents() -> GatewayIntents {
        GatewayIntents::GUILDS
            | GatewayIntents::GUILD_MESSAGES
            | GatewayIntents::DIRECT_MESSAGES
            | GatewayIntents::MESSAGE_CONTENT
    }
}

#[async_trait]
impl EventHandler for DiscordHandler {
    async fn ready(&self, ctx: Context, ready: Ready) {
        self.identity.set(ready.user.id.to_string());
        if !self.activity.is_empty() {
            ctx.set_activity(Some(ActivityData::watching(self.activity.clone())));
        }
        info!(
            bot_name = %ready.user.name,
            bot_id = %ready.user.id,
            guilds = ready.guilds.len(),
            "discord bot ready"
        );
    }

    async fn message(&self, ctx: Context, msg: Message) {
        let incoming = IncomingMessage {
            message_id: msg.id.get(),
            author_id: msg.author.id.get(),
            author_name: &msg.author.name,
            author_is_bot: msg.author.bot,
            guild_id: msg.guild_id.map(GuildId::get),
            guild_name: msg.guild_id.and_then(|g| g.name(&ctx.cache)),
            channel_id: msg.channel_id.get(),
            content: &msg.content,
            mentioned_user_ids: msg.mentions.iter().map(|u| u.id.get()).collect(),
        };
        self.forward(incoming).await;
    }

    async fn cache_ready(&self, _ctx: Context, guilds: Vec<GuildId>) {
        debug!(guild_count = guilds.len(), "discord cache ready");
    }
}

/// Platform fields needed to build an [`InboundEvent`].
#[derive(Debug, Clone)]
pub struct IncomingMessage<'a> {
    pub message_id: u64,
    pub author_id: u64,
    pub author_name: &'a str,
    pub author_is_bot: bool,
    pub guild_id: Option<u64>,
    pub guild_name: Option<String>,
    pub channel_id: u64,
    pub content: &'a str,
    pub mentioned_user_ids: Vec<u64>,
}

/// Build the pipeline event. The bot counts as mentioned when it appears in
/// the message's mention list or as a `<@id>` / `<@!id>` token.
pub fn build_event(msg: IncomingMessage<'_>, bot_id: Option<&str>) -> InboundEvent {
    let mentions_self = bot_id.is_some_and(|id| {
        msg.mentioned_user_ids.iter().any(|u| u.to_string() == id)
            || mentions::mentions_user(msg.content, id)
    });

    InboundEvent {
        message_id: msg.message_id.to_string(),
        author_id: msg.author_id.to_string(),
        author_name: msg.author_name.to_string(),
        author_is_bot: msg.author_is_bot,
        is_direct_message: msg.guild_id.is_none(),
        mentions_self,
        raw_text: msg.content.to_string(),
        conversation_id: msg.guild_id.map(|g| g.to_string()),
        conversation_name: msg.guild_name,
        channel_id: msg.channel_id.to_string(),
    }
}
