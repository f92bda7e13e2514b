//! Per-message intake: filter, extract, decide, dispatch.

use std::sync::Arc;

use {
    tokio::{sync::mpsc, task::JoinSet},
    tokio_util::sync::CancellationToken,
    tracing::{Instrument, debug, error, info, info_span, trace, warn},
};

use {
    quartermaster_channels::{
        BotIdentity, ChannelGateway, InboundEvent, MessageRef, chunking, mentions,
    },
    quartermaster_common::{Stopwatch, new_request_id},
};

use crate::{
    decider::{Decider, EffectiveRequest},
    error::{Error, Result},
};

/// Reply for a message that is empty once mentions are removed.
pub const HELP_TEXT: &str =
    "How can I help you? Ask me about inventory, operations, or production orders!";

/// Reply for a server message without a resolvable server id.
pub const GUIDANCE_TEXT: &str = "I can only help with regiment data when used in a server.";

/// Reply when anything goes wrong while answering.
pub const APOLOGY_TEXT: &str =
    "Sorry, I encountered an error processing your request. Please try again.";

/// What happened to one inbound event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Written by the bot itself.
    SelfAuthored,
    /// Written by some other bot account.
    BotAuthored,
    /// Neither a DM nor a mention of the bot.
    NotAddressed,
    Help,
    Guidance,
    Replied { chunks: usize },
    Apologized,
}

/// Processes inbound events and sends replies through the gateway.
pub struct IntakePipeline {
    identity: BotIdentity,
    gateway: Arc<dyn ChannelGateway>,
    decider: Arc<dyn Decider>,
    max_message_len: usize,
}

impl IntakePipeline {
    pub fn new(
        identity: BotIdentity,
        gateway: Arc<dyn ChannelGateway>,
        decider: Arc<dyn Decider>,
        max_message_len: usize,
    ) -> Self {
        Self {
            identity,
            gateway,
            decider,
            max_message_len: max_message_len.max(1),
        }
    }

    /// Consume events until the channel closes or `shutdown` fires, one task
    /// per event. In-flight tasks are awaited before returning.
    pub async fn run(
        self: Arc<Self>,
        mut events: mpsc::Receiver<InboundEvent>,
        shutdown: CancellationToken,
    ) {
        let mut tasks = JoinSet::new();
        info!("intake loop started");

        loop {
            tokio::select! {
                () = shutdown.cancelled() => {
                    debug!("intake loop cancelled");
                    break;
                },
                next = events.recv() => match next {
                    Some(event) => {
                        let this = Arc::clone(&self);
                        let span = info_span!(
                            "intake",
                            request_id = %new_request_id(),
                            channel_id = %event.channel_id,
                        );
                        tasks.spawn(async move { this.handle(event).await }.instrument(span));
                    },
                    None => {
                        debug!("intake channel closed");
                        break;
                    },
                },
                Some(joined) = tasks.join_next(), if !tasks.is_empty() => {
                    log_join(joined);
                },
            }
        }

        events.close();
        if !tasks.is_empty() {
            info!(in_flight = tasks.len(), "waiting for in-flight messages");
        }
        while let Some(joined) = tasks.join_next().await {
            log_join(joined);
        }
        info!("intake loop stopped");
    }

    /// Run one event through the pipeline.
    pub async fn handle(&self, event: InboundEvent) -> Outcome {
        if self.identity.is_self(&event.author_id) {
            return Outcome::SelfAuthored;
        }
        if event.author_is_bot {
            trace!(author_id = %event.author_id, "ignoring bot message");
            return Outcome::BotAuthored;
        }
        if !event.is_direct_message && !event.mentions_self {
            return Outcome::NotAddressed;
        }

        debug!(
            user = %event.author_name,
            guild = event.conversation_name.as_deref().unwrap_or("DM"),
            dm = event.is_direct_message,
            "message received"
        );

        let user_text = if event.mentions_self {
            mentions::strip_mentions(&event.raw_text)
        } else {
            event.raw_text.clone()
        };

        let origin = event.message_ref();
        if user_text.is_empty() {
            self.reply_static(&origin, HELP_TEXT).await;
            return Outcome::Help;
        }
        if !event.is_direct_message && event.conversation_id.is_none() {
            self.reply_static(&origin, GUIDANCE_TEXT).await;
            return Outcome::Guidance;
        }

        let request = EffectiveRequest {
            user_text,
            conversation_id: event.conversation_id.clone(),
            user_id: event.author_id.clone(),
            user_display_name: event.author_name.clone(),
            channel_id: event.channel_id.clone(),
            guild_display_name: event.conversation_name.clone(),
        };

        match self.respond(&origin, &request).await {
            Ok(chunks) => Outcome::Replied { chunks },
            Err(e) => {
                error!(error = %e, "error processing message");
                self.reply_static(&origin, APOLOGY_TEXT).await;
                Outcome::Apologized
            },
        }
    }

    async fn respond(&self, origin: &MessageRef, request: &EffectiveRequest) -> Result<usize> {
        if let Err(e) = self.gateway.send_typing(&origin.channel_id).await {
            debug!(error = %e, "typing indicator failed");
        }

        let timer = Stopwatch::start();
        let reply = self.decider.decide(request).await?;
        let decide_ms = timer.elapsed_ms();
        if reply.trim().is_empty() {
            return Err(Error::decision("decider returned an empty reply"));
        }

        let timer = Stopwatch::start();
        let chunks = self.dispatch(origin, &reply).await?;
        info!(
            decide_ms,
            dispatch_ms = timer.elapsed_ms(),
            length = reply.chars().count(),
            chunks,
            "response sent"
        );
        Ok(chunks)
    }

    /// Send `reply`, split if needed. The first part is a threaded reply,
    /// the rest are plain sends, each awaited before the next.
    async fn dispatch(&self, origin: &MessageRef, reply: &str) -> Result<usize> {
        if reply.chars().count() <= self.max_message_len {
            self.gateway.reply(origin, reply).await?;
            return Ok(1);
        }

        let chunks = chunking::split(reply, self.max_message_len);
        let mut parts = chunks.iter();
        if let Some(first) = parts.next() {
            self.gateway.reply(origin, first).await?;
        }
        for part in parts {
            self.gateway.send(&origin.channel_id, part).await?;
        }
        Ok(chunks.len())
    }

    async fn reply_static(&self, origin: &MessageRef, text: &str) {
        if let Err(e) = self.gateway.reply(origin, text).await {
            warn!(error = %e, "failed to send reply");
        }
    }
}

fn log_join(joined: std::result::Result<Outcome, tokio::task::JoinError>) {
    match joined {
        Ok(outcome) => trace!(?outcome, "message handled"),
        Err(e) => warn!(error = %e, "intake task failed"),
    }
}
