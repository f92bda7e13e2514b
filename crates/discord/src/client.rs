//! Gateway connection lifecycle.

use std::{sync::Arc, time::Duration};

use {
    async_trait::async_trait,
    secrecy::{ExposeSecret, Secret},
    serenity::{Client, gateway::ShardManager, http::Http},
    tokio::{
        sync::{Mutex, mpsc},
        task::JoinHandle,
    },
    tracing::{error, info, warn},
};

use quartermaster_channels::{
    BotIdentity, ChannelGateway, Error, GatewayConnector, GatewaySession, InboundEvent, Result,
};

use crate::{handler::DiscordHandler, outbound::DiscordOutbound};

const SHARD_STOP_TIMEOUT: Duration = Duration::from_secs(5);

/// Logs in with a bot token and runs the serenity client.
pub struct DiscordConnector {
    token: Secret<String>,
    activity: String,
}

impl DiscordConnector {
    pub fn new(token: Secret<String>, activity: impl Into<String>) -> Self {
        Self {
            token,
            activity: activity.into(),
        }
    }
}

#[async_trait]
impl GatewayConnector for DiscordConnector {
    async fn connect(
        &self,
        events: mpsc::Sender<InboundEvent>,
        identity: BotIdentity,
    ) -> Result<Box<dyn GatewaySession>> {
        let handler = DiscordHandler::new(identity, events, self.activity.clone());
        let mut client = Client::builder(self.token.expose_secret(), DiscordHandler::intents())
            .event_handler(handler)
            .await
            .map_err(|e| Error::external("build discord client", e))?;

        // Fail startup on a bad token instead of inside the background task.
        let me = client
            .http
            .get_current_user()
            .await
            .map_err(|e| Error::external("discord login", e))?;
        info!(bot_name = %me.name, "discord credentials verified");

        let http = Arc::clone(&client.http);
        let shard_manager = Arc::clone(&client.shard_manager);
        let task = tokio::spawn(async move {
            if let Err(e) = client.start().await {
                error!(error = %e, "discord client stopped with error");
            }
        });

        Ok(Box::new(DiscordSession {
            http,
            shard_manager,
            task: Mutex::new(Some(task)),
        }))
    }
}

/// A running serenity client.
pub struct DiscordSession {
    http: Arc<Http>,
    shard_manager: Arc<ShardManager>,
    task: Mutex<Option<JoinHandle<()>>>,
}

#[async_trait]
impl GatewaySession for DiscordSession {
    fn outbound(&self) -> Arc<dyn ChannelGateway> {
        Arc::new(DiscordOutbound::new(Arc::clone(&self.http)))
    }

    async fn shutdown(&self) {
        let Some(task) = self.task.lock().await.take() else {
            return;
        };
        info!("shutting down discord gateway");
        self.shard_manager.shutdown_all().await;
        if tokio::time::timeout(SHARD_STOP_TIMEOUT, task).await.is_err() {
            warn!("discord client did not stop in time");
        }
    }
}
