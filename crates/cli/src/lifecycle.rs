//! Process lifecycle: bring the tool server up before the gateway, tear
//! everything down in reverse on a termination signal.

use std::{future::Future, sync::Arc, time::Duration};

use {
    anyhow::{Context, Result},
    async_trait::async_trait,
    tokio::sync::mpsc,
    tokio_util::sync::CancellationToken,
    tracing::{error, info, warn},
};

use {
    quartermaster_channels::{BotIdentity, GatewayConnector},
    quartermaster_chat::{Decider, IntakePipeline},
    quartermaster_mcp::ToolSession,
};

/// Inbound events buffered between the gateway and the intake loop.
const EVENT_BUFFER: usize = 256;

/// The tool server as seen by the lifecycle: started once, closed once.
#[async_trait]
pub trait ToolBridge: Send + Sync {
    async fn start(&self) -> quartermaster_mcp::Result<()>;
    async fn close(&self);
}

#[async_trait]
impl ToolBridge for ToolSession {
    async fn start(&self) -> quartermaster_mcp::Result<()> {
        let client = self.initialize().await?;
        let tools = client.list_tools().await?;
        info!(
            server = client.server_name(),
            tools = tools.len(),
            "tool server ready"
        );
        Ok(())
    }

    async fn close(&self) {
        ToolSession::close(self).await;
    }
}

pub struct Lifecycle {
    pub bridge: Arc<dyn ToolBridge>,
    pub connector: Arc<dyn GatewayConnector>,
    pub decider: Arc<dyn Decider>,
    pub max_message_len: usize,
    /// Upper bound for each shutdown step: draining, closing the tool
    /// server and stopping the gateway.
    pub grace: Duration,
}

impl Lifecycle {
    /// Start the tool server, connect the gateway and process events until
    /// `shutdown` resolves or the gateway stops delivering events.
    ///
    /// Either startup step failing is fatal; a failed gateway login closes
    /// the already started tool server first.
    pub async fn run(self, shutdown: impl Future<Output = ()>) -> Result<()> {
        info!("starting tool server");
        self.bridge
            .start()
            .await
            .context("tool server failed to start")?;

        let identity = BotIdentity::new();
        let (tx, rx) = mpsc::channel(EVENT_BUFFER);
        let session = match self.connector.connect(tx, identity.clone()).await {
            Ok(session) => session,
            Err(e) => {
                self.bridge.close().await;
                return Err(e).context("gateway login failed");
            },
        };
        info!("gateway connected");

        let pipeline = Arc::new(IntakePipeline::new(
            identity,
            session.outbound(),
            Arc::clone(&self.decider),
            self.max_message_len,
        ));
        let cancel = CancellationToken::new();
        let mut intake = tokio::spawn(pipeline.run(rx, cancel.clone()));

        let intake_ended = tokio::select! {
            () = shutdown => false,
            joined = &mut intake => {
                if let Err(e) = joined {
                    error!(error = %e, "intake task failed");
                }
                warn!("gateway event stream ended");
                true
            },
        };

        info!(grace_secs = self.grace.as_secs(), "shutting down");
        cancel.cancel();
        if !intake_ended {
            match tokio::time::timeout(self.grace, &mut intake).await {
                Ok(Ok(())) => {},
                Ok(Err(e)) => error!(error = %e, "intake task failed"),
                Err(_) => {
                    warn!("in-flight messages did not finish within the grace period, aborting");
                    intake.abort();
                },
            }
        }
        if tokio::time::timeout(self.grace, self.bridge.close())
            .await
            .is_err()
        {
            warn!("tool server did not close within the grace period");
        }
        if tokio::time::timeout(self.grace, session.shutdown())
            .await
            .is_err()
        {
            warn!("gateway did not shut down within the grace period");
        }
        info!("shutdown complete");
        Ok(())
    }
}

/// Resolves on SIGINT (ctrl-c) or SIGTERM.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "ctrl-c handler failed");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            },
            Err(e) => {
                error!(error = %e, "SIGTERM handler unavailable, relying on ctrl-c");
                std::future::pending::<()>().await;
            },
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("received ctrl-c"),
        () = terminate => info!("received SIGTERM"),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use {
        super::*,
        quartermaster_channels::{ChannelGateway, GatewaySession, InboundEvent, MessageRef},
        quartermaster_chat::EffectiveRequest,
        tokio::sync::oneshot,
    };

    type Log = Arc<Mutex<Vec<String>>>;

    fn record(log: &Log, entry: impl Into<String>) {
        log.lock().unwrap().push(entry.into());
    }

    fn entries(log: &Log) -> Vec<String> {
        log.lock().unwrap().clone()
    }

    struct FakeBridge {
        log: Log,
        fail: bool,
    }

    #[async_trait]
    impl ToolBridge for FakeBridge {
        async fn start(&self) -> quartermaster_mcp::Result<()> {
            record(&self.log, "bridge.start");
            if self.fail {
                return Err(quartermaster_mcp::Error::startup("no such binary"));
            }
            Ok(())
        }

        async fn close(&self) {
            record(&self.log, "bridge.close");
        }
    }

    struct FakeGateway {
        log: Log,
    }

    #[async_trait]
    impl ChannelGateway for FakeGateway {
        async fn send_typing(&self, _channel_id: &str) -> quartermaster_channels::Result<()> {
            Ok(())
        }

        async fn reply(&self, _to: &MessageRef, text: &str) -> quartermaster_channels::Result<()> {
            record(&self.log, format!("reply:{text}"));
            Ok(())
        }

        async fn send(&self, _channel_id: &str, text: &str) -> quartermaster_channels::Result<()> {
            record(&self.log, format!("send:{text}"));
            Ok(())
        }
    }

    struct FakeSession {
        log: Log,
    }

    #[async_trait]
    impl GatewaySession for FakeSession {
        fn outbound(&self) -> Arc<dyn ChannelGateway> {
            Arc::new(FakeGateway {
                log: Arc::clone(&self.log),
            })
        }

        async fn shutdown(&self) {
            record(&self.log, "gateway.shutdown");
        }
    }

    /// Hands the event sender back to the test, or fails the login.
    struct FakeConnector {
        log: Log,
        fail: bool,
        events: Mutex<Option<oneshot::Sender<mpsc::Sender<InboundEvent>>>>,
    }

    impl FakeConnector {
        fn new(log: &Log, fail: bool) -> (Self, oneshot::Receiver<mpsc::Sender<InboundEvent>>) {
            let (tx, rx) = oneshot::channel();
            let connector = Self {
                log: Arc::clone(log),
                fail,
                events: Mutex::new(Some(tx)),
            };
            (connector, rx)
        }
    }

    #[async_trait]
    impl GatewayConnector for FakeConnector {
        async fn connect(
            &self,
            events: mpsc::Sender<InboundEvent>,
            _identity: BotIdentity,
        ) -> quartermaster_channels::Result<Box<dyn GatewaySession>> {
            record(&self.log, "gateway.connect");
            if self.fail {
                return Err(quartermaster_channels::Error::unavailable("bad token"));
            }
            if let Some(tx) = self.events.lock().unwrap().take() {
                let _ = tx.send(events);
            }
            Ok(Box::new(FakeSession {
                log: Arc::clone(&self.log),
            }))
        }
    }

    struct SlowDecider {
        log: Log,
        delay: Duration,
    }

    #[async_trait]
    impl Decider for SlowDecider {
        async fn decide(&self, request: &EffectiveRequest) -> quartermaster_chat::Result<String> {
            tokio::time::sleep(self.delay).await;
            record(&self.log, "decide");
            Ok(format!("echo {}", request.user_text))
        }
    }

    fn lifecycle(log: &Log, bridge_fails: bool, connector: FakeConnector) -> Lifecycle {
        Lifecycle {
            bridge: Arc::new(FakeBridge {
                log: Arc::clone(log),
                fail: bridge_fails,
            }),
            connector: Arc::new(connector),
            decider: Arc::new(SlowDecider {
                log: Arc::clone(log),
                delay: Duration::from_millis(50),
            }),
            max_message_len: 2000,
            grace: Duration::from_secs(5),
        }
    }

    fn direct(text: &str) -> InboundEvent {
        InboundEvent {
            message_id: "m1".into(),
            author_id: "2000".into(),
            author_name: "logi_lead".into(),
            author_is_bot: false,
            is_direct_message: true,
            mentions_self: false,
            raw_text: text.into(),
            conversation_id: None,
            conversation_name: None,
            channel_id: "dm1".into(),
        }
    }

    #[tokio::test]
    async fn starts_in_order_and_shuts_down_in_reverse() {
        let log = Log::default();
        let (connector, _events) = FakeConnector::new(&log, false);
        let (stop_tx, stop_rx) = oneshot::channel::<()>();

        let run = tokio::spawn(lifecycle(&log, false, connector).run(async {
            let _ = stop_rx.await;
        }));
        tokio::time::sleep(Duration::from_millis(20)).await;
        stop_tx.send(()).unwrap();
        run.await.unwrap().unwrap();

        assert_eq!(entries(&log), vec![
            "bridge.start",
            "gateway.connect",
            "bridge.close",
            "gateway.shutdown",
        ]);
    }

    #[tokio::test]
    async fn in_flight_message_is_answered_before_the_bridge_closes() {
        let log = Log::default();
        let (connector, events) = FakeConnector::new(&log, false);
        let (stop_tx, stop_rx) = oneshot::channel::<()>();

        let run = tokio::spawn(lifecycle(&log, false, connector).run(async {
            let _ = stop_rx.await;
        }));
        let events = events.await.unwrap();
        events.send(direct("stockpiles")).await.unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;
        stop_tx.send(()).unwrap();
        run.await.unwrap().unwrap();

        assert_eq!(entries(&log), vec![
            "bridge.start",
            "gateway.connect",
            "decide",
            "reply:echo stockpiles",
            "bridge.close",
            "gateway.shutdown",
        ]);
    }

    #[tokio::test]
    async fn slow_message_is_abandoned_and_teardown_still_runs() {
        let log = Log::default();
        let (connector, events) = FakeConnector::new(&log, false);
        let (stop_tx, stop_rx) = oneshot::channel::<()>();
        let lifecycle = Lifecycle {
            decider: Arc::new(SlowDecider {
                log: Arc::clone(&log),
                delay: Duration::from_millis(500),
            }),
            grace: Duration::from_millis(100),
            ..lifecycle(&log, false, connector)
        };

        let run = tokio::spawn(lifecycle.run(async {
            let _ = stop_rx.await;
        }));
        let events = events.await.unwrap();
        events.send(direct("stockpiles")).await.unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;
        stop_tx.send(()).unwrap();
        run.await.unwrap().unwrap();
        tokio::time::sleep(Duration::from_millis(600)).await;

        assert_eq!(entries(&log), vec![
            "bridge.start",
            "gateway.connect",
            "bridge.close",
            "gateway.shutdown",
        ]);
    }

    #[tokio::test]
    async fn bridge_failure_aborts_before_gateway_login() {
        let log = Log::default();
        let (connector, _events) = FakeConnector::new(&log, false);

        let err = lifecycle(&log, true, connector)
            .run(std::future::pending())
            .await
            .unwrap_err();

        assert!(err.to_string().contains("tool server failed to start"));
        assert_eq!(entries(&log), vec!["bridge.start"]);
    }

    #[tokio::test]
    async fn login_failure_closes_the_bridge() {
        let log = Log::default();
        let (connector, _events) = FakeConnector::new(&log, true);

        let err = lifecycle(&log, false, connector)
            .run(std::future::pending())
            .await
            .unwrap_err();

        assert!(err.to_string().contains("gateway login failed"));
        assert_eq!(entries(&log), vec![
            "bridge.start",
            "gateway.connect",
            "bridge.close"
        ]);
    }

    #[tokio::test]
    async fn closed_event_stream_triggers_shutdown() {
        let log = Log::default();
        let (connector, events) = FakeConnector::new(&log, false);

        let run = tokio::spawn(lifecycle(&log, false, connector).run(std::future::pending()));
        drop(events.await.unwrap());
        run.await.unwrap().unwrap();

        assert_eq!(entries(&log), vec![
            "bridge.start",
            "gateway.connect",
            "bridge.close",
            "gateway.shutdown",
        ]);
    }
}
