//! Process-wide tool session: at most one live server, started once.

use std::sync::{Arc, RwLock};

use {
    async_trait::async_trait,
    serde_json::Value,
    tokio::sync::Mutex,
    tracing::{debug, info, warn},
};

use crate::{
    client::{McpClient, StdioServerSpec},
    error::{Error, Result},
    traits::{McpClientTrait, McpConnector},
    types::{McpToolDef, ToolsCallResult},
};

/// Lifecycle of the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Uninitialized,
    Connecting,
    Ready,
    Closed,
}

/// Launches a stdio tool server per [`StdioServerSpec`].
pub struct StdioConnector {
    spec: StdioServerSpec,
}

impl StdioConnector {
    pub fn new(spec: StdioServerSpec) -> Self {
        Self { spec }
    }
}

#[async_trait]
impl McpConnector for StdioConnector {
    async fn connect(&self) -> Result<Arc<dyn McpClientTrait>> {
        let client = McpClient::connect(&self.spec).await?;
        Ok(Arc::new(client))
    }
}

struct Inner {
    state: SessionState,
    client: Option<Arc<dyn McpClientTrait>>,
}

/// Shared handle to the tool server.
///
/// Concurrent `initialize` calls start exactly one server; every caller gets
/// the same client back. Tool calls may run concurrently once ready.
pub struct ToolSession {
    connector: Arc<dyn McpConnector>,
    /// Serializes start and close. Never held across a tool call.
    start_gate: Mutex<()>,
    inner: RwLock<Inner>,
}

impl ToolSession {
    pub fn new(connector: Arc<dyn McpConnector>) -> Self {
        Self {
            connector,
            start_gate: Mutex::new(()),
            inner: RwLock::new(Inner {
                state: SessionState::Uninitialized,
                client: None,
            }),
        }
    }

    /// Session over a stdio child process.
    pub fn stdio(spec: StdioServerSpec) -> Self {
        Self::new(Arc::new(StdioConnector::new(spec)))
    }

    pub fn state(&self) -> SessionState {
        self.inner.read().unwrap_or_else(|e| e.into_inner()).state
    }

    fn ready_client(&self) -> Option<Arc<dyn McpClientTrait>> {
        let inner = self.inner.read().unwrap_or_else(|e| e.into_inner());
        match inner.state {
            SessionState::Ready => inner.client.clone(),
            _ => None,
        }
    }

    fn set(&self, state: SessionState, client: Option<Arc<dyn McpClientTrait>>) {
        let mut inner = self.inner.write().unwrap_or_else(|e| e.into_inner());
        inner.state = state;
        inner.client = client;
    }

    /// Start the server if it is not running and return the ready client.
    pub async fn initialize(&self) -> Result<Arc<dyn McpClientTrait>> {
        if let Some(client) = self.ready_client() {
            return Ok(client);
        }

        let _gate = self.start_gate.lock().await;
        if let Some(client) = self.ready_client() {
            debug!("tool session already started by a concurrent caller");
            return Ok(client);
        }

        let previous = self.state();
        self.set(SessionState::Connecting, None);

        match self.connector.connect().await {
            Ok(client) => {
                info!(server = %client.server_name(), "tool session ready");
                self.set(SessionState::Ready, Some(Arc::clone(&client)));
                Ok(client)
            },
            Err(e) => {
                warn!(error = %e, "tool session failed to start");
                self.set(previous, None);
                Err(e.into_startup("tool server startup failed"))
            },
        }
    }

    /// Fetch the tool catalog from the running server.
    pub async fn list_tools(&self) -> Result<Vec<McpToolDef>> {
        let client = self.ready_client().ok_or(Error::NotInitialized)?;
        client.list_tools().await
    }

    /// Invoke a tool. Fails with [`Error::NotInitialized`] before
    /// `initialize` or after `close`.
    pub async fn call_tool(&self, name: &str, arguments: Value) -> Result<ToolsCallResult> {
        let client = self.ready_client().ok_or(Error::NotInitialized)?;
        client.call_tool(name, arguments).await
    }

    /// Shut the server down. Idempotent; a session that never started is
    /// left untouched.
    pub async fn close(&self) {
        let _gate = self.start_gate.lock().await;
        let client = {
            let mut inner = self.inner.write().unwrap_or_else(|e| e.into_inner());
            match inner.state {
                SessionState::Uninitialized | SessionState::Closed => return,
                _ => {},
            }
            inner.state = SessionState::Closed;
            inner.client.take()
        };

        if let Some(client) = client {
            info!(server = %client.server_name(), "closing tool session");
            client.shutdown().await;
        }
    }
}
