//! MCP client: the protocol handshake and tool interactions with one server.

use std::{
    collections::HashMap,
    sync::{Arc, RwLock},
    time::Duration,
};

use tracing::{debug, info, warn};

use crate::{
    error::{Error, InvocationFailure, Result},
    traits::{McpClientTrait, McpTransport},
    transport::StdioTransport,
    types::{
        ClientCapabilities, ClientInfo, InitializeParams, InitializeResult, McpToolDef,
        PROTOCOL_VERSION, ToolsCallParams, ToolsCallResult, ToolsListResult,
    },
};

/// State of a client connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum McpClientState {
    /// `initialize` completed and `notifications/initialized` sent.
    Ready,
    /// Server process exited or was shut down.
    Closed,
}

/// How to launch a stdio tool server.
#[derive(Debug, Clone)]
pub struct StdioServerSpec {
    pub command: String,
    pub args: Vec<String>,
    pub env: HashMap<String, String>,
    pub request_timeout: Duration,
    pub shutdown_grace: Duration,
    pub client_info: ClientInfo,
}

impl StdioServerSpec {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            args: Vec::new(),
            env: HashMap::new(),
            request_timeout: Duration::from_secs(60),
            shutdown_grace: Duration::from_secs(5),
            client_info: ClientInfo::new("quartermaster", env!("CARGO_PKG_VERSION")),
        }
    }
}

/// A client connected to a single tool server.
pub struct McpClient {
    server_name: String,
    transport: Arc<dyn McpTransport>,
    state: RwLock<McpClientState>,
    tools: RwLock<Vec<McpToolDef>>,
    shutdown_grace: Duration,
}

impl McpClient {
    /// Spawn the server process and perform the handshake.
    pub async fn connect(spec: &StdioServerSpec) -> Result<Self> {
        let transport =
            StdioTransport::spawn(&spec.command, &spec.args, &spec.env, spec.request_timeout)
                .await?;

        match Self::handshake(transport.clone(), &spec.client_info, spec.shutdown_grace).await {
            Ok(client) => Ok(client),
            Err(e) => {
                warn!(command = %spec.command, error = %e, "tool server handshake failed");
                transport.shutdown(spec.shutdown_grace).await;
                Err(e)
            },
        }
    }

    /// Run `initialize` + `notifications/initialized` over an open transport.
    pub async fn handshake(
        transport: Arc<dyn McpTransport>,
        client_info: &ClientInfo,
        shutdown_grace: Duration,
    ) -> Result<Self> {
        let params = InitializeParams {
            protocol_version: PROTOCOL_VERSION.into(),
            capabilities: ClientCapabilities::default(),
            client_info: client_info.clone(),
        };

        let resp = transport
            .request("initialize", Some(serde_json::to_value(&params)?))
            .await
            .map_err(|e| e.into_startup("initialize request failed"))?;

        let raw = resp
            .result
            .ok_or_else(|| Error::startup("initialize returned no result"))?;
        let result: InitializeResult = serde_json::from_value(raw)
            .map_err(|e| Error::startup_with("malformed initialize result", e))?;

        info!(
            server = %result.server_info.name,
            protocol = %result.protocol_version,
            "tool server initialized"
        );

        transport
            .notify("notifications/initialized", None)
            .await
            .map_err(|e| e.into_startup("initialized notification failed"))?;

        Ok(Self {
            server_name: result.server_info.name.clone(),
            transport,
            state: RwLock::new(McpClientState::Ready),
            tools: RwLock::new(Vec::new()),
            shutdown_grace,
        })
    }

    fn ensure_ready(&self) -> Result<()> {
        if self.state() == McpClientState::Ready {
            Ok(())
        } else {
            Err(Error::NotInitialized)
        }
    }
}

#[async_trait::async_trait]
impl McpClientTrait for McpClient {
    fn server_name(&self) -> &str {
        &self.server_name
    }

    fn state(&self) -> McpClientState {
        *self.state.read().unwrap_or_else(|e| e.into_inner())
    }

    fn cached_tools(&self) -> Vec<McpToolDef> {
        self.tools.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    async fn list_tools(&self) -> Result<Vec<McpToolDef>> {
        self.ensure_ready()?;

        let resp = self.transport.request("tools/list", None).await?;
        let raw = resp
            .result
            .ok_or_else(|| Error::invocation("tools/list", InvocationFailure::MissingResult))?;
        let result: ToolsListResult = serde_json::from_value(raw)
            .map_err(|e| Error::invocation("tools/list", InvocationFailure::Malformed(e)))?;

        debug!(server = %self.server_name, count = result.tools.len(), "fetched tool catalog");

        *self.tools.write().unwrap_or_else(|e| e.into_inner()) = result.tools.clone();
        Ok(result.tools)
    }

    async fn call_tool(&self, name: &str, arguments: serde_json::Value) -> Result<ToolsCallResult> {
        self.ensure_ready()?;

        let params = ToolsCallParams {
            name: name.into(),
            arguments,
        };
        let resp = self
            .transport
            .request("tools/call", Some(serde_json::to_value(&params)?))
            .await?;

        let raw = resp
            .result
            .ok_or_else(|| Error::invocation("tools/call", InvocationFailure::MissingResult))?;
        let result: ToolsCallResult = serde_json::from_value(raw)
            .map_err(|e| Error::invocation("tools/call", InvocationFailure::Malformed(e)))?;

        if result.is_error {
            debug!(server = %self.server_name, tool = %name, "tool reported an error result");
        }
        Ok(result)
    }

    async fn shutdown(&self) {
        {
            let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
            if *state == McpClientState::Closed {
                return;
            }
            *state = McpClientState::Closed;
        }
        self.transport.shutdown(self.shutdown_grace).await;
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::sync::{
        Mutex,
        atomic::{AtomicUsize, Ordering},
    };

    use {
        super::*,
        crate::types::{JsonRpcResponse, ToolContent},
        serde_json::{Value, json},
    };

    /// Answers requests from a per-method table and records traffic.
    #[derive(Default)]
    pub(crate) struct ScriptedTransport {
        pub results: HashMap<&'static str, Value>,
        pub sent: Mutex<Vec<(String, Option<Value>)>>,
        pub notified: Mutex<Vec<String>>,
        pub shutdowns: AtomicUsize,
    }

    impl ScriptedTransport {
        pub(crate) fn ready() -> Self {
            let mut results = HashMap::new();
            results.insert(
                "initialize",
                json!({
                    "protocolVersion": PROTOCOL_VERSION,
                    "capabilities": {"tools": {}},
                    "serverInfo": {"name": "foxhole-tools", "version": "1.2.0"}
                }),
            );
            Self {
                results,
                ..Self::default()
            }
        }

        pub(crate) fn with(mut self, method: &'static str, result: Value) -> Self {
            self.results.insert(method, result);
            self
        }
    }

    #[async_trait::async_trait]
    impl McpTransport for ScriptedTransport {
        async fn request(&self, method: &str, params: Option<Value>) -> Result<JsonRpcResponse> {
            let id = {
                let mut sent = self.sent.lock().unwrap();
                sent.push((method.to_string(), params));
                sent.len()
            };
            Ok(JsonRpcResponse {
                jsonrpc: "2.0".into(),
                id: json!(id),
                result: self.results.get(method).cloned(),
                error: None,
            })
        }

        async fn notify(&self, method: &str, _params: Option<Value>) -> Result<()> {
            self.notified.lock().unwrap().push(method.to_string());
            Ok(())
        }

        async fn shutdown(&self, _grace: Duration) {
            self.shutdowns.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn info() -> ClientInfo {
        ClientInfo::new("quartermaster", "0.3.0")
    }

    #[tokio::test]
    async fn handshake_sends_client_info_and_initialized() {
        let transport = Arc::new(ScriptedTransport::ready());
        let client = McpClient::handshake(transport.clone(), &info(), Duration::ZERO)
            .await
            .unwrap();

        assert_eq!(client.state(), McpClientState::Ready);
        assert_eq!(client.server_name(), "foxhole-tools");
        let sent = transport.sent.lock().unwrap();
        let (method, params) = &sent[0];
        assert_eq!(method, "initialize");
        let params = params.as_ref().unwrap();
        assert_eq!(params["clientInfo"]["name"], "quartermaster");
        assert_eq!(params["protocolVersion"], PROTOCOL_VERSION);
        assert_eq!(*transport.notified.lock().unwrap(), vec![
            "notifications/initialized".to_string()
        ]);
    }

    #[tokio::test]
    async fn handshake_without_result_is_startup_error() {
        let transport = Arc::new(ScriptedTransport::default());
        let err = McpClient::handshake(transport, &info(), Duration::ZERO)
            .await
            .err()
            .unwrap();
        assert!(matches!(err, Error::BridgeStartup { .. }));
    }

    #[tokio::test]
    async fn tool_error_result_is_not_a_failure() {
        let transport = Arc::new(ScriptedTransport::ready().with(
            "tools/call",
            json!({"content": [{"type": "text", "text": "unknown regiment"}], "isError": true}),
        ));
        let client = McpClient::handshake(transport.clone(), &info(), Duration::ZERO)
            .await
            .unwrap();

        let result = client
            .call_tool("search_inventory", json!({"query": "bmat"}))
            .await
            .unwrap();
        assert!(result.is_error);
        assert_eq!(result.content, vec![ToolContent::Text {
            text: "unknown regiment".into()
        }]);

        let sent = transport.sent.lock().unwrap();
        let (_, params) = sent.last().unwrap();
        assert_eq!(params.as_ref().unwrap()["name"], "search_inventory");
        assert_eq!(params.as_ref().unwrap()["arguments"]["query"], "bmat");
    }

    #[tokio::test]
    async fn call_without_result_is_invocation_error() {
        let transport = Arc::new(ScriptedTransport::ready());
        let client = McpClient::handshake(transport, &info(), Duration::ZERO)
            .await
            .unwrap();
        let err = client.call_tool("anything", json!({})).await.unwrap_err();
        assert!(matches!(err, Error::ToolInvocation {
            failure: InvocationFailure::MissingResult,
            ..
        }));
    }

    #[tokio::test]
    async fn list_tools_refreshes_cache() {
        let transport = Arc::new(ScriptedTransport::ready().with(
            "tools/list",
            json!({"tools": [
                {"name": "get_dashboard_stats", "description": "Regiment overview"},
                {"name": "search_inventory", "inputSchema": {"type": "object"}}
            ]}),
        ));
        let client = McpClient::handshake(transport, &info(), Duration::ZERO)
            .await
            .unwrap();
        assert!(client.cached_tools().is_empty());

        let tools = client.list_tools().await.unwrap();
        assert_eq!(tools.len(), 2);
        assert_eq!(client.cached_tools(), tools);
    }

    #[tokio::test]
    async fn shutdown_is_idempotent_and_blocks_calls() {
        let transport = Arc::new(ScriptedTransport::ready());
        let client = McpClient::handshake(transport.clone(), &info(), Duration::ZERO)
            .await
            .unwrap();

        client.shutdown().await;
        client.shutdown().await;

        assert_eq!(transport.shutdowns.load(Ordering::SeqCst), 1);
        assert_eq!(client.state(), McpClientState::Closed);
        let err = client.call_tool("x", json!({})).await.unwrap_err();
        assert!(err.is_not_initialized());
    }

    #[tokio::test]
    async fn connect_to_missing_binary_fails_at_startup() {
        let spec = StdioServerSpec::new("nonexistent_tool_server_qm");
        let err = McpClient::connect(&spec).await.err().unwrap();
        assert!(matches!(err, Error::BridgeStartup { .. }));
    }
}
