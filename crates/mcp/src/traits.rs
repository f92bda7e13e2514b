//! Seams between the session, the client and the transport.
//!
//! The session only talks to [`McpConnector`] and [`McpClientTrait`], so tests
//! can substitute in-process fakes for the child process.

use std::{sync::Arc, time::Duration};

use {async_trait::async_trait, serde_json::Value};

use crate::{
    client::McpClientState,
    error::Result,
    types::{JsonRpcResponse, McpToolDef, ToolsCallResult},
};

/// Request/response channel to a tool server.
///
/// Implementations must allow many `request` calls in flight at once and
/// route each response to its caller by correlation id.
#[async_trait]
pub trait McpTransport: Send + Sync {
    /// Send a request and wait for the matching response.
    async fn request(&self, method: &str, params: Option<Value>) -> Result<JsonRpcResponse>;

    /// Send a notification (no response expected).
    async fn notify(&self, method: &str, params: Option<Value>) -> Result<()>;

    /// Ask the server to exit, waiting up to `grace` before killing it.
    /// Pending requests fail with a closed-transport error.
    async fn shutdown(&self, grace: Duration);
}

/// A connected, handshaken tool server.
#[async_trait]
pub trait McpClientTrait: Send + Sync {
    /// Name the server reported during the handshake.
    fn server_name(&self) -> &str;

    fn state(&self) -> McpClientState;

    /// Tool definitions from the last successful `list_tools`.
    fn cached_tools(&self) -> Vec<McpToolDef>;

    /// Fetch the catalog fresh from the server and refresh the cache.
    async fn list_tools(&self) -> Result<Vec<McpToolDef>>;

    async fn call_tool(&self, name: &str, arguments: Value) -> Result<ToolsCallResult>;

    async fn shutdown(&self);
}

/// Produces a fresh, ready client. One call means one child process.
#[async_trait]
pub trait McpConnector: Send + Sync {
    async fn connect(&self) -> Result<Arc<dyn McpClientTrait>>;
}
