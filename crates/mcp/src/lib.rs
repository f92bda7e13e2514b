//! Tool server support: a long-lived MCP child process driven over stdio.
//!
//! This crate provides:
//! - JSON-RPC 2.0 wire types and MCP payloads (`types`)
//! - Line-delimited stdio transport with id-correlated requests (`transport`)
//! - MCP client for the handshake and tool interactions (`client`)
//! - The injectable, single-flight [`ToolSession`] owning one child (`session`)

pub mod client;
pub mod error;
pub mod session;
pub mod traits;
pub mod transport;
pub mod types;

pub use {
    client::{McpClient, McpClientState, StdioServerSpec},
    error::{Error, InvocationFailure, Result},
    session::{SessionState, StdioConnector, ToolSession},
    traits::{McpClientTrait, McpConnector, McpTransport},
    types::{McpToolDef, ToolContent, ToolsCallResult},
};
