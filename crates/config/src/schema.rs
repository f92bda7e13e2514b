//! Config schema types (discord gateway, tool server, llm, shutdown).
use std::{collections::HashMap, time::Duration};

use {secrecy::Secret, serde::Deserialize};

/// Discord's per-message character limit.
pub const DISCORD_MAX_MESSAGE_LEN: usize = 2000;

/// Root configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct QuartermasterConfig {
    pub discord: DiscordConfig,
    pub mcp: McpServerConfig,
    pub llm: LlmConfig,
    pub shutdown: ShutdownConfig,
}

/// Discord gateway account.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DiscordConfig {
    /// Bot token. Usually supplied through `DISCORD_BOT_TOKEN`.
    pub token: Option<Secret<String>>,
    /// Upper bound for a single outbound message, in characters.
    pub max_message_len: usize,
    /// "Watching ..." presence text shown once the bot is ready.
    pub activity: String,
}

impl Default for DiscordConfig {
    fn default() -> Self {
        Self {
            token: None,
            max_message_len: DISCORD_MAX_MESSAGE_LEN,
            activity: "Foxhole logistics".into(),
        }
    }
}

/// Tool server child process.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct McpServerConfig {
    /// Executable to spawn, e.g. `python` or `/usr/local/bin/qm-tools`.
    pub command: String,
    pub args: Vec<String>,
    /// Extra variables layered on top of the inherited environment.
    pub env: HashMap<String, String>,
    /// How long a single request waits for its response.
    pub request_timeout_secs: u64,
    /// How long `close` waits for the child to exit before killing it.
    pub shutdown_grace_secs: u64,
    /// Name announced in the `initialize` handshake.
    pub client_name: String,
}

impl Default for McpServerConfig {
    fn default() -> Self {
        Self {
            command: String::new(),
            args: Vec::new(),
            env: HashMap::new(),
            request_timeout_secs: 60,
            shutdown_grace_secs: 5,
            client_name: "quartermaster".into(),
        }
    }
}

impl McpServerConfig {
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    #[must_use]
    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }
}

/// OpenAI-compatible chat completion endpoint used by the tool-loop decider.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub base_url: String,
    pub api_key: Option<Secret<String>>,
    pub model: String,
    /// Maximum model round-trips per request, tool calls included.
    pub max_iterations: usize,
    pub request_timeout_secs: u64,
    pub temperature: Option<f32>,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".into(),
            api_key: None,
            model: "gpt-4o-mini".into(),
            max_iterations: 5,
            request_timeout_secs: 120,
            temperature: None,
        }
    }
}

impl LlmConfig {
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ShutdownConfig {
    /// Upper bound for the whole graceful shutdown sequence.
    pub grace_secs: u64,
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self { grace_secs: 10 }
    }
}

impl ShutdownConfig {
    #[must_use]
    pub fn grace(&self) -> Duration {
        Duration::from_secs(self.grace_secs)
    }
}
