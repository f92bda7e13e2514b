//! Semantic validation of a loaded [`QuartermasterConfig`].

use secrecy::ExposeSecret;

use crate::{
    error::{Error, Result},
    schema::{DISCORD_MAX_MESSAGE_LEN, QuartermasterConfig},
};

/// Severity level for a diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Error,
    Warning,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Error => write!(f, "error"),
            Self::Warning => write!(f, "warning"),
        }
    }
}

/// A single validation finding.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub severity: Severity,
    /// Category: "missing", "range".
    pub category: &'static str,
    /// Dotted path, e.g. "mcp.command".
    pub path: &'static str,
    pub message: String,
}

/// Result of validating a configuration.
#[derive(Debug, Clone, Default)]
pub struct ValidationResult {
    pub diagnostics: Vec<Diagnostic>,
}

impl ValidationResult {
    /// Returns `true` if any diagnostic is an error.
    #[must_use]
    pub fn has_errors(&self) -> bool {
        self.diagnostics
            .iter()
            .any(|d| d.severity == Severity::Error)
    }

    /// Count diagnostics by severity.
    #[must_use]
    pub fn count(&self, severity: Severity) -> usize {
        self.diagnostics
            .iter()
            .filter(|d| d.severity == severity)
            .count()
    }

    /// One-line rendering of every error diagnostic.
    #[must_use]
    pub fn summary(&self) -> String {
        self.diagnostics
            .iter()
            .filter(|d| d.severity == Severity::Error)
            .map(|d| format!("{}: {}", d.path, d.message))
            .collect::<Vec<_>>()
            .join("; ")
    }

    /// Turn a result containing errors into [`Error::Invalid`].
    pub fn into_result(self) -> Result<Self> {
        if self.has_errors() {
            Err(Error::Invalid(self))
        } else {
            Ok(self)
        }
    }

    fn error(&mut self, category: &'static str, path: &'static str, message: impl Into<String>) {
        self.diagnostics.push(Diagnostic {
            severity: Severity::Error,
            category,
            path,
            message: message.into(),
        });
    }

    fn warning(&mut self, category: &'static str, path: &'static str, message: impl Into<String>) {
        self.diagnostics.push(Diagnostic {
            severity: Severity::Warning,
            category,
            path,
            message: message.into(),
        });
    }
}

/// Check the settings the bot cannot start without, plus obviously bad
/// ranges.
#[must_use]
pub fn validate(config: &QuartermasterConfig) -> ValidationResult {
    let mut result = ValidationResult::default();

    let token_missing = config
        .discord
        .token
        .as_ref()
        .is_none_or(|t| t.expose_secret().trim().is_empty());
    if token_missing {
        result.error(
            "missing",
            "discord.token",
            "a bot token is required (set DISCORD_BOT_TOKEN)",
        );
    }

    match config.discord.max_message_len {
        0 => result.error("range", "discord.max_message_len", "must be greater than 0"),
        n if n > DISCORD_MAX_MESSAGE_LEN => result.warning(
            "range",
            "discord.max_message_len",
            format!("{n} exceeds Discord's {DISCORD_MAX_MESSAGE_LEN} character limit"),
        ),
        _ => {},
    }

    if config.mcp.command.trim().is_empty() {
        result.error(
            "missing",
            "mcp.command",
            "the tool server command is required (set MCP_SERVER_COMMAND)",
        );
    }
    if config.mcp.request_timeout_secs == 0 {
        result.error("range", "mcp.request_timeout_secs", "must be greater than 0");
    }

    if config.llm.max_iterations == 0 {
        result.error("range", "llm.max_iterations", "must be greater than 0");
    }
    if config.llm.api_key.is_none() {
        result.warning(
            "missing",
            "llm.api_key",
            "no api key configured; only keyless endpoints will work",
        );
    }

    result
}
