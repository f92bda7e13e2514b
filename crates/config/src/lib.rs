//! Configuration loading, env substitution, overrides and validation.
//!
//! Config files: `quartermaster.toml`, `quartermaster.yaml` or
//! `quartermaster.json`, searched in `./` then `~/.config/quartermaster/`.
//!
//! Supports `${ENV_VAR}` substitution in all string values.

pub mod env_subst;
pub mod error;
pub mod loader;
pub mod schema;
pub mod validate;

pub use {
    error::{Error, Result},
    loader::{apply_env_overrides, discover_and_load, load_config},
    schema::{
        DiscordConfig, LlmConfig, McpServerConfig, QuartermasterConfig, ShutdownConfig,
    },
    validate::{Diagnostic, Severity, ValidationResult, validate},
};
