use std::path::{Path, PathBuf};

use {
    secrecy::Secret,
    tracing::{debug, info},
};

use crate::{
    env_subst::substitute_env,
    error::{Error, Result},
    schema::QuartermasterConfig,
};

/// Standard config file names, checked in order.
const CONFIG_FILENAMES: &[&str] = &[
    "quartermaster.toml",
    "quartermaster.yaml",
    "quartermaster.yml",
    "quartermaster.json",
];

/// Load config from the given path (any supported format).
pub fn load_config(path: &Path) -> Result<QuartermasterConfig> {
    let raw = std::fs::read_to_string(path).map_err(|source| Error::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let raw = substitute_env(&raw);
    parse_config(&raw, path)
}

/// Load the explicit `path` if given, otherwise discover a config file in the
/// standard locations, then layer environment overrides on top.
///
/// Search order:
/// 1. `./quartermaster.{toml,yaml,yml,json}` (project-local)
/// 2. `~/.config/quartermaster/quartermaster.{toml,yaml,yml,json}`
///
/// Falls back to defaults when no file exists; a file that exists but does
/// not parse is an error.
pub fn discover_and_load(path: Option<&Path>) -> Result<QuartermasterConfig> {
    let found = match path {
        Some(p) => Some(p.to_path_buf()),
        None => find_config_file(),
    };

    let mut config = match found {
        Some(p) => {
            info!(path = %p.display(), "loading config");
            load_config(&p)?
        },
        None => {
            debug!("no config file found, using defaults");
            QuartermasterConfig::default()
        },
    };

    apply_env_overrides(&mut config);
    Ok(config)
}

/// Overlay well-known environment variables onto `config`.
pub fn apply_env_overrides(config: &mut QuartermasterConfig) {
    apply_env_overrides_with(config, |name| std::env::var(name).ok());
}

fn apply_env_overrides_with(
    config: &mut QuartermasterConfig,
    lookup: impl Fn(&str) -> Option<String>,
) {
    let non_empty = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

    if let Some(token) = non_empty("DISCORD_BOT_TOKEN") {
        config.discord.token = Some(Secret::new(token));
    }
    if let Some(command) = non_empty("MCP_SERVER_COMMAND") {
        config.mcp.command = command;
    }
    if let Some(key) = non_empty("LLM_API_KEY") {
        config.llm.api_key = Some(Secret::new(key));
    }
    if let Some(url) = non_empty("LLM_BASE_URL") {
        config.llm.base_url = url;
    }
    if let Some(model) = non_empty("LLM_MODEL") {
        config.llm.model = model;
    }
}

/// Find the first config file in standard locations.
fn find_config_file() -> Option<PathBuf> {
    for name in CONFIG_FILENAMES {
        let p = PathBuf::from(name);
        if p.exists() {
            return Some(p);
        }
    }

    let dirs = directories::ProjectDirs::from("", "", "quartermaster")?;
    CONFIG_FILENAMES
        .iter()
        .map(|name| dirs.config_dir().join(name))
        .find(|p| p.exists())
}

fn parse_config(raw: &str, path: &Path) -> Result<QuartermasterConfig> {
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("toml");

    match ext {
        "toml" => Ok(toml::from_str(raw)?),
        "yaml" | "yml" => Ok(serde_yaml::from_str(raw)?),
        "json" => Ok(serde_json::from_str(raw)?),
        other => Err(Error::UnsupportedFormat {
            extension: other.to_string(),
        }),
    }
}
