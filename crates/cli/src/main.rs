mod config_commands;
mod lifecycle;

use std::{path::PathBuf, sync::Arc};

use {
    anyhow::Context,
    clap::{Parser, Subcommand},
    tracing::{info, warn},
    tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt},
};

use {
    quartermaster_agents::{OpenAiCompatProvider, ToolLoopDecider},
    quartermaster_config::{QuartermasterConfig, discover_and_load, validate},
    quartermaster_discord::DiscordConnector,
    quartermaster_mcp::{StdioServerSpec, ToolSession, types::ClientInfo},
};

use crate::{
    config_commands::ConfigAction,
    lifecycle::{Lifecycle, shutdown_signal},
};

#[derive(Parser)]
#[command(name = "quartermaster", about = "Quartermaster, Foxhole logistics assistant for Discord")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Config file (overrides discovery in ./ and ~/.config/quartermaster/).
    #[arg(long, global = true, env = "QUARTERMASTER_CONFIG")]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Output logs as JSON instead of human-readable.
    #[arg(long, global = true, default_value_t = false)]
    json_logs: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the bot (default when no subcommand is provided).
    Run,
    /// Configuration management.
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

fn init_telemetry(cli: &Cli) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));

    let registry = tracing_subscriber::registry().with(filter);

    if cli.json_logs {
        registry
            .with(fmt::layer().json().with_target(true).with_thread_ids(false))
            .init();
    } else {
        registry
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_ansi(true),
            )
            .init();
    }
}

fn server_spec(config: &QuartermasterConfig) -> StdioServerSpec {
    StdioServerSpec {
        args: config.mcp.args.clone(),
        env: config.mcp.env.clone(),
        request_timeout: config.mcp.request_timeout(),
        shutdown_grace: config.mcp.shutdown_grace(),
        client_info: ClientInfo::new(&config.mcp.client_name, env!("CARGO_PKG_VERSION")),
        ..StdioServerSpec::new(&config.mcp.command)
    }
}

async fn run_bot(config_path: Option<PathBuf>) -> anyhow::Result<()> {
    let config = discover_and_load(config_path.as_deref()).context("failed to load config")?;
    let report = validate(&config).into_result()?;
    for warning in &report.diagnostics {
        warn!(path = warning.path, "{}", warning.message);
    }

    let token = config
        .discord
        .token
        .clone()
        .context("discord.token is not set")?;

    let tools = Arc::new(ToolSession::stdio(server_spec(&config)));
    let provider = OpenAiCompatProvider::from_config(&config.llm)?;
    info!(model = %config.llm.model, base_url = %config.llm.base_url, "llm provider configured");
    let decider = ToolLoopDecider::new(
        Arc::new(provider),
        tools.clone(),
        config.llm.max_iterations,
    );

    Lifecycle {
        bridge: tools,
        connector: Arc::new(DiscordConnector::new(token, &config.discord.activity)),
        decider: Arc::new(decider),
        max_message_len: config.discord.max_message_len,
        grace: config.shutdown.grace(),
    }
    .run(shutdown_signal())
    .await
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_telemetry(&cli);

    info!(version = env!("CARGO_PKG_VERSION"), "quartermaster starting");

    match cli.command {
        None | Some(Commands::Run) => run_bot(cli.config).await,
        Some(Commands::Config { action }) => {
            config_commands::handle_config(action, cli.config.as_deref())
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_spec_carries_config_values() {
        let mut config = QuartermasterConfig::default();
        config.mcp.command = "qm-tools".into();
        config.mcp.args = vec!["--stdio".into()];
        config.mcp.request_timeout_secs = 30;
        config.mcp.client_name = "qm-bot".into();

        let spec = server_spec(&config);

        assert_eq!(spec.command, "qm-tools");
        assert_eq!(spec.args, vec!["--stdio".to_string()]);
        assert_eq!(spec.request_timeout.as_secs(), 30);
        assert_eq!(spec.shutdown_grace.as_secs(), 5);
        assert_eq!(spec.client_info.name, "qm-bot");
    }

    #[test]
    fn no_subcommand_runs_the_bot() {
        let cli = Cli::try_parse_from(["quartermaster", "--json-logs"]).unwrap();
        assert!(cli.command.is_none());
        assert!(cli.json_logs);
        assert_eq!(cli.log_level, "info");
    }
}
