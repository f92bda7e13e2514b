use std::path::Path;

use {anyhow::Result, clap::Subcommand};

use quartermaster_config::{Severity, ValidationResult, discover_and_load, validate};

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Load the configuration and report errors and warnings.
    Check,
}

pub fn handle_config(action: ConfigAction, path: Option<&Path>) -> Result<()> {
    match action {
        ConfigAction::Check => check(path),
    }
}

const RED: &str = "\x1b[31m";
const YELLOW: &str = "\x1b[33m";
const BOLD: &str = "\x1b[1m";
const RESET: &str = "\x1b[0m";

fn check(path: Option<&Path>) -> Result<()> {
    let config = discover_and_load(path)?;
    let result = validate(&config);

    for line in render(&result) {
        eprintln!("{line}");
    }

    let errors = result.count(Severity::Error);
    let warnings = result.count(Severity::Warning);
    if errors == 0 && warnings == 0 {
        eprintln!("No issues found.");
    } else {
        eprintln!("\n{errors} error(s), {warnings} warning(s)");
    }

    if errors > 0 {
        std::process::exit(1);
    }
    Ok(())
}

fn render(result: &ValidationResult) -> Vec<String> {
    result
        .diagnostics
        .iter()
        .map(|d| {
            let color = match d.severity {
                Severity::Error => RED,
                Severity::Warning => YELLOW,
            };
            format!(
                "  {BOLD}{color}{}{RESET} {}: {}",
                d.severity, d.path, d.message
            )
        })
        .collect()
}
