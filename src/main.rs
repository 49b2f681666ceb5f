//! fxcore CLI - Audio Effect Processing Core
//!
//! Command-line front end for offline rendering through the effect units.

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser};
use tracing::info;
use tracing_subscriber::EnvFilter;

use fxcore::cli::{commands, Cli, Commands};
use fxcore::FxConfig;

fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter.into()),
        )
        .init();

    info!("fxcore v{}", env!("CARGO_PKG_VERSION"));

    let config = match &cli.config {
        Some(path) => FxConfig::load(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => FxConfig::default(),
    };

    match cli.command {
        Some(cmd) => handle_command(cmd, &config),
        None => {
            Cli::command().print_help()?;
            Ok(())
        }
    }
}

fn handle_command(cmd: Commands, config: &FxConfig) -> Result<()> {
    match cmd {
        Commands::Render(args) => commands::render(&args, config),
        Commands::Curve { kind, value } => commands::curve(&kind, value),
        Commands::Effects => commands::list_effects(),
    }
}
