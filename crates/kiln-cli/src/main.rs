//! # kiln-cli
//!
//! Command-line interface for Kiln.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use kiln_core::Config;

mod commands;
mod console;

/// Kiln - conversational game-world agent
#[derive(Parser)]
#[command(name = "kiln")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Agent name (overrides general.name)
    #[arg(short, long, env = "KILN_NAME")]
    name: Option<String>,

    /// Explicit config file instead of ~/.config/kiln/config.toml
    #[arg(short, long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the agent against the console (default)
    Run,
    /// List the reactive modes and whether they are on
    Modes,
    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
    /// Show version information
    Version,
    /// Diagnose installation issues
    Doctor,
}

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Show the effective configuration
    Show,
    /// Validate the configuration and report issues
    Validate,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    // Load configuration
    let loaded = match cli.config {
        Some(ref path) => Config::load_from(path.clone()),
        None => Config::load(),
    };
    let mut config = loaded.unwrap_or_else(|e| {
        tracing::warn!("Failed to load config, using defaults: {}", e);
        Config::default()
    });
    if let Some(ref name) = cli.name {
        config.general.name = name.clone();
    }

    match cli.command {
        Some(Commands::Config { action }) => commands::config::handle(action, &config)?,
        Some(Commands::Modes) => commands::modes::list(&config),
        Some(Commands::Version) => {
            println!("kiln {}", env!("CARGO_PKG_VERSION"));
        }
        Some(Commands::Doctor) => commands::doctor::run(&config),
        Some(Commands::Run) | None => commands::run::run(config).await?,
    }

    Ok(())
}
