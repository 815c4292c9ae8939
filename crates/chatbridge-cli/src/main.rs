//! # chatbridge-cli
//!
//! Command-line interface for Chatbridge.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use chatbridge_core::error::format_error_with_suggestion;
use chatbridge_core::Config;

mod commands;
mod console;
mod repl;

/// Application context containing shared state.
pub struct AppContext {
    pub config: Config,
}

/// Chatbridge - streams LLM answers into a chat conversation
#[derive(Parser)]
#[command(name = "chatbridge")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Additional config file layered over the defaults
    #[arg(short, long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Model to use (e.g., gpt-4o, gpt-4o-mini)
    #[arg(short, long)]
    model: Option<String>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Chat with the agent from the terminal (default)
    Chat {
        /// Channel id used for the conversation
        #[arg(long, default_value = "messaging:console")]
        channel: String,
        /// Writing task attached to every message
        #[arg(short, long)]
        task: Option<String>,
    },
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
enum ConfigAction {
    /// Show current configuration
    Show,
    /// Validate the configuration
    Validate,
    /// Print the user config file path
    Path,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging; stdout belongs to the chat
    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    // Load configuration; diagnostics report problems instead of failing on them
    let lenient = matches!(
        cli.command,
        Some(Commands::Doctor)
            | Some(Commands::Config {
                action: ConfigAction::Validate
            })
    );
    let mut config = if lenient {
        match cli.config.clone() {
            Some(path) => Config::load_from(path),
            None => Config::load(),
        }?
    } else {
        Config::load_validated(cli.config.clone())
            .map_err(|e| anyhow::anyhow!(format_error_with_suggestion(&e)))?
    };
    if let Some(model) = cli.model {
        config.model.model = model;
    }

    let ctx = AppContext { config };

    match cli.command {
        Some(Commands::Chat { channel, task }) => {
            commands::chat::run(&ctx, &channel, task).await?;
        }
        Some(Commands::Config { action }) => {
            commands::config::handle(action, &ctx)?;
        }
        Some(Commands::Version) => {
            println!("chatbridge {}", env!("CARGO_PKG_VERSION"));
        }
        Some(Commands::Doctor) => {
            commands::doctor::run(&ctx)?;
        }
        None => {
            commands::chat::run(&ctx, "messaging:console", None).await?;
        }
    }

    Ok(())
}
