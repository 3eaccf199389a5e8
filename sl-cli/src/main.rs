//! ScanLink CLI - run the realtime client from a terminal.
//!
//! Connects to a ScanLink server over WebSocket, subscribes to channels and
//! prints scan updates, alerts and channel payloads as they arrive. Useful for
//! headless monitoring, scripting and debugging server-side event streams.

mod commands;
mod notifier;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing::info;

use sl_core::config::AppConfig;
use sl_core::error::SlResult;
use sl_core::logging;

/// ScanLink - realtime scan and alert client.
#[derive(Parser)]
#[command(
    name = "scanlink",
    version,
    about = "ScanLink realtime client CLI",
    long_about = "A command-line client for ScanLink realtime events.\n\
                   Subscribes to scan, alert and status channels over a single WebSocket connection."
)]
struct Cli {
    /// Path to the configuration file.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging (debug level).
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Output format (text, json).
    #[arg(short = 'f', long, global = true, default_value = "text")]
    format: OutputFormat,

    #[command(subcommand)]
    command: Commands,
}

/// Output format for CLI responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text output.
    Text,
    /// JSON lines for scripting.
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Connect and print events until interrupted.
    Listen {
        /// Server URL (overrides config).
        #[arg(short, long)]
        url: Option<String>,
        /// Channel to subscribe to; repeat for several. Added to the configured channels.
        #[arg(short = 'C', long = "channel")]
        channels: Vec<String>,
        /// Show desktop notifications (overrides config).
        #[arg(long)]
        desktop: bool,
    },
    /// Connect, send one message and disconnect.
    Send {
        /// Message type.
        #[arg(short = 't', long = "type")]
        kind: String,
        /// Extra field as key=value; values are parsed as JSON when possible.
        #[arg(short = 'F', long = "field")]
        fields: Vec<String>,
        /// Server URL (overrides config).
        #[arg(short, long)]
        url: Option<String>,
    },
    /// Inspect and initialize the configuration file.
    Config {
        #[command(subcommand)]
        action: commands::config::ConfigAction,
    },
}

#[tokio::main]
async fn main() -> SlResult<()> {
    let cli = Cli::parse();

    let config_path = match cli.config {
        Some(path) => path,
        None => AppConfig::default_config_path()?,
    };

    // `config init` must work even when the existing file is broken.
    if let Commands::Config { action } = cli.command {
        return commands::config::run(&config_path, action, cli.format);
    }

    let config = AppConfig::load_or_default(&config_path)?;
    let _guard = logging::init_logging(&config.logging, cli.verbose)?;

    info!("ScanLink CLI v{}", sl_core::constants::APP_VERSION);

    match cli.command {
        Commands::Listen { url, channels, desktop } => {
            commands::listen::run(config, url, channels, desktop, cli.format).await
        }
        Commands::Send { kind, fields, url } => {
            commands::send::run(config, kind, fields, url, cli.format).await
        }
        Commands::Config { .. } => Ok(()),
    }
}
