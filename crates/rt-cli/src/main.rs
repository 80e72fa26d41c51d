//! revtun CLI
//!
//! Manages reverse SSH port-forwarding tunnels to a fixed relay host:
//! - add: establish a tunnel and record it in the registry
//! - stop / list / reset / cleanup: lifecycle management of recorded tunnels
//!
//! All registry mutations are serialized across invocations by an advisory
//! file lock, so concurrent terminal sessions cannot corrupt shared state.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use revtun::commands;
use rt_core::config::{self, RelayConfig};

#[derive(Parser)]
#[command(name = "revtun")]
#[command(author, version, about = "Reverse SSH tunnel manager")]
#[command(propagate_version = true)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Open a reverse tunnel exposing a local port through the relay
    Add {
        /// Local port to expose
        port: String,
    },

    /// Stop one tunnel, or all of them
    Stop {
        /// Local port of the tunnel to stop, or "all"
        target: String,
    },

    /// List active tunnels
    List,

    /// Kill every tunnel (tracked or orphaned) and wipe the registry
    Reset {
        /// Skip the confirmation prompt
        #[arg(short, long)]
        force: bool,
    },

    /// Drop registry entries whose owning process has exited
    Cleanup,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    let log_level = match (cli.quiet, cli.verbose) {
        (true, _) => "error",
        (false, 0) => "warn",
        (false, 1) => "info",
        (false, 2) => "debug",
        (false, _) => "trace",
    };

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| log_level.into()),
        ))
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    let config = load_relay_config(cli.config.as_ref())?;

    match cli.command {
        Commands::Add { port } => commands::add_command(&config, &port).await,
        Commands::Stop { target } => commands::stop_command(&config, &target).await,
        Commands::List => commands::list_command(&config).await,
        Commands::Reset { force } => commands::reset_command(&config, force).await,
        Commands::Cleanup => commands::cleanup_command(&config).await,
    }
}

/// Load the relay configuration.
///
/// An explicitly passed path must load; the default path is optional and
/// falls back to defaults when missing or unreadable.
fn load_relay_config(path: Option<&PathBuf>) -> Result<RelayConfig> {
    if let Some(path) = path {
        return config::load_config(path)
            .with_context(|| format!("Failed to load config from {:?}", path));
    }

    let default_path = config::default_config_path();
    if default_path.exists() {
        Ok(config::load_config(&default_path).unwrap_or_else(|e| {
            tracing::warn!("Failed to load config from {:?}: {}", default_path, e);
            RelayConfig::default()
        }))
    } else {
        tracing::debug!("No config file at {:?}, using defaults", default_path);
        Ok(RelayConfig::default())
    }
}
