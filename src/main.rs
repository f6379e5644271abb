mod commands;
mod render;
mod setup;
mod utils;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use outagecal_core::config::Settings;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "outagecal")]
#[command(about = "Keep a calendar in sync with the published power-outage schedule")]
#[command(version)]
struct Cli {
    /// Config file (default: ~/.config/outagecal/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log debug details
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Log as JSON lines
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one sync cycle: fetch, reconcile the calendar, save state
    Sync {
        /// Show the planned calendar changes without applying them
        #[arg(long)]
        dry_run: bool,
    },
    /// Fetch (or read) the schedule page and print what was extracted
    Parse {
        /// Parse a saved HTML page instead of fetching
        #[arg(short, long)]
        file: Option<PathBuf>,

        /// Print as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show the tracked schedule fingerprints
    State {
        /// Forget all tracked fingerprints; the next sync rewrites today and tomorrow
        #[arg(long)]
        reset: bool,
    },
    /// Write a default config file
    Init {
        /// Overwrite an existing config file
        #[arg(long)]
        force: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.json_logs);

    let config = cli.config.as_deref();
    let quiet = cli.verbose || cli.json_logs;
    tracing::debug!(config = ?config, "Starting outagecal v{}", env!("CARGO_PKG_VERSION"));

    match cli.command {
        Commands::Sync { dry_run } => {
            commands::sync::run(&Settings::load(config)?, dry_run, quiet).await
        }
        Commands::Parse { file, json } => {
            commands::parse::run(&Settings::load(config)?, file, json, quiet).await
        }
        Commands::State { reset } => commands::state::run(&Settings::load(config)?, reset),
        Commands::Init { force } => commands::init::run(config, force),
    }
}

fn init_tracing(verbose: bool, json_logs: bool) {
    let default_filter = if verbose {
        "info,outagecal=debug,outagecal_core=debug"
    } else {
        "info"
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    if json_logs {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["outagecal", "sync", "--dry-run", "-v", "--config", "/tmp/o.toml"])
            .unwrap();
        assert!(cli.verbose);
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/o.toml")));
        assert!(matches!(cli.command, Commands::Sync { dry_run: true }));
    }
}
