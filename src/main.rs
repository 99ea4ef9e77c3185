//! # DSA Mirror CLI (`dsa`)
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `dsa init` | Create the SQLite database and run schema migrations |
//! | `dsa sync` | Sync the mirror (full on first run, incremental afterwards) |
//! | `dsa sync --full` | Force a full sync |
//! | `dsa stats` | Print dashboard statistics |
//! | `dsa check` | Verify the GitHub token and repository |
//! | `dsa serve` | Start the HTTP server |
//!
//! Logs go to stderr and are filtered with `RUST_LOG`
//! (default `dsa_mirror=info`).

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use dsa_mirror::{config, github, migrate, server, stats, sync};

/// Mirror a GitHub folder of solved problems into SQLite.
#[derive(Parser)]
#[command(name = "dsa", version, about)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/dsa.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Idempotent: running it multiple times is safe.
    Init,

    /// Sync the mirror with the remote repository.
    ///
    /// Runs a full sync when no cursor exists yet and an incremental sync
    /// otherwise.
    Sync {
        /// Re-mirror the whole tree and replay the lookback window.
        #[arg(long)]
        full: bool,
    },

    /// Print dashboard statistics.
    Stats {
        /// Emit the dashboard payload as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Check the GitHub token and repository.
    Check,

    /// Start the HTTP server.
    Serve,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("dsa_mirror=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Sync { full } => {
            sync::run_sync(&cfg, full).await?;
        }
        Commands::Stats { json } => {
            stats::run_stats(&cfg, json).await?;
        }
        Commands::Check => {
            github::run_check(&cfg).await?;
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
    }

    Ok(())
}
