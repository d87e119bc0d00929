//! Launch Detection and Decision Pipeline
//!
//! Watches launchpad log streams and emits unitary buy decisions. Does not
//! place orders, manage positions, or hold keys; see spec.md Non-goals.

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::error;

use launch_pipeline::cli::commands;
use launch_pipeline::config::Config;

#[derive(Parser)]
#[command(name = "launchd")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "config.toml")]
    config: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the log watcher and decision pipeline
    Start {
        /// Force dry-run: decisions are computed and alerted but never marked live
        #[arg(long)]
        dry_run: bool,
    },

    /// Show a point-in-time status readout from the persistent store
    Status,

    /// Show current configuration (secrets masked)
    Config,

    /// Check RPC and feed websocket reachability
    Health,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("launch_pipeline=info".parse().unwrap()),
        )
        .with_target(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .init();

    let cli = Cli::parse();

    let config = match Config::load(&cli.config) {
        Ok(cfg) => cfg,
        Err(e) => {
            error!("failed to load configuration: {}", e);
            std::process::exit(2);
        }
    };

    let result = match cli.command {
        Commands::Start { dry_run } => commands::start(&config, dry_run).await,
        Commands::Status => commands::status(&config).await,
        Commands::Config => commands::show_config(&config),
        Commands::Health => commands::health(&config).await,
    };

    if let Err(e) = result {
        error!("command failed: {}", e);
        std::process::exit(1);
    }

    Ok(())
}
