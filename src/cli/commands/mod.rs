//! CLI commands implementation.
//!
//! This module contains the CLI parser and dispatches to command-specific modules.

mod helpers;
mod jobs;
mod refresh;
mod run;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::config::{Config, CONFIG_ENV};

#[derive(Parser)]
#[command(name = "harvest")]
#[command(about = "Incremental API harvester with merge-on-write tables")]
#[command(version)]
pub struct Cli {
    /// Config file path (default: harvest.toml)
    #[arg(short, long, global = true, env = CONFIG_ENV)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Check if verbose mode is enabled (for early logging setup).
pub fn is_verbose() -> bool {
    std::env::args().any(|arg| arg == "-v" || arg == "--verbose")
}

#[derive(Subcommand)]
enum Commands {
    /// Harvest the named jobs into their tables
    Run {
        /// Jobs to run
        jobs: Vec<String>,

        /// Run every configured job
        #[arg(long, conflicts_with = "jobs")]
        all: bool,

        /// Fetch and merge, but keep results in memory
        #[arg(long)]
        dry_run: bool,
    },

    /// Exchange the refresh token for a new access token
    RefreshToken,

    /// List configured jobs and the cycles they expand to
    Jobs,
}

pub async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref()).await?;

    match cli.command {
        Commands::Run { jobs, all, dry_run } => run::cmd_run(&config, &jobs, all, dry_run).await,
        Commands::RefreshToken => refresh::cmd_refresh_token(&config).await,
        Commands::Jobs => jobs::cmd_jobs(&config).await,
    }
}
