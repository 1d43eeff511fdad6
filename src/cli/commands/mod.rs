//! CLI commands implementation.
//!
//! This module contains the CLI parser and dispatches to command-specific modules.

mod config_cmd;
mod pending;
mod run;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use console::style;

use crate::cli::icons::error;
use crate::config::{load_config, LoadOptions};
use crate::utils::RunLog;

#[derive(Parser)]
#[command(name = "asbuilt")]
#[command(about = "Fulfil as-built and GIS file download requests from a survey layer")]
#[command(version)]
pub struct Cli {
    /// Config file path (overrides auto-discovery)
    #[arg(short, long, global = true, env = "ASBUILT_CONFIG")]
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
    /// Process every unfulfilled request on the survey layer
    Run {
        /// Log emails instead of sending them and leave the survey layer unchanged
        #[arg(long)]
        dry_run: bool,
    },

    /// List unfulfilled requests without processing them
    Pending,

    /// Inspect the configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Print the loaded configuration with secrets masked
    Show,
    /// Validate the configuration and report what is set up
    Check,
}

/// Run the CLI. `run_log` receives the per-run log file once the config is known.
pub async fn run(run_log: RunLog) -> anyhow::Result<()> {
    let cli = Cli::parse();

    let options = LoadOptions {
        config_path: cli.config,
    };
    let config = match load_config(&options).await {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("{}", e);
            eprintln!("{} {}", error(), style(&e).red());
            std::process::exit(1);
        }
    };

    match cli.command {
        Commands::Run { dry_run } => run::cmd_run(config, &run_log, dry_run).await,
        Commands::Pending => pending::cmd_pending(&config).await,
        Commands::Config { command } => match command {
            ConfigCommands::Show => config_cmd::cmd_config_show(&config),
            ConfigCommands::Check => config_cmd::cmd_config_check(&config),
        },
    }
}
