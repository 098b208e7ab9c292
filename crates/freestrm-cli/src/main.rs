//! FreeStrm CLI - Command-line interface for FreeStrm
//!
//! Provides commands for:
//! - Running sync tasks with live progress
//! - Listing tasks and browsing remote folders
//! - Resolving download URLs
//! - Inspecting and pruning task history
//! - Clearing task target folders
//! - Viewing and validating configuration

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use freestrm_core::config::Config;
use tracing_subscriber::EnvFilter;

mod commands;
mod output;

use commands::{
    clear::ClearCommand, config::ConfigCommand, history::HistoryCommand, ls::LsCommand,
    run::RunCommand, tasks::TasksCommand, url::UrlCommand, CliContext,
};
use output::OutputFormat;

#[derive(Debug, Parser)]
#[command(name = "freestrm", version, about = "Mirror cloud drive folders as .strm libraries")]
pub struct Cli {
    /// Output in JSON format
    #[arg(long, global = true)]
    json: bool,

    /// Verbose output (can be repeated: -v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Use alternate config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Run a sync task
    Run(RunCommand),
    /// List configured tasks
    Tasks(TasksCommand),
    /// List remote sub-directories
    Ls(LsCommand),
    /// Resolve a temporary download URL
    Url(UrlCommand),
    /// View and manage task history
    #[command(subcommand)]
    History(HistoryCommand),
    /// Remove everything under a task's target folder
    Clear(ClearCommand),
    /// View and validate configuration
    #[command(subcommand)]
    Config(ConfigCommand),
}

/// Level used when neither `RUST_LOG` nor `-v` is given.
fn default_level(verbose: u8, configured: &str) -> String {
    match verbose {
        0 => configured.to_string(),
        1 => "debug".to_string(),
        _ => "trace".to_string(),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config_path = cli.config.clone().unwrap_or_else(Config::default_path);

    // Logging settings come from the config file when it parses.
    let logging = Config::load(&config_path)
        .map(|c| c.logging)
        .unwrap_or_default();
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_level(cli.verbose, &logging.level)));

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr);
    if logging.json {
        subscriber.json().init();
    } else {
        subscriber.init();
    }

    let format = if cli.json {
        OutputFormat::Json
    } else {
        OutputFormat::Human
    };
    let ctx = CliContext {
        config_path,
        format,
    };

    match cli.command {
        Commands::Run(cmd) => cmd.execute(&ctx).await,
        Commands::Tasks(cmd) => cmd.execute(&ctx).await,
        Commands::Ls(cmd) => cmd.execute(&ctx).await,
        Commands::Url(cmd) => cmd.execute(&ctx).await,
        Commands::History(cmd) => cmd.execute(&ctx).await,
        Commands::Clear(cmd) => cmd.execute(&ctx).await,
        Commands::Config(cmd) => cmd.execute(&ctx).await,
    }
}
