//! batbal - run Batch Balance adjustments from a terminal
//!
//! Usage:
//!   batbal plan --fragment '#/tab=controls&batbal_uids=15,16&batbal_amounts=100,-5'
//!   batbal run --ids 15,16 --amounts 100,-5 --rfcv <token> --cookie <cookie>
//!   batbal status
//!   batbal clear --yes

use anyhow::Result;
use batch_balance::runner::DEFAULT_STORAGE_KEY;
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::env;
use std::path::PathBuf;
use tracing::Level;
use tracing_subscriber::EnvFilter;

mod commands;
mod output;

use commands::{ClearCommand, PlanCommand, RunCommand, StateOptions, StatusCommand};

#[derive(Parser)]
#[command(name = "batbal", version)]
#[command(about = "Resumable batch balance adjustments")]
struct Cli {
    /// Directory holding the saved batch
    #[arg(long, global = true, env = "BATBAL_STATE_DIR", default_value = ".batbal")]
    state_dir: PathBuf,

    /// Name of the saved slot
    #[arg(long, global = true, env = "BATBAL_STORAGE_KEY", default_value = DEFAULT_STORAGE_KEY)]
    key: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate a batch and run it, resuming a saved one
    Run(RunCommand),
    /// Show what a batch would do without running it
    Plan(PlanCommand),
    /// Show the saved batch
    Status(StatusCommand),
    /// Delete the saved batch
    Clear(ClearCommand),
}

fn init_logging() {
    let log_level = env::var("LOG_LEVEL")
        .map(|level| match level.to_lowercase().as_str() {
            "error" => Level::ERROR,
            "warn" => Level::WARN,
            "info" => Level::INFO,
            "debug" => Level::DEBUG,
            "trace" => Level::TRACE,
            _ => Level::WARN,
        })
        .unwrap_or(Level::WARN);

    // stdout is reserved for command output
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(log_level.into()))
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();
}

#[tokio::main]
async fn main() {
    init_logging();
    let cli = Cli::parse();
    let state = StateOptions::new(cli.state_dir, cli.key);

    let result: Result<()> = match cli.command {
        Commands::Run(cmd) => cmd.execute(&state).await,
        Commands::Plan(cmd) => cmd.execute(&state).await,
        Commands::Status(cmd) => cmd.execute(&state).await,
        Commands::Clear(cmd) => cmd.execute(&state).await,
    };

    if let Err(e) = result {
        eprintln!("{} {e:#}", "Error:".red().bold());
        std::process::exit(1);
    }
}
