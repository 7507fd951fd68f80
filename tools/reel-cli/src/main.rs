//! Reel CLI - record, replay and inspect tickreel demos
//!
//! # Commands
//!
//! - `reel record` - Record a soak session driven by generated input
//! - `reel replay` - Replay a demo headlessly through the real scheduler
//! - `reel inspect` - Show a demo's header, markers and commands
//! - `reel verify` - Decode a whole demo and check its tick accounting
//! - `reel list` - List numbered recordings
//!
//! # Usage
//!
//! ```bash
//! # Record 2000 ticks into the next numbered recording
//! reel record --params "-recnum=5" --ticks 2000
//!
//! # Replay the most recent recording, skipping to tick 1500
//! reel replay --params "-playnum=1" --to-tick 1500
//!
//! # Show every command in a demo
//! reel inspect demo3.dmo --commands
//! ```
//!
//! Launch parameters use the same `-name=value` syntax an application
//! receives on its command line.

mod inspect;
mod list;
mod record;
mod replay;
mod soak;
mod verify;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tickreel_core::Config;

/// Reel CLI - record, replay and inspect tickreel demos
#[derive(Parser)]
#[command(name = "reel")]
#[command(about = "Record, replay and inspect deterministic demo files")]
#[command(version)]
struct Cli {
    /// Config file (defaults to the platform config directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Record a soak session driven by generated input
    Record(record::RecordArgs),

    /// Replay a demo headlessly through the real scheduler
    Replay(replay::ReplayArgs),

    /// Show a demo's header, markers and commands
    Inspect(inspect::InspectArgs),

    /// Decode a whole demo and check its tick accounting
    Verify(verify::VerifyArgs),

    /// List numbered recordings
    List(list::ListArgs),
}

fn load_config(path: Option<&PathBuf>) -> Result<Config> {
    match path {
        Some(path) => tickreel_core::config::load_from(path)
            .with_context(|| format!("Failed to load config: {}", path.display())),
        None => Ok(tickreel_core::config::load()),
    }
}

fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = load_config(cli.config.as_ref())?;

    match cli.command {
        Commands::Record(args) => record::execute(args, &config),
        Commands::Replay(args) => replay::execute(args, &config),
        Commands::Inspect(args) => inspect::execute(args, &config),
        Commands::Verify(args) => verify::execute(args),
        Commands::List(args) => list::execute(args, &config),
    }
}
