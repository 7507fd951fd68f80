//! Inspect command - show a demo's header, markers and commands

use anyhow::{Context, Result};
use clap::Args;
use std::path::PathBuf;

use tickreel_core::{Config, DemoFile};

/// Arguments for the inspect command
#[derive(Args)]
pub struct InspectArgs {
    /// Demo file (.dmo)
    pub file: PathBuf,

    /// List every decoded command with its tick
    #[arg(short, long)]
    pub commands: bool,

    /// Stop the command listing after this many entries
    #[arg(long)]
    pub limit: Option<usize>,
}

/// Format a tick count as wall time at the configured tick length
fn format_ticks(ticks: u32, frame_time_ms: u32) -> String {
    let total_ms = u64::from(ticks) * u64::from(frame_time_ms);
    let secs = total_ms / 1000;
    format!("{}:{:02}.{:03}", secs / 60, secs % 60, total_ms % 1000)
}

/// Execute the inspect command
pub fn execute(args: InspectArgs, config: &Config) -> Result<()> {
    let demo = DemoFile::load(&args.file)
        .with_context(|| format!("Failed to load demo: {}", args.file.display()))?;
    let frame_time = config.timing.frame_time_ms;

    println!("=== {} ===", args.file.display());
    println!("Version: {}", demo.version);
    println!("Product: {}", demo.product_version);
    println!("Seed: {:#010x}", demo.rng_seed);
    println!(
        "Ticks: {} ({})",
        demo.total_ticks,
        format_ticks(demo.total_ticks, frame_time)
    );
    println!("Stream: {} bytes", demo.stream.len());

    println!();
    if demo.markers.is_empty() {
        println!("No markers");
    } else {
        println!("Markers:");
        for marker in &demo.markers {
            println!(
                "  {:>8}  {}  {}",
                marker.tick,
                format_ticks(marker.tick, frame_time),
                marker.label
            );
        }
    }

    if args.commands {
        let commands = demo.commands()?;
        let shown = args.limit.unwrap_or(commands.len()).min(commands.len());

        println!();
        println!("Commands ({}):", commands.len());
        for (tick, command) in &commands[..shown] {
            println!("  {:>8}  {}", tick, command);
        }
        if shown < commands.len() {
            println!("  ... {} more", commands.len() - shown);
        }
    }

    Ok(())
}
