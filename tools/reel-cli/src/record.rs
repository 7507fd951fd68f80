//! Record command - capture a soak session
//!
//! The soak host generates its own input and performs file and registry
//! side effects, so the resulting demo exercises the whole command set.

use anyhow::{Context, Result, bail};
use clap::Args;
use std::path::PathBuf;

use tickreel_core::{AppContext, Config, LaunchMode, LaunchOptions, side_effects_from_config};

use crate::soak::{self, SoakHost};

/// Arguments for the record command
#[derive(Args)]
pub struct RecordArgs {
    /// Launch parameters choosing the output ("-record", "-recnum=5", "-demofile=run.dmo")
    #[arg(long, default_value = "-record", allow_hyphen_values = true)]
    pub params: String,

    /// Ticks to record before the session closes itself
    #[arg(long, default_value = "1000")]
    pub ticks: u32,

    /// Seed for the generated input (the simulation seed is always fresh)
    #[arg(long, default_value = "1")]
    pub input_seed: u32,

    /// Units of background loading work before the session is loaded
    #[arg(long, default_value = "4")]
    pub load_tasks: u32,

    /// Pace ticks against the wall clock instead of running flat out
    #[arg(long)]
    pub realtime: bool,

    /// Directory for the session's file side effects (defaults to <demo dir>/scratch)
    #[arg(long)]
    pub scratch: Option<PathBuf>,
}

/// Execute the record command
pub fn execute(args: RecordArgs, config: &Config) -> Result<()> {
    let options = LaunchOptions::parse(&args.params).context("Invalid launch parameters")?;
    if options.mode != LaunchMode::Record {
        bail!("Launch parameters must select recording (-record or -recnum=N)");
    }

    let scratch = args
        .scratch
        .unwrap_or_else(|| config.demo.resolved_directory().join("scratch"));
    let io = side_effects_from_config(config, Some(&scratch));
    let mut ctx = AppContext::from_launch(&options, config, io)?;

    soak::spawn_loader(&ctx.loading, args.load_tasks)?;
    let mut host = SoakHost::recording(args.ticks, args.input_seed);
    let stats = soak::drive(args.realtime, &config.timing, &mut ctx, &mut host)?;

    let saved = ctx.finish().context("Failed to save recording")?;

    println!();
    println!("=== Recording Complete ===");
    println!("Ticks: {}", stats.ticks);
    println!("Draws: {}", stats.draws);
    println!("Events: {}", host.events);
    println!("Side effects: {}", host.side_effects);
    println!("Seed: {:#010x}", ctx.rng.seed());
    println!("Checksum: {:#010x}", host.checksum());
    match saved {
        Some(path) => println!("Saved: {}", path.display()),
        None => println!("Nothing saved"),
    }

    Ok(())
}
