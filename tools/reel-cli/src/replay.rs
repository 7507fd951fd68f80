//! Replay command - headless replay through the real scheduler
//!
//! Demos recorded by `reel record` replay exactly and end with the same
//! checksum. Demos from other applications can be replayed with `--tolerate`
//! to see how far the stream decodes, though their side effects will go
//! unconsumed.

use anyhow::{Context, Result, bail};
use clap::Args;
use std::path::PathBuf;

use tickreel_core::{
    AppContext, Config, DemoTarget, DesyncPolicy, FastForward, LaunchMode, LaunchOptions,
    side_effects_from_config,
};

use crate::soak::{self, SoakHost};

/// Arguments for the replay command
#[derive(Args)]
pub struct ReplayArgs {
    /// Demo file to replay (overrides the target in --params)
    pub file: Option<PathBuf>,

    /// Launch parameters choosing the demo ("-play", "-playnum=2", "-demofile=run.dmo")
    #[arg(long, default_value = "-play", allow_hyphen_values = true)]
    pub params: String,

    /// Fast-forward to this tick before pacing normally
    #[arg(long)]
    pub to_tick: Option<u32>,

    /// Fast-forward to the first marker with this label
    #[arg(long, conflicts_with = "to_tick")]
    pub to_marker: Option<String>,

    /// Log divergences and keep going instead of stopping
    #[arg(long)]
    pub tolerate: bool,

    /// Units of background loading work, as in the recording run
    #[arg(long, default_value = "4")]
    pub load_tasks: u32,

    /// Pace ticks against the wall clock instead of running flat out
    #[arg(long)]
    pub realtime: bool,
}

/// Execute the replay command
pub fn execute(args: ReplayArgs, config: &Config) -> Result<()> {
    let mut options = LaunchOptions::parse(&args.params).context("Invalid launch parameters")?;
    if let Some(file) = &args.file {
        options.mode = LaunchMode::Play;
        options.target = DemoTarget::Path(std::path::absolute(file)?);
    }
    if options.mode != LaunchMode::Play {
        bail!("Launch parameters must select playback (-play or -playnum=N)");
    }

    // A replay never reaches the backends; these only satisfy the proxy
    let io = side_effects_from_config(config, None);
    let mut ctx = AppContext::from_launch(&options, config, io)?;
    let path = ctx
        .demo_path()
        .map(|p| p.display().to_string())
        .unwrap_or_default();
    println!("Replaying: {}", path);

    if args.tolerate {
        ctx.demo.set_policy(DesyncPolicy::Tolerate);
    }
    if let Some(tick) = args.to_tick {
        ctx.demo.fast_forward(FastForward::ToTick(tick));
    }
    if let Some(label) = &args.to_marker
        && !ctx.demo.fast_forward_to_marker(label)
    {
        bail!("No marker '{}' in {}", label, path);
    }

    soak::spawn_loader(&ctx.loading, args.load_tasks)?;
    let mut host = SoakHost::replaying();
    let stats = soak::drive(args.realtime, &config.timing, &mut ctx, &mut host)
        .with_context(|| format!("Replay of {} failed", path))?;
    ctx.finish()?;

    println!();
    println!("=== Replay Complete ===");
    println!(
        "Ticks: {} of {}",
        ctx.demo.update_count(),
        ctx.demo.total_ticks()
    );
    println!("Draws: {}", stats.draws);
    println!("Events: {}", host.events);
    println!("Side effects: {}", host.side_effects);
    println!("Checksum: {:#010x}", host.checksum());

    if !ctx.demo.replay_finished() {
        bail!("Replay stopped before the end of the recording");
    }
    Ok(())
}
