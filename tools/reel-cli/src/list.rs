//! List command - numbered recordings in the demo directory

use anyhow::{Context, Result};
use clap::Args;
use std::path::PathBuf;

use tickreel_core::{Config, DemoFile, DemoRotation};

/// Arguments for the list command
#[derive(Args)]
pub struct ListArgs {
    /// Demo directory (defaults to the configured one)
    #[arg(long)]
    pub dir: Option<PathBuf>,

    /// File name prefix (defaults to the configured one)
    #[arg(long)]
    pub prefix: Option<String>,
}

/// Execute the list command
pub fn execute(args: ListArgs, config: &Config) -> Result<()> {
    let dir = args
        .dir
        .unwrap_or_else(|| config.demo.resolved_directory());
    let prefix = args.prefix.unwrap_or_else(|| config.demo.prefix.clone());
    let rotation = DemoRotation::new(&dir, &prefix);

    let numbers = rotation
        .numbers()
        .with_context(|| format!("Failed to read {}", dir.display()))?;
    if numbers.is_empty() {
        println!("No recordings in {}", dir.display());
        return Ok(());
    }

    println!("Recordings in {}:", dir.display());
    // Newest first; -playnum counts back from the highest number
    let newest = numbers.last().copied().unwrap_or_default();
    for &n in numbers.iter().rev() {
        let path = rotation.path_for(n);
        let summary = match DemoFile::load(&path) {
            Ok(demo) => format!(
                "{} ticks, {} markers, {}",
                demo.total_ticks,
                demo.markers.len(),
                demo.product_version
            ),
            Err(e) => format!("unreadable: {e}"),
        };
        let name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        println!("  -playnum={:<3} {:<16} {}", newest - n + 1, name, summary);
    }

    Ok(())
}
