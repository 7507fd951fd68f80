//! Verify command - decode a whole demo and check its tick accounting

use anyhow::{Context, Result, bail};
use clap::Args;
use std::collections::BTreeMap;
use std::path::PathBuf;

use tickreel_core::{Command, DemoFile};

/// Arguments for the verify command
#[derive(Args)]
pub struct VerifyArgs {
    /// Demo file (.dmo)
    pub file: PathBuf,

    /// Also require the demo to come from this product version
    #[arg(long)]
    pub product: Option<String>,
}

/// What a full decode found
#[derive(Debug, Default)]
struct Report {
    commands: usize,
    inputs: usize,
    last_tick: u32,
    by_opcode: BTreeMap<String, usize>,
    problems: Vec<String>,
}

fn check(demo: &DemoFile) -> Result<Report> {
    let commands = demo.commands().context("Command stream does not decode")?;
    let mut report = Report {
        commands: commands.len(),
        ..Report::default()
    };

    let mut loading_points = 0;
    for (tick, command) in &commands {
        report.last_tick = *tick;
        if command.is_input() {
            report.inputs += 1;
        }
        if *command == Command::LoadingComplete {
            loading_points += 1;
        }
        *report
            .by_opcode
            .entry(command.opcode().to_string())
            .or_default() += 1;
    }

    if report.last_tick > demo.total_ticks {
        report.problems.push(format!(
            "last command at tick {} is past the recorded length {}",
            report.last_tick, demo.total_ticks
        ));
    }
    if loading_points > 1 {
        report
            .problems
            .push(format!("{} loading-complete points", loading_points));
    }
    for marker in &demo.markers {
        if marker.tick > demo.total_ticks {
            report.problems.push(format!(
                "marker '{}' at tick {} is past the recorded length",
                marker.label, marker.tick
            ));
        }
    }
    if demo.markers.windows(2).any(|w| w[0].tick > w[1].tick) {
        report.problems.push("markers are out of order".to_string());
    }
    Ok(report)
}

/// Execute the verify command
pub fn execute(args: VerifyArgs) -> Result<()> {
    println!("Verifying: {}", args.file.display());

    let demo = DemoFile::load(&args.file)
        .with_context(|| format!("Failed to load demo: {}", args.file.display()))?;
    if let Some(product) = &args.product {
        demo.check_product(product)?;
    }
    let report = check(&demo)?;

    println!();
    println!("Commands: {} ({} input)", report.commands, report.inputs);
    println!("Last command tick: {}", report.last_tick);
    println!("Recorded ticks: {}", demo.total_ticks);
    println!();
    for (opcode, count) in &report.by_opcode {
        println!("  {:<18} {}", opcode, count);
    }

    if !report.problems.is_empty() {
        println!();
        println!("=== Problems ===");
        for problem in &report.problems {
            println!("  {}", problem);
        }
        bail!("{} problem(s) found", report.problems.len());
    }

    println!();
    println!("Demo is consistent.");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tickreel_core::{DemoChannel, InputEvent, Marker};

    fn recorded() -> DemoFile {
        let mut rec = DemoChannel::recording(3, "t");
        rec.record(&Command::LoadingComplete);
        rec.record_input(&InputEvent::KeyDown(b'K'));
        rec.record_input(&InputEvent::MouseMove { x: 2, y: 2 });
        rec.add_marker("start");
        rec.to_demo_file()
    }

    #[test]
    fn test_consistent_demo() {
        let report = check(&recorded()).unwrap();
        assert_eq!(report.commands, 3);
        assert_eq!(report.inputs, 2);
        assert!(report.problems.is_empty());
    }

    #[test]
    fn test_marker_past_end_is_reported() {
        let mut demo = recorded();
        demo.markers.push(Marker {
            label: "late".into(),
            tick: 99,
        });
        let report = check(&demo).unwrap();
        assert_eq!(report.problems.len(), 1);
        assert!(report.problems[0].contains("late"));
    }

    #[test]
    fn test_truncated_stream_fails() {
        let mut demo = recorded();
        demo.stream.truncate(1);
        demo.stream.push(0xFF);
        assert!(check(&demo).is_err());
    }
}
