//! Cadence CLI
//!
//! Play, inspect and check action scenarios described in TOML.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod config;
mod player;

use cadence_seq::Easing;
use config::Scenario;
use player::Player;

#[derive(Parser)]
#[command(name = "cadence")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Cadence action scenario runner", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Play a scenario to completion and print the final state
    Run {
        /// Scenario file
        scenario: PathBuf,

        /// Override the frame step in milliseconds
        #[arg(short, long)]
        tick_ms: Option<f64>,

        /// Override the global speed multiplier
        #[arg(short, long)]
        speed: Option<f32>,

        /// Override the playback limit in milliseconds
        #[arg(long)]
        max_ms: Option<f64>,

        /// Print every frame
        #[arg(short, long)]
        frames: bool,

        /// Emit the report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Play a scenario up to a point and dump the action tree as JSON
    Inspect {
        /// Scenario file
        scenario: PathBuf,

        /// Playback time to stop at
        #[arg(short, long, default_value = "0")]
        at_ms: f64,

        /// Override the frame step in milliseconds
        #[arg(short, long)]
        tick_ms: Option<f64>,
    },

    /// Validate a scenario file
    Check {
        /// Scenario file
        scenario: PathBuf,

        /// Print the scenario back in normalized form
        #[arg(short, long)]
        print: bool,
    },

    /// Write a starter scenario
    New {
        /// Output path
        #[arg(default_value = "scenario.toml")]
        path: PathBuf,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Tabulate the built-in easing curves
    Easings {
        /// Samples per curve
        #[arg(short, long, default_value = "5")]
        samples: usize,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    match cli.command {
        Commands::Run {
            scenario,
            tick_ms,
            speed,
            max_ms,
            frames,
            json,
        } => cmd_run(&scenario, tick_ms, speed, max_ms, frames, json),

        Commands::Inspect {
            scenario,
            at_ms,
            tick_ms,
        } => cmd_inspect(&scenario, at_ms, tick_ms),

        Commands::Check { scenario, print } => cmd_check(&scenario, print),

        Commands::New { path, force } => cmd_new(&path, force),

        Commands::Easings { samples } => cmd_easings(samples),
    }
}

fn load(path: &Path, tick_ms: Option<f64>) -> Result<Scenario> {
    let mut scenario = Scenario::load(path)?;
    if let Some(tick_ms) = tick_ms {
        scenario.settings.tick_ms = tick_ms;
    }
    scenario.validate()?;
    Ok(scenario)
}

fn cmd_run(
    path: &Path,
    tick_ms: Option<f64>,
    speed: Option<f32>,
    max_ms: Option<f64>,
    frames: bool,
    json: bool,
) -> Result<()> {
    let mut scenario = Scenario::load(path)?;
    if let Some(tick_ms) = tick_ms {
        scenario.settings.tick_ms = tick_ms;
    }
    if let Some(speed) = speed {
        scenario.settings.speed = speed;
    }
    if let Some(max_ms) = max_ms {
        scenario.settings.max_ms = max_ms;
    }
    scenario.validate()?;

    info!(
        "Playing {} ({} actions, {}ms ticks)",
        path.display(),
        scenario.actions.len(),
        scenario.settings.tick_ms
    );

    let report = Player::new(scenario).with_frames(frames).run()?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print!("{}", report.render());
    }
    Ok(())
}

fn cmd_inspect(path: &Path, at_ms: f64, tick_ms: Option<f64>) -> Result<()> {
    let scenario = load(path, tick_ms)?;
    let snapshots = Player::new(scenario).inspect_at(at_ms)?;

    if snapshots.is_empty() {
        info!("No actions alive at {}ms", at_ms);
    }
    println!("{}", serde_json::to_string_pretty(&snapshots)?);
    Ok(())
}

fn cmd_check(path: &Path, print: bool) -> Result<()> {
    let scenario = Scenario::load(path)?;

    for (index, action) in scenario.actions.iter().enumerate() {
        if !action.node.is_finite() {
            tracing::warn!(
                "{} repeats forever and needs a stop control",
                scenario.action_name(index)
            );
        }
    }

    println!(
        "✓ {}: {} channels, {} actions, {} controls",
        path.display(),
        scenario.channels.len(),
        scenario.actions.len(),
        scenario.controls.len()
    );
    if print {
        print!("{}", scenario.to_toml()?);
    }
    Ok(())
}

const STARTER: &str = r#"[settings]
tick_ms = 16.0
max_ms = 5000.0

[channels]
x = 0.0
alpha = 0.0

[[actions]]
name = "intro"
scope = "ui"
node = { kind = "sequence", precise = true, children = [
    { kind = "from_to", channel = "alpha", from = 0.0, to = 1.0, ms = 300, ease = "quad_out" },
    { kind = "delay", ms = 200 },
    { kind = "to", channel = "x", to = 100.0, ms = 500, ease = "cubic_in_out" },
] }
"#;

fn cmd_new(path: &Path, force: bool) -> Result<()> {
    if path.exists() && !force {
        anyhow::bail!("{} already exists. Use --force to overwrite.", path.display());
    }
    fs::write(path, STARTER).with_context(|| format!("Failed to write {}", path.display()))?;
    info!("Created {}", path.display());
    Ok(())
}

fn cmd_easings(samples: usize) -> Result<()> {
    if samples < 2 {
        anyhow::bail!("At least 2 samples are needed, got {}", samples);
    }

    let steps: Vec<f32> = (0..samples)
        .map(|i| i as f32 / (samples - 1) as f32)
        .collect();

    print!("{:<16}", "t");
    for t in &steps {
        print!(" {:>8.3}", t);
    }
    println!();

    for easing in Easing::ALL {
        print!("{:<16}", easing.name());
        for t in &steps {
            print!(" {:>8.3}", easing.apply(*t));
        }
        println!();
    }
    Ok(())
}
