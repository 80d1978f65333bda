//! Command-line harness around the autopilot engine.
//!
//! Usage:
//!   cargo run --release -- run --episodes 8 --difficulty 0.5
//!   cargo run --release -- train --episodes 200 --data-dir ./autopilot-data

use std::fs;
use std::path::PathBuf;

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use rayon::prelude::*;
use serde::Serialize;

use arena_autopilot::agent::AutopilotAgent;
use arena_autopilot::harness::{run_episode, EpisodeMetrics, HarnessConfig};
use arena_autopilot::persist::{self, ImportOutcome, WeightSource};
use arena_autopilot::snapshots::FileStorage;

#[derive(Parser)]
#[command(name = "arena-autopilot")]
#[command(about = "Headless autopilot for the hazard-dodging arena")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run evaluation episodes and report metrics as JSON
    Run {
        #[arg(long, default_value_t = 4)]
        episodes: u32,
        #[arg(long, default_value_t = 1)]
        seed: u64,
        #[arg(long, default_value_t = 3600)]
        max_ticks: u32,
        #[arg(long, default_value_t = 0.5)]
        difficulty: f64,
        /// Preset weight document to load before running
        #[arg(long)]
        weights: Option<PathBuf>,
    },
    /// Train across episodes, snapshotting into a data directory
    Train {
        #[arg(long, default_value_t = 100)]
        episodes: u32,
        #[arg(long, default_value_t = 1)]
        seed: u64,
        #[arg(long, default_value_t = 1800)]
        max_ticks: u32,
        #[arg(long, default_value_t = 0.5)]
        difficulty: f64,
        /// Snapshot persistence directory
        #[arg(long, default_value = "autopilot-data")]
        data_dir: PathBuf,
        /// Write the final weight document here
        #[arg(long)]
        export: Option<PathBuf>,
    },
    /// Export the best persisted weights as a weight document
    Export {
        #[arg(long, default_value = "autopilot-data")]
        data_dir: PathBuf,
        #[arg(long)]
        output: PathBuf,
    },
    /// Validate a weight document by importing it into a fresh network
    Import {
        input: PathBuf,
    },
    /// List persisted weight snapshots
    Snapshots {
        #[arg(long, default_value = "autopilot-data")]
        data_dir: PathBuf,
    },
}

#[derive(Serialize)]
struct RunReport {
    episodes: Vec<EpisodeMetrics>,
    average_score: f64,
    average_survival_seconds: f64,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::filter::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Run {
            episodes,
            seed,
            max_ticks,
            difficulty,
            weights,
        } => run_command(episodes, seed, max_ticks, difficulty, weights),
        Command::Train {
            episodes,
            seed,
            max_ticks,
            difficulty,
            data_dir,
            export,
        } => train_command(episodes, seed, max_ticks, difficulty, data_dir, export),
        Command::Export { data_dir, output } => export_command(data_dir, output),
        Command::Import { input } => import_command(input),
        Command::Snapshots { data_dir } => snapshots_command(data_dir),
    }
}

fn run_command(
    episodes: u32,
    seed: u64,
    max_ticks: u32,
    difficulty: f64,
    weights: Option<PathBuf>,
) -> Result<()> {
    let cfg = HarnessConfig {
        max_ticks,
        difficulty,
        ..HarnessConfig::default()
    };

    let metrics: Vec<EpisodeMetrics> = (0..episodes)
        .into_par_iter()
        .map(|i| {
            let episode_seed = seed.wrapping_add(i as u64);
            let mut agent = AutopilotAgent::new(episode_seed);
            if let Some(path) = &weights {
                agent.load_startup_weights(Some(path), None);
            }
            run_episode(&mut agent, &cfg, episode_seed)
        })
        .collect();

    let count = metrics.len().max(1) as f64;
    let report = RunReport {
        average_score: metrics.iter().map(|m| m.score).sum::<f64>() / count,
        average_survival_seconds: metrics.iter().map(|m| m.survival_seconds).sum::<f64>() / count,
        episodes: metrics,
    };
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

fn train_command(
    episodes: u32,
    seed: u64,
    max_ticks: u32,
    difficulty: f64,
    data_dir: PathBuf,
    export: Option<PathBuf>,
) -> Result<()> {
    let storage = FileStorage::new(&data_dir);
    let mut agent = AutopilotAgent::new(seed);
    let source = agent.load_startup_weights(None, Some(&storage));
    println!("Starting weights: {source:?}");

    let cfg = HarnessConfig {
        max_ticks,
        difficulty,
        training: true,
        ..HarnessConfig::default()
    };

    for i in 0..episodes {
        let episode_seed = seed.wrapping_add(i as u64);
        let metrics = run_episode(&mut agent, &cfg, episode_seed);
        let outcome = agent.end_episode(metrics.score, Some(&storage));
        if outcome.new_best {
            println!(
                "Episode {}: score {:.1} (new best), survived {:.1}s",
                i + 1,
                metrics.score,
                metrics.survival_seconds
            );
        }
    }

    let state = &agent.trainer().state;
    println!(
        "Trained {} episodes, best {:.1}, average {:.1}, exploration {:.3}",
        state.episodes, state.best_performance, state.average_performance, state.exploration_rate
    );

    if let Some(path) = export {
        let json = persist::export_json(agent.network().params(), state)?;
        fs::write(&path, json)
            .with_context(|| format!("failed to write weights: {}", path.display()))?;
        println!("Exported weights to {}", path.display());
    }
    Ok(())
}

fn export_command(data_dir: PathBuf, output: PathBuf) -> Result<()> {
    let storage = FileStorage::new(&data_dir);
    let mut agent = AutopilotAgent::new(0);
    let source = agent.load_startup_weights(None, Some(&storage));
    if source != WeightSource::Persisted {
        return Err(anyhow!(
            "no snapshots under {}, train first",
            data_dir.display()
        ));
    }

    let json = persist::export_json(agent.network().params(), &agent.trainer().state)?;
    fs::write(&output, json)
        .with_context(|| format!("failed to write weights: {}", output.display()))?;
    println!("Exported best snapshot to {}", output.display());
    Ok(())
}

fn import_command(input: PathBuf) -> Result<()> {
    let raw = fs::read_to_string(&input)
        .with_context(|| format!("failed to read weights: {}", input.display()))?;
    let mut agent = AutopilotAgent::new(0);
    let mut training = agent.trainer().state.clone();
    let outcome = persist::import_json(&raw, agent.network_mut(), &mut training);
    match outcome {
        ImportOutcome::Applied => {
            println!(
                "Valid document: {} episodes recorded, best {:.1}",
                training.episodes, training.best_performance
            );
            Ok(())
        }
        ImportOutcome::Reinitialized => Err(anyhow!(
            "document failed integrity validation (layer shapes inconsistent)"
        )),
        ImportOutcome::Rejected => Err(anyhow!("document is not valid JSON")),
    }
}

fn snapshots_command(data_dir: PathBuf) -> Result<()> {
    let storage = FileStorage::new(&data_dir);
    let mut agent = AutopilotAgent::new(0);
    agent.store_mut().load_from_storage(&storage);
    println!("{}", serde_json::to_string_pretty(&agent.store().list())?);
    Ok(())
}
