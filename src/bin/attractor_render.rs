//! attractor-render - list patterns and render them offline to WAV.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing::info;

use attractor_audio::loader::{FilePatternSource, HttpPatternSource};
use attractor_audio::{AudioEngine, EngineConfig, EngineParam, TrajectoryPoint};

#[derive(Parser)]
#[command(name = "attractor-render")]
#[command(about = "Render attractor soundtrack patterns to WAV", long_about = None)]
struct Cli {
    /// Engine config (TOML)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Pattern library JSON file
    #[arg(long, global = true)]
    patterns: Option<PathBuf>,

    /// Pattern library URL (overrides the config's patterns_url)
    #[arg(long, global = true)]
    url: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List the available patterns
    Patterns,

    /// Render a pattern offline
    Render {
        /// Output WAV file path
        output: PathBuf,

        /// Pattern name (default: the config's initial pattern)
        #[arg(short, long)]
        pattern: Option<String>,

        /// Duration in seconds
        #[arg(short, long, default_value = "30.0")]
        duration: f64,

        /// Trajectory JSON file: an array of {time, x, y, z}
        #[arg(short, long)]
        trajectory: Option<PathBuf>,

        /// Tempo override
        #[arg(short, long)]
        bpm: Option<f64>,

        /// Arpeggio seed override
        #[arg(long)]
        seed: Option<u64>,

        /// Sample rate override
        #[arg(short, long)]
        sample_rate: Option<u32>,
    },
}

async fn load_library(engine: &mut AudioEngine, cli: &Cli) {
    if let Some(path) = &cli.patterns {
        engine.load_patterns(&FilePatternSource::new(path)).await;
        return;
    }
    let url = cli
        .url
        .clone()
        .or_else(|| engine.config().patterns_url.clone());
    if let Some(url) = url {
        engine.load_patterns(&HttpPatternSource::new(url)).await;
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    let mut config = match &cli.config {
        Some(path) => EngineConfig::from_file(path)?,
        None => EngineConfig::default(),
    };

    match &cli.command {
        Commands::Patterns => {
            let mut engine = AudioEngine::new(config);
            load_library(&mut engine, &cli).await;
            for name in engine.pattern_names() {
                let bars = engine.library().get(&name).map_or(0, |p| p.len());
                println!("{name}\t{bars} bars");
            }
        }

        Commands::Render {
            output,
            pattern,
            duration,
            trajectory,
            bpm,
            seed,
            sample_rate,
        } => {
            if let Some(seed) = seed {
                config.seed = Some(*seed);
            }
            if let Some(rate) = sample_rate {
                config.sample_rate = *rate;
            }
            let mut engine = AudioEngine::new(config);
            load_library(&mut engine, &cli).await;
            if let Some(name) = pattern {
                engine.set_pattern(name);
                if engine.current_pattern_name() != name.as_str() {
                    return Err(format!("unknown pattern '{name}'").into());
                }
            }
            if let Some(bpm) = bpm {
                engine.set_param(EngineParam::Bpm, *bpm);
            }

            let points: Option<Vec<TrajectoryPoint>> = match trajectory {
                Some(path) => Some(serde_json::from_str(&std::fs::read_to_string(path)?)?),
                None => None,
            };

            info!(
                pattern = engine.current_pattern_name(),
                duration,
                "rendering"
            );
            let wav = engine.render_offline_wav(*duration, points.as_deref())?;
            std::fs::write(output, &wav)?;
            info!("wrote {} bytes to {}", wav.len(), output.display());
        }
    }

    Ok(())
}
