//! Affinity CLI
//!
//! Runs the engine over profiles and feedback read from JSON files and
//! prints results as JSON on stdout. Logs go to stderr.

use affinity_core::storage::InMemoryProfileProvider;
use affinity_core::types::{NewFeedback, Profile};
use affinity_core::{AffinityEngine, EngineConfig, Repositories, Scene, UserId};
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, Level};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "affinity")]
#[command(about = "Scene-aware match scoring and weight optimization", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Set log level
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Configuration file (TOML); AFFINITY__* environment variables override it
    #[arg(short, long, env = "AFFINITY_CONFIG")]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Score two users in a scene
    Score {
        /// JSON array of profiles
        #[arg(long)]
        profiles: PathBuf,

        #[arg(long)]
        user_a: String,

        #[arg(long)]
        user_b: String,

        /// Scene name (考研自习室 or study_room, ...)
        #[arg(long)]
        scene: Scene,
    },

    /// Rank candidates for a user
    Matches {
        #[arg(long)]
        profiles: PathBuf,

        #[arg(long)]
        user: String,

        #[arg(long)]
        scene: Scene,

        #[arg(long, default_value = "10")]
        limit: usize,
    },

    /// List the scene catalog with current weights
    Scenes,

    /// Print the optimization report for a scene
    Report {
        #[arg(long)]
        profiles: PathBuf,

        /// JSON array of feedback submissions
        #[arg(long)]
        feedback: PathBuf,

        #[arg(long)]
        scene: Scene,
    },

    /// Run the auto-tuner for a scene and print the adjustment, if any
    AutoTune {
        #[arg(long)]
        profiles: PathBuf,

        #[arg(long)]
        feedback: PathBuf,

        #[arg(long)]
        scene: Scene,
    },
}

fn load_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("Failed to parse {}", path.display()))
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn build_engine(config: EngineConfig, profiles: Option<&Path>) -> Result<AffinityEngine> {
    let provider = match profiles {
        Some(path) => {
            let loaded: Vec<Profile> = load_json(path)?;
            debug!("Loaded {} profiles from {}", loaded.len(), path.display());
            InMemoryProfileProvider::with_profiles(loaded)
        }
        None => InMemoryProfileProvider::new(),
    };
    Ok(AffinityEngine::new(
        Repositories::in_memory(Arc::new(provider)),
        config,
    ))
}

async fn load_feedback(engine: &AffinityEngine, path: &Path) -> Result<()> {
    let submissions: Vec<NewFeedback> = load_json(path)?;
    let total = submissions.len();
    for submission in submissions {
        engine.collect_feedback(submission).await?;
    }
    info!("Loaded {} feedback records from {}", total, path.display());
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    let level = match cli.log_level.as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "affinity={level},affinity_core={level}",
            level = level.as_str().to_lowercase()
        ))
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr) // Write logs to stderr, not stdout
        .init();

    debug!("Affinity v{} starting...", env!("CARGO_PKG_VERSION"));

    let config_path = cli.config.unwrap_or_else(EngineConfig::default_path);
    let config = EngineConfig::load(Some(config_path.as_path()))
        .context("Failed to load configuration")?;

    match cli.command {
        Commands::Score {
            profiles,
            user_a,
            user_b,
            scene,
        } => {
            let engine = build_engine(config, Some(profiles.as_path()))?;
            let (a, b) = (UserId::from(user_a), UserId::from(user_b));
            let breakdown = engine.calculate_match_score(&a, &b, scene).await?;
            let reason = engine.get_match_reason(&a, &b, scene).await;
            print_json(&serde_json::json!({
                "scene": scene,
                "score": breakdown,
                "reason": reason,
            }))?;
        }
        Commands::Matches {
            profiles,
            user,
            scene,
            limit,
        } => {
            let engine = build_engine(config, Some(profiles.as_path()))?;
            let matches = engine.find_matches(&UserId::from(user), scene, limit).await?;
            print_json(&matches)?;
        }
        Commands::Scenes => {
            let engine = build_engine(config, None)?;
            print_json(&engine.list_scenes().await?)?;
        }
        Commands::Report {
            profiles,
            feedback,
            scene,
        } => {
            let engine = build_engine(config, Some(profiles.as_path()))?;
            load_feedback(&engine, &feedback).await?;
            print_json(&engine.generate_optimization_report(scene).await?)?;
        }
        Commands::AutoTune {
            profiles,
            feedback,
            scene,
        } => {
            let engine = build_engine(config, Some(profiles.as_path()))?;
            load_feedback(&engine, &feedback).await?;
            match engine.auto_adjust_weights(scene).await? {
                Some(adjustment) => print_json(&adjustment)?,
                None => {
                    info!("No adjustment needed for scene {}", scene);
                    print_json(&serde_json::Value::Null)?;
                }
            }
        }
    }

    Ok(())
}
