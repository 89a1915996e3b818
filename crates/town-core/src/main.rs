//! Agent Town
//!
//! Runs a generative-agent town from a world definition and agent bootstraps,
//! writing one frame per step to a JSONL log.

use clap::Parser;
use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use town_core::config::SimConfig;
use town_core::error::{ConfigurationError, SimError};
use town_core::events::FrameLogger;
use town_core::generation::{
    Capabilities, Generator, HashingEmbedder, OfflineGenerator, TimeoutGenerator,
};
use town_core::interventions::load_commands;
use town_core::output::SessionSnapshot;
use town_core::setup::{load_agents, load_world};
use town_core::Simulation;

/// Command line arguments for the simulation
#[derive(Parser, Debug)]
#[command(name = "agent_town")]
#[command(about = "A generative agent town simulation")]
struct Args {
    /// World definition (JSON)
    #[arg(long)]
    world: Option<PathBuf>,

    /// Agent bootstraps (JSON list)
    #[arg(long)]
    agents: Option<PathBuf>,

    /// Configuration file (TOML)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Number of steps to simulate
    #[arg(long, default_value_t = 360)]
    steps: u64,

    /// Random seed, overriding the configuration
    #[arg(long)]
    seed: Option<u64>,

    /// Directory for frames and saved sessions
    #[arg(long, default_value = "output")]
    output_dir: PathBuf,

    /// Resume the named saved session instead of starting fresh
    #[arg(long)]
    resume: Option<String>,

    /// Save the session under this name when the run ends
    #[arg(long)]
    save: Option<String>,

    /// Apply commands from a JSONL file instead of running --steps
    #[arg(long)]
    commands: Option<PathBuf>,

    /// Print the default configuration and exit
    #[arg(long)]
    print_config: bool,
}

fn capabilities(config: &SimConfig) -> Capabilities {
    let offline: Arc<dyn Generator> = Arc::new(OfflineGenerator::new());
    let limit = Duration::from_millis(config.generation.timeout_ms);
    let generator: Arc<dyn Generator> = match TimeoutGenerator::new(offline.clone(), limit) {
        Ok(bounded) => Arc::new(bounded),
        Err(e) => {
            warn!("Generation calls will not be time-bounded: {}", e);
            offline
        }
    };
    Capabilities::new(generator)
        .with_embedder(Arc::new(HashingEmbedder::default()))
        .with_max_attempts(config.generation.max_attempts)
}

fn missing(flag: &'static str) -> SimError {
    ConfigurationError::InvalidSetting {
        field: flag,
        reason: "required unless --resume is given".to_string(),
    }
    .into()
}

fn run(args: Args) -> Result<(), SimError> {
    let mut config = match &args.config {
        Some(path) => SimConfig::from_file(path)?,
        None => SimConfig::default(),
    };
    if let Some(seed) = args.seed {
        config.clock.seed = seed;
    }

    fs::create_dir_all(&args.output_dir)?;
    let sessions_dir = args.output_dir.join("sessions");
    let frames_path = args.output_dir.join(&config.output.frames_file);
    let caps = capabilities(&config);

    let mut sim = match &args.resume {
        Some(name) => {
            let snapshot = SessionSnapshot::load(&sessions_dir, name)?;
            if args.seed.is_some() {
                warn!("--seed is ignored when resuming; the session keeps seed {}", snapshot.seed);
            }
            let logger = FrameLogger::append(&frames_path)?;
            Simulation::from_snapshot(snapshot, caps)?.with_frame_logger(logger)
        }
        None => {
            let world = args.world.as_ref().ok_or_else(|| missing("--world"))?;
            let agents = args.agents.as_ref().ok_or_else(|| missing("--agents"))?;
            let grid = load_world(world)?;
            let agents = load_agents(agents)?;
            info!("World {}x{}, {} agents", grid.width(), grid.height(), agents.len());
            let logger = FrameLogger::new(&frames_path)?;
            Simulation::new(grid, &agents, config, caps)?.with_frame_logger(logger)
        }
    }
    .with_sessions_dir(sessions_dir);

    info!("Starting at step {} ({})", sim.clock().step(), sim.now());
    match &args.commands {
        Some(path) => {
            for command in load_commands(path)? {
                let outcome = sim.apply(command)?;
                info!("{:?}", outcome);
            }
        }
        None => {
            sim.run(args.steps)?;
        }
    }

    if let Some(name) = &args.save {
        sim.save(name)?;
    }
    info!(
        "Simulation complete at step {} ({}). Frames in {}",
        sim.clock().step(),
        sim.now(),
        frames_path.display()
    );
    Ok(())
}

fn main() -> ExitCode {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    if args.print_config {
        print!("{}", town_core::config::default_config_toml());
        return ExitCode::SUCCESS;
    }

    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}
