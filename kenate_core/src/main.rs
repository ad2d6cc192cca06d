//! # Kenate Patrol Simulation
//!
//! Runs a patrol/avoidance robot on a mock motor: the engine ticks the
//! active state while a supervisor switches modes from the obstacle flag.
//!
//! # Usage
//!
//! ```bash
//! # Defaults: 100 Hz for 15 s
//! kenate
//!
//! # Config file, reproducible obstacles, debug logs
//! kenate --config config/kenate.toml --seed 7 -v
//!
//! # Faster loop, JSON logs
//! kenate --frequency 500 --duration 5 --json
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use clap::Parser;
use kenate_common::config::{ConfigLoader, EngineConfig, KenateConfig, LogLevel};
use kenate_common::hal::{MockMotor, Motor};
use kenate_core::sim::{AvoidanceState, PatrolState, desired_mode};
use kenate_core::{Engine, EngineError};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{Level, error, info, warn};
use tracing_subscriber::EnvFilter;

const SUPERVISOR_PERIOD: Duration = Duration::from_millis(100);
const DETECTOR_PERIOD_S: f64 = 0.5;
const AVOIDANCE_CLEAR_S: f64 = 2.0;

/// Kenate - fixed-rate state machine engine, patrol robot simulation
#[derive(Parser, Debug)]
#[command(name = "kenate")]
#[command(version)]
#[command(about = "Fixed-rate state machine engine running a patrol robot simulation")]
#[command(long_about = None)]
struct Args {
    /// Path to a TOML configuration file.
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Tick rate [Hz]; overrides the config file.
    #[arg(short, long)]
    frequency: Option<f64>,

    /// Run time [s].
    #[arg(short, long, default_value = "15", value_parser = parse_duration)]
    duration: Duration,

    /// Seed for the simulated obstacle sensor.
    #[arg(long)]
    seed: Option<u64>,

    /// Chance that a sensor poll reports an obstacle.
    #[arg(long, default_value_t = 0.2, value_parser = parse_probability)]
    obstacle_probability: f64,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Output logs in JSON format
    #[arg(long)]
    json: bool,
}

fn parse_probability(s: &str) -> Result<f64, String> {
    let p: f64 = s.parse().map_err(|e| format!("{e}"))?;
    if (0.0..=1.0).contains(&p) {
        Ok(p)
    } else {
        Err(format!("{p} is not in [0, 1]"))
    }
}

fn parse_duration(s: &str) -> Result<Duration, String> {
    let secs: f64 = s.parse().map_err(|e| format!("{e}"))?;
    if secs < 0.0 {
        return Err(format!("{secs} is negative"));
    }
    Duration::try_from_secs_f64(secs).map_err(|e| format!("{secs}: {e}"))
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    if let Err(e) = run() {
        error!("Kenate failed: {}", e);
        std::process::exit(1);
    }
    Ok(())
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let loaded = args.config.as_deref().map(load_config).transpose();
    let log_level = match &loaded {
        Ok(Some(config)) => config.shared.log_level,
        _ => LogLevel::Info,
    };
    setup_tracing(&args, log_level);
    let config = loaded?;

    info!("Kenate v{} starting...", env!("CARGO_PKG_VERSION"));

    let engine_config = config
        .as_ref()
        .map(|c| c.engine.clone())
        .unwrap_or_default();
    let engine = Engine::from_config(&engine_config)?;
    if let Some(hz) = args.frequency {
        engine.set_frequency(hz)?;
    }
    engine.set_rt_config(config.as_ref().and_then(|c| c.rt));
    let hz = engine.frequency();

    let motor = MockMotor::with_step("LeftWheel", 1.0 / hz).shared();
    let obstacle = Arc::new(AtomicBool::new(false));

    let mut rng = match args.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };
    let p = args.obstacle_probability;
    let detector = Box::new(move || rng.gen_bool(p));

    engine.add_state(PatrolState::new(
        Arc::clone(&motor),
        Arc::clone(&obstacle),
        detector,
        ticks_for(DETECTOR_PERIOD_S, hz),
    ))?;
    engine.add_state(AvoidanceState::new(
        Arc::clone(&motor),
        Arc::clone(&obstacle),
        ticks_for(AVOIDANCE_CLEAR_S, hz),
    ))?;
    check_config_states(&engine, &engine_config)?;

    let keep_running = Arc::new(AtomicBool::new(true));
    let flag = Arc::clone(&keep_running);
    ctrlc::set_handler(move || {
        info!("Received shutdown signal");
        flag.store(false, Ordering::SeqCst);
    })?;

    engine.start()?;
    supervise(&engine, &obstacle, &keep_running, args.duration);

    info!("Shutting down...");
    let stopped = engine.stop();
    report(&engine, motor.lock().position());
    stopped?;

    info!("Kenate shutdown complete");
    Ok(())
}

fn load_config(path: &Path) -> Result<KenateConfig, EngineError> {
    let config = KenateConfig::load(path)?;
    config.validate()?;
    Ok(config)
}

/// Setup tracing subscriber based on CLI arguments.
fn setup_tracing(args: &Args, configured: LogLevel) {
    let level = if args.verbose {
        Level::DEBUG
    } else {
        configured.as_str().parse().unwrap_or(Level::INFO)
    };

    let filter = EnvFilter::from_default_env().add_directive(level.into());

    if args.json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

fn ticks_for(seconds: f64, hz: f64) -> u64 {
    ((seconds * hz).round() as u64).max(1)
}

fn check_config_states(engine: &Engine, config: &EngineConfig) -> Result<(), EngineError> {
    let names = engine.state_names();
    for name in [&config.initial_state, &config.fail_safe_state]
        .into_iter()
        .flatten()
    {
        if !names.contains(name) {
            return Err(EngineError::UnknownState(name.clone()));
        }
    }
    Ok(())
}

/// Switch modes only when the desired one changes, so a state is not
/// re-entered every supervisor period.
///
/// A run time past the range of `Instant` runs until Ctrl+C.
fn supervise(
    engine: &Engine,
    obstacle: &AtomicBool,
    keep_running: &AtomicBool,
    duration: Duration,
) {
    let deadline = Instant::now().checked_add(duration);
    let mut mode = engine.current_state().unwrap_or_default();

    while deadline.is_none_or(|d| Instant::now() < d) && keep_running.load(Ordering::SeqCst) {
        thread::sleep(SUPERVISOR_PERIOD);
        if !engine.is_running() {
            warn!("Control loop halted, leaving supervisor");
            break;
        }
        let desired = desired_mode(obstacle.load(Ordering::Acquire));
        if desired != mode {
            match engine.set_state(desired) {
                Ok(()) => mode = desired.to_string(),
                Err(e) => warn!("Mode switch to {desired} rejected: {e}"),
            }
        }
    }
}

fn report(engine: &Engine, position: f64) {
    let stats = engine.stats();
    info!(
        "Cycle stats: ticks={}, avg={}ns, max={}ns, overruns={}, skipped={}, transitions={}, faults={}",
        stats.tick_count,
        stats.avg_tick_ns(),
        stats.max_tick_ns,
        stats.overruns,
        stats.skipped_ticks,
        stats.transitions,
        stats.faults
    );
    info!("Final wheel position: {position:.3}");
    if let Some(fault) = engine.last_fault() {
        warn!("Last contained fault: {fault}");
    }
}
