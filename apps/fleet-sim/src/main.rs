mod config;
mod session;

use anyhow::Result;
use clap::{Parser, ValueEnum};
use config::AppConfig;
use fleet_model::CameraMode;
use session::SimSession;
use std::{path::PathBuf, time::Duration};
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "fleet-sim", about = "Headless EV fleet animation")]
struct Cli {
    /// TOML config file
    #[arg(long)]
    config: Option<PathBuf>,
    /// Simulation results to replay instead of a random fleet
    #[arg(long)]
    simulation: Option<PathBuf>,
    /// Size of the random fleet
    #[arg(long)]
    vehicles: Option<usize>,
    /// Stop after this many seconds; runs until Ctrl-C when omitted
    #[arg(long)]
    duration_s: Option<u64>,
    /// Write every tick's snapshot as NDJSON
    #[arg(long)]
    export: Option<PathBuf>,
    /// Write the final fleet state as CSV
    #[arg(long)]
    csv: Option<PathBuf>,
    /// Vehicle id for the camera to follow
    #[arg(long)]
    follow: Option<String>,
    #[arg(long, value_enum, default_value_t = CameraArg::Chase)]
    camera: CameraArg,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum CameraArg {
    Overview,
    Driving,
    Chase,
    TopDown,
    BirdsEye,
}

impl From<CameraArg> for CameraMode {
    fn from(c: CameraArg) -> Self {
        match c {
            CameraArg::Overview => CameraMode::Overview,
            CameraArg::Driving => CameraMode::Driving,
            CameraArg::Chase => CameraMode::Chase,
            CameraArg::TopDown => CameraMode::TopDown,
            CameraArg::BirdsEye => CameraMode::BirdsEye,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::builder().with_default_directive("info".parse()?).from_env_lossy())
        .init();

    let cli = Cli::parse();
    let cfg = AppConfig::load(cli.config.as_deref())?;
    let stats_every = Duration::from_millis(cfg.run.stats_every_ms.max(1));
    let random_vehicles = cli.vehicles.unwrap_or(cfg.run.random_vehicles);

    let mut sim = SimSession::new(cfg)?;
    match &cli.simulation {
        Some(path) => sim.load_simulation(path)?,
        None => sim.spawn_random(random_vehicles)?,
    };
    if let Some(id) = &cli.follow {
        sim.animator.follow_vehicle(id, cli.camera.into());
    }
    if cli.export.is_some() {
        sim.start_recording();
    }

    sim.animator.start_animation()?;
    let deadline = async {
        match cli.duration_s {
            Some(s) => tokio::time::sleep(Duration::from_secs(s)).await,
            None => std::future::pending().await,
        }
    };
    tokio::pin!(deadline);
    let mut stats = tokio::time::interval(stats_every);
    loop {
        tokio::select! {
            _ = &mut deadline => break,
            _ = tokio::signal::ctrl_c() => {
                info!("interrupted");
                break;
            }
            _ = stats.tick() => sim.log_stats(),
        }
    }
    sim.animator.stop_animation();
    sim.stop_recording();
    sim.log_stats();

    if let Some(path) = &cli.export {
        let snapshots = sim.recording.lock().clone();
        iox::export_snapshots_ndjson(&snapshots, path)?;
        info!(ticks = snapshots.len(), path = %path.display(), "snapshots exported");
    }
    if let Some(path) = &cli.csv {
        iox::export_snapshot_csv(&sim.animator.vehicles(), path)?;
        info!(path = %path.display(), "fleet state exported");
    }
    sim.animator.dispose();
    Ok(())
}
