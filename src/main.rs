//! Rigcal - Full-body tracker calibration
//!
//! Demo entry point: calibrates an avatar on a simulated rig.

use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{error, info, warn, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use rigcal::{
    config::Config, sim::SimulatedRig, Calibrator, CalibrationPoint, SessionState,
};

/// Rigcal - calibrate body trackers against a simulated rig
#[derive(Parser, Debug)]
#[command(name = "rigcal", version, about, long_about = None)]
struct Args {
    /// Configuration file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Number of body trackers (overrides config)
    #[arg(short, long)]
    trackers: Option<usize>,

    /// Simulated frame rate (overrides config)
    #[arg(long)]
    frame_rate: Option<u32>,

    /// Avatar identifier
    #[arg(short, long, default_value = "avatar")]
    avatar: String,

    /// Calibrate a second avatar after the first one is applied
    #[arg(long)]
    recalibrate: bool,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize logging
    let log_level = if args.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(
            EnvFilter::builder()
                .with_default_directive(log_level.into())
                .from_env_lossy(),
        )
        .init();

    info!("Starting {} v{}", rigcal::NAME, rigcal::VERSION);

    // Load configuration
    let mut config = if let Some(ref path) = args.config {
        Config::from_file(path)?
    } else {
        Config::load()?
    };

    // Apply CLI overrides
    if let Some(trackers) = args.trackers {
        config.simulation.tracker_count = trackers;
    }
    if let Some(frame_rate) = args.frame_rate {
        config.simulation.frame_rate = frame_rate;
    }

    config.validate()?;

    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(async {
        tokio::select! {
            result = run(&config, &args) => result,
            _ = shutdown_signal() => {
                info!("Shutdown signal received");
                Ok(())
            }
        }
    })?;

    info!("Rigcal stopped");
    Ok(())
}

/// Drive the simulated rig one frame per interval tick until every
/// requested calibration has finished.
async fn run(config: &Config, args: &Args) -> anyhow::Result<()> {
    let sim = &config.simulation;
    let mut rig = SimulatedRig::new(sim);
    let mut calibrator = Calibrator::new(config.calibration.clone(), &rig.host)?;

    info!(
        "Simulated rig with {} body trackers at {} Hz",
        rig.trackers().len(),
        sim.frame_rate
    );

    let mut pending = vec![args.avatar.clone()];
    if args.recalibrate {
        pending.push(format!("{}-2", args.avatar));
    }
    pending.reverse();

    let mut interval = tokio::time::interval(Duration::from_secs_f64(1.0 / f64::from(sim.frame_rate)));
    let mut capture_frames = 0u32;
    let mut first = true;

    loop {
        interval.tick().await;

        if !calibrator.is_busy() {
            report(&calibrator, &rig);
            let Some(id) = pending.pop() else {
                break;
            };
            if !first {
                // Step aside and turn, as a user swapping avatars would
                rig.move_user(glam::Vec3::new(0.5, 0.0, 0.3));
                rig.turn_user(0.6);
            }
            first = false;
            capture_frames = 0;
            rig.set_triggers(0.0, 0.0);

            let avatar = rig.spawn_avatar(&id);
            calibrator.calibrate(avatar, &mut rig.env());
            continue;
        }

        if let Some(SessionState::Capturing(_)) = calibrator.state() {
            capture_frames += 1;
            simulate_triggers(&mut rig, capture_frames, sim.confirm_after_frames);
        }

        calibrator.tick(&mut rig.env());
    }

    Ok(())
}

/// The simulated user half-squeezes to freeze, then squeezes fully.
fn simulate_triggers(rig: &mut SimulatedRig, frame: u32, confirm_after: u32) {
    if frame >= confirm_after {
        rig.set_triggers(1.0, 1.0);
    } else if frame >= confirm_after / 2 {
        rig.set_triggers(0.5, 0.5);
    } else {
        rig.set_triggers(0.0, 0.0);
    }
}

fn report(calibrator: &Calibrator, rig: &SimulatedRig) {
    match calibrator.state() {
        Some(SessionState::Applied(report)) => {
            let bound: Vec<&str> = report.bound.iter().map(CalibrationPoint::as_str).collect();
            info!("Bound points: {}", bound.join(", "));
            for (point, e) in &report.skipped {
                warn!("{} skipped: {}", point, e);
            }
            info!(
                "Solver: pelvis={:?} left_leg={:?} right_leg={:?} weights={:?}",
                rig.solver.pelvis_target,
                rig.solver.left_leg_target,
                rig.solver.right_leg_target,
                rig.solver.bend_weights
            );
        }
        Some(SessionState::Failed { reason }) => error!("Calibration failed: {}", reason),
        Some(state) => info!("Calibration ended in state {}", state),
        None => {}
    }
}

async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!("Failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
