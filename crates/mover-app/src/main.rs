//! The binary entry point for the mover driver.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing::{debug, error, info};

use mover_app::driver::FixedStepDriver;
use mover_app::scenario::Scenario;
use mover_config::{CliArgs, Config, default_config_dir};

const DEFAULT_TICKS: u32 = 180;

fn main() -> ExitCode {
    let args = CliArgs::parse();

    let config_dir = match args.config.clone().map_or_else(default_config_dir, Ok) {
        Ok(dir) => dir,
        Err(e) => {
            eprintln!("Failed to resolve config directory: {e}");
            return ExitCode::FAILURE;
        }
    };
    let mut config = match Config::load_or_create(&config_dir) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load config from {}: {e}", config_dir.display());
            return ExitCode::FAILURE;
        }
    };
    config.apply_cli_overrides(&args);
    config.sanitize();

    let log_dir = log_dir(&config_dir);
    mover_log::init_logging(Some(&log_dir), cfg!(debug_assertions), Some(&config));

    let ticks = args.ticks.unwrap_or(DEFAULT_TICKS);
    info!(
        config = %config_dir.display(),
        step_ms = config.simulation.fixed_step_ms,
        ticks,
        async_phases = config.threading.allow_async_phases,
        "mover driver starting"
    );

    let mut scenario = Scenario::demo(&config);
    let mut driver = FixedStepDriver::new(
        config.simulation.fixed_step_ms,
        config.simulation.max_frame_time_ms,
    );

    // Headless: each driver frame lasts one and a half steps, so presentation
    // alternates between whole and half-step blends.
    let frame_time_ms = f64::from(config.simulation.fixed_step_ms) * 1.5;
    while driver.update_count() < u64::from(ticks) {
        let mut last_alpha = 0.0;
        driver.advance(
            frame_time_ms,
            |step_ms, _sim_time_ms| scenario.step(step_ms),
            |alpha| last_alpha = alpha,
        );
        for snapshot in scenario.snapshots(last_alpha) {
            debug!(
                actor = %snapshot.name,
                frame = snapshot.frame,
                mode = %snapshot.mode,
                location = ?snapshot.location,
                alpha = last_alpha,
                "presented"
            );
        }
    }

    let snapshots = scenario.snapshots(1.0);
    if snapshots.is_empty() {
        error!("scenario has no actors");
        return ExitCode::FAILURE;
    }
    println!(
        "Simulated {} frames ({:.1} ms)",
        driver.update_count(),
        driver.total_sim_time_ms()
    );
    for snapshot in snapshots {
        println!(
            "  {:<8} frame {:>4}  {:<8} location {:?}  velocity {:?}",
            snapshot.name, snapshot.frame, snapshot.mode, snapshot.location, snapshot.velocity
        );
    }
    ExitCode::SUCCESS
}

/// Log files go next to the config unless the platform has a data directory.
fn log_dir(config_dir: &std::path::Path) -> PathBuf {
    dirs::data_local_dir()
        .map(|dir| dir.join("mover").join("logs"))
        .unwrap_or_else(|| config_dir.join("logs"))
}
