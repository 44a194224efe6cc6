//! Command-line argument parsing for the mover driver.

use std::path::PathBuf;

use clap::Parser;

use crate::Config;

/// Mover driver command-line arguments.
///
/// CLI values override settings loaded from `config.ron`.
#[derive(Parser, Debug, Default)]
#[command(name = "mover", about = "Deterministic movement simulation driver")]
pub struct CliArgs {
    /// Simulation step in milliseconds.
    #[arg(long)]
    pub fixed_step_ms: Option<f32>,

    /// Number of frames to simulate before exiting.
    #[arg(long)]
    pub ticks: Option<u32>,

    /// Log level (error, warn, info, debug, trace).
    #[arg(long)]
    pub log_level: Option<String>,

    /// Path to config directory (overrides default location).
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Run every tick phase in parallel across actors.
    #[arg(long = "async")]
    pub async_phases: Option<bool>,
}

impl Config {
    /// Apply CLI overrides to a loaded config.
    pub fn apply_cli_overrides(&mut self, args: &CliArgs) {
        if let Some(step) = args.fixed_step_ms {
            self.simulation.fixed_step_ms = step;
        }
        if let Some(ref level) = args.log_level {
            self.debug.log_level = level.clone();
        }
        if let Some(enabled) = args.async_phases {
            self.threading.set_all(enabled);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_override() {
        let mut config = Config::default();
        let args = CliArgs {
            fixed_step_ms: Some(20.0),
            log_level: Some("debug".to_string()),
            async_phases: Some(true),
            ..Default::default()
        };
        config.apply_cli_overrides(&args);
        assert_eq!(config.simulation.fixed_step_ms, 20.0);
        assert_eq!(config.debug.log_level, "debug");
        assert!(config.threading.allow_async_phases);
        assert!(config.threading.async_simulate);
        // Non-overridden fields retain defaults
        assert_eq!(config.simulation.history_frames, 128);
    }

    #[test]
    fn test_cli_no_override() {
        let original = Config::default();
        let mut config = Config::default();
        config.apply_cli_overrides(&CliArgs::default());
        assert_eq!(config, original);
    }

    #[test]
    fn test_cli_parses_flags() {
        let args = CliArgs::parse_from([
            "mover",
            "--ticks",
            "30",
            "--async",
            "false",
            "--config",
            "/tmp/mover",
        ]);
        assert_eq!(args.ticks, Some(30));
        assert_eq!(args.async_phases, Some(false));
        assert_eq!(args.config, Some(PathBuf::from("/tmp/mover")));
        assert_eq!(args.fixed_step_ms, None);
    }
}
