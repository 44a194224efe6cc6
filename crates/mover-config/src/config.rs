//! Configuration structs with sensible defaults and RON persistence.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// File name of the persisted config inside the config directory.
pub const CONFIG_FILE_NAME: &str = "config.ron";

const APP_NAME: &str = "mover";

/// Top-level driver configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Fixed-step simulation settings.
    pub simulation: SimulationConfig,
    /// Replication settings.
    pub network: NetworkConfig,
    /// Which tick phases may run across actors in parallel.
    pub threading: ThreadingConfig,
    /// Debug/development settings.
    pub debug: DebugConfig,
}

/// Fixed-step simulation configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SimulationConfig {
    /// Length of one simulation frame in milliseconds.
    pub fixed_step_ms: f32,
    /// Longest wall-clock frame the driver catches up on before clamping.
    pub max_frame_time_ms: f32,
    /// Frames of input and state kept for resimulation after a correction.
    pub history_frames: usize,
    /// Mode a mover enters when its sync state names none.
    pub starting_movement_mode: String,
}

/// Replication configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct NetworkConfig {
    /// Most active layered moves written per sync state.
    pub max_layered_moves_to_serialize: u8,
    /// Most active movement modifiers written per sync state.
    pub max_modifiers_to_serialize: u8,
}

/// Tick phase threading configuration.
///
/// A per-phase flag only takes effect when `allow_async_phases` is set.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ThreadingConfig {
    /// Global switch for parallel phases.
    pub allow_async_phases: bool,
    /// Produce input for all actors in parallel.
    pub async_produce_input: bool,
    /// Simulate all actors in parallel.
    pub async_simulate: bool,
    /// Apply state for all actors in parallel.
    pub async_apply: bool,
}

/// Debug/development configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DebugConfig {
    /// Log level override (e.g., "debug", "info", "warn").
    pub log_level: String,
}

// --- Default implementations ---

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            fixed_step_ms: 1000.0 / 60.0,
            max_frame_time_ms: 250.0,
            history_frames: 128,
            starting_movement_mode: "Walking".to_string(),
        }
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            max_layered_moves_to_serialize: 16,
            max_modifiers_to_serialize: 16,
        }
    }
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

impl ThreadingConfig {
    /// Turns every phase parallel, or back to sequential.
    pub fn set_all(&mut self, enabled: bool) {
        self.allow_async_phases = enabled;
        self.async_produce_input = enabled;
        self.async_simulate = enabled;
        self.async_apply = enabled;
    }
}

/// Platform config directory for the driver, e.g. `~/.config/mover` on Linux.
pub fn default_config_dir() -> Result<PathBuf, ConfigError> {
    dirs::config_dir()
        .map(|base| base.join(APP_NAME))
        .ok_or(ConfigError::NoConfigDir)
}

// --- Validation ---

impl Config {
    /// Replaces values the driver cannot run with by their defaults.
    pub fn sanitize(&mut self) {
        let defaults = SimulationConfig::default();
        let sim = &mut self.simulation;
        if !(sim.fixed_step_ms.is_finite() && sim.fixed_step_ms > 0.0) {
            log::warn!(
                "fixed_step_ms {} is not a positive duration, using {}",
                sim.fixed_step_ms,
                defaults.fixed_step_ms
            );
            sim.fixed_step_ms = defaults.fixed_step_ms;
        }
        if !(sim.max_frame_time_ms.is_finite() && sim.max_frame_time_ms >= sim.fixed_step_ms) {
            log::warn!(
                "max_frame_time_ms {} is shorter than one step, using {}",
                sim.max_frame_time_ms,
                sim.fixed_step_ms
            );
            sim.max_frame_time_ms = sim.fixed_step_ms;
        }
        if sim.history_frames == 0 {
            log::warn!("history_frames must be at least 1");
            sim.history_frames = 1;
        }
    }
}

// --- Load / Save / Reload ---

fn read_config_file(path: &Path) -> Result<Config, ConfigError> {
    let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    ron::from_str(&contents).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

impl Config {
    /// Load config from the given directory, or create a default config file.
    pub fn load_or_create(config_dir: &Path) -> Result<Self, ConfigError> {
        let config_path = config_dir.join(CONFIG_FILE_NAME);

        if config_path.exists() {
            let config = read_config_file(&config_path)?;
            log::info!("Loaded config from {}", config_path.display());
            Ok(config)
        } else {
            let config = Config::default();
            config.save(config_dir)?;
            log::info!("Created default config at {}", config_path.display());
            Ok(config)
        }
    }

    /// Save config to the given directory as `config.ron`.
    pub fn save(&self, config_dir: &Path) -> Result<(), ConfigError> {
        std::fs::create_dir_all(config_dir).map_err(|source| ConfigError::Write {
            path: config_dir.to_path_buf(),
            source,
        })?;

        let config_path = config_dir.join(CONFIG_FILE_NAME);
        let pretty = ron::ser::PrettyConfig::new()
            .depth_limit(3)
            .separate_tuple_members(true)
            .enumerate_arrays(false);

        let serialized = ron::ser::to_string_pretty(self, pretty)?;

        std::fs::write(&config_path, serialized).map_err(|source| ConfigError::Write {
            path: config_path.clone(),
            source,
        })?;
        Ok(())
    }

    /// Hot-reload: returns `Some(new_config)` if the file changed, `None` otherwise.
    pub fn reload(&self, config_dir: &Path) -> Result<Option<Self>, ConfigError> {
        let config_path = config_dir.join(CONFIG_FILE_NAME);
        let new_config = read_config_file(&config_path)?;

        if &new_config != self {
            log::info!("Config reloaded with changes");
            Ok(Some(new_config))
        } else {
            Ok(None)
        }
    }
}
