//! Configuration for the mover driver.
//!
//! Settings persist to disk as RON and can be overridden from the command
//! line. Missing sections and fields fall back to defaults so older files
//! keep loading as new settings are added.

mod cli;
mod config;
mod error;

pub use cli::CliArgs;
pub use config::{
    CONFIG_FILE_NAME, Config, DebugConfig, NetworkConfig, SimulationConfig, ThreadingConfig,
    default_config_dir,
};
pub use error::ConfigError;
