//! Errors from reading and writing the driver's `config.ron`.

use std::path::PathBuf;

/// Why the driver could not load or store its settings.
///
/// File errors name the path, so a broken `simulation` or `threading`
/// section is reported against the file that holds it.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Creating the config directory or writing the file failed.
    #[error("cannot write {}: {source}", path.display())]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The file is not valid RON for [`Config`](crate::Config).
    #[error("invalid config in {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        source: ron::error::SpannedError,
    },

    #[error("cannot encode config: {0}")]
    Serialize(#[from] ron::Error),

    /// No `--config` was given and the platform has no config directory.
    #[error("no platform config directory, pass --config")]
    NoConfigDir,
}
