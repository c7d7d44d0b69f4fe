//! Runtime errors

use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, RuntimeError>;

#[derive(Debug, Error)]
pub enum RuntimeError {
    /// Config file could not be read
    #[error("Failed to read config '{path}': {source}")]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Config file is not valid TOML for [`KilnConfig`](crate::config::KilnConfig)
    #[error("Invalid config '{path}': {source}")]
    ConfigParse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    /// Config values that cannot run
    #[error("Invalid config: {0}")]
    ConfigInvalid(String),

    #[error(transparent)]
    Hotload(#[from] kiln_hotload::HotloadError),

    #[error("Failed to install Ctrl-C handler: {0}")]
    Signal(#[from] ctrlc::Error),

    #[error("Failed to spawn input thread: {0}")]
    Io(#[from] std::io::Error),
}
