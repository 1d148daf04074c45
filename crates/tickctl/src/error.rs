//! Error types for tickctl

use std::path::PathBuf;
use thiserror::Error;

use periodic_waiter::WaiterError;

#[derive(Error, Debug)]
pub enum CliError {
    #[error("Failed to read config file {path}: {source}")]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Unsupported config format for {0} (expected .yaml, .yml or .json)")]
    UnsupportedFormat(PathBuf),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    YamlError(#[from] serde_yaml::Error),

    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(#[from] WaiterError),
}
