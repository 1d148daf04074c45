//! Waiter configuration from an optional file plus command-line overrides.

use std::fs;
use std::path::Path;
use std::time::Duration;

use periodic_waiter::{Resolution, StrategySelection, WaiterConfig, WaiterError};

use crate::error::CliError;

/// Configuration file format, chosen by extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    Yaml,
    Json,
}

impl ConfigFormat {
    pub fn from_path(path: &Path) -> Result<Self, CliError> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase);
        match ext.as_deref() {
            Some("yaml" | "yml") => Ok(ConfigFormat::Yaml),
            Some("json") => Ok(ConfigFormat::Json),
            _ => Err(CliError::UnsupportedFormat(path.to_path_buf())),
        }
    }
}

/// Values given on the command line. `None` keeps the file or default value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Overrides {
    pub period_ms: Option<u64>,
    pub max_wait_ms: Option<u64>,
    pub strategy: Option<StrategySelection>,
    pub resolution: Option<Resolution>,
    pub warmup_cycles: Option<u32>,
}

pub fn parse_config(contents: &str, format: ConfigFormat) -> Result<WaiterConfig, CliError> {
    let config = match format {
        ConfigFormat::Yaml => serde_yaml::from_str(contents)?,
        ConfigFormat::Json => serde_json::from_str(contents)?,
    };
    Ok(config)
}

pub fn load_config(path: &Path) -> Result<WaiterConfig, CliError> {
    let format = ConfigFormat::from_path(path)?;
    let contents = fs::read_to_string(path).map_err(|source| CliError::ConfigRead {
        path: path.to_path_buf(),
        source,
    })?;
    let config = parse_config(&contents, format)?;
    tracing::debug!(path = %path.display(), ?format, "Loaded waiter configuration");
    Ok(config)
}

/// Apply command-line overrides and validate.
///
/// A period given without a maximum wait derives the maximum wait as
/// 1.1 × period. Statistics are always collected.
pub fn apply_overrides(
    mut config: WaiterConfig,
    overrides: &Overrides,
) -> Result<WaiterConfig, CliError> {
    if let Some(ms) = overrides.period_ms {
        config.period = Duration::from_millis(ms);
    }
    match (overrides.max_wait_ms, overrides.period_ms) {
        (Some(ms), _) => config.max_wait = Duration::from_millis(ms),
        (None, Some(_)) => {
            config.max_wait = config.period.checked_mul(11).map(|d| d / 10).ok_or_else(|| {
                WaiterError::invalid_configuration(format!(
                    "period {:?} is too long to derive a maximum wait",
                    config.period
                ))
            })?;
        }
        (None, None) => {}
    }
    if let Some(strategy) = overrides.strategy {
        config.strategy = strategy;
    }
    if let Some(resolution) = overrides.resolution {
        config.resolution = resolution;
    }
    if let Some(cycles) = overrides.warmup_cycles {
        config.warmup_cycles = cycles;
    }
    config.collect_statistics = true;

    config.validate()?;
    Ok(config)
}
