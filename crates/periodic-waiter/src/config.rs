//! Waiter configuration.
//!
//! A [`WaiterConfig`] fixes everything about a waiter that cannot change
//! after construction: period, maximum tolerated wait, the timing strategy
//! request, whether statistics are collected, and the resolution at which
//! durations are measured and reported.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

use crate::error::{WaiterError, WaiterResult};

const NANOS_PER_SEC: u128 = 1_000_000_000;

/// Longest accepted period or maximum wait.
///
/// Deadlines are kept as `time_t` seconds on the monotonic clock; the cap
/// leaves room to add many periods even where `time_t` is 32 bits wide.
pub const MAX_INTERVAL: Duration = Duration::from_secs(1 << 28);

/// Canonical unit for measured durations.
///
/// `period`, `max_wait` and every measured cycle time are truncated to whole
/// units; statistics are reported as `f64` counts of the unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Resolution {
    /// Whole seconds.
    Seconds,
    /// Whole milliseconds.
    Milliseconds,
    /// Whole microseconds.
    Microseconds,
    /// Whole nanoseconds (no truncation).
    #[default]
    Nanoseconds,
}

impl Resolution {
    /// Length of one unit in nanoseconds.
    #[must_use]
    pub const fn unit_nanos(self) -> u64 {
        match self {
            Resolution::Seconds => 1_000_000_000,
            Resolution::Milliseconds => 1_000_000,
            Resolution::Microseconds => 1_000,
            Resolution::Nanoseconds => 1,
        }
    }

    /// Short unit suffix used in human-readable output.
    #[must_use]
    pub const fn suffix(self) -> &'static str {
        match self {
            Resolution::Seconds => "s",
            Resolution::Milliseconds => "ms",
            Resolution::Microseconds => "us",
            Resolution::Nanoseconds => "ns",
        }
    }

    /// Truncate a duration to whole units.
    #[must_use]
    pub fn truncate(self, duration: Duration) -> Duration {
        let unit = u128::from(self.unit_nanos());
        let nanos = duration.as_nanos() / unit * unit;
        let secs = u64::try_from(nanos / NANOS_PER_SEC).unwrap_or(u64::MAX);
        // Always < 1e9, fits in u32.
        let subsec = u32::try_from(nanos % NANOS_PER_SEC).unwrap_or(0);
        Duration::new(secs, subsec)
    }

    /// Express a duration as a count of whole units.
    #[must_use]
    pub fn to_units(self, duration: Duration) -> f64 {
        (duration.as_nanos() / u128::from(self.unit_nanos())) as f64
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.suffix())
    }
}

/// Which timing strategy `start` arms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StrategySelection {
    /// Deadline strategy when the calling thread runs under a real-time
    /// policy at `start`, signal strategy otherwise.
    #[default]
    Auto,
    /// Always sleep to absolute deadlines.
    Deadline,
    /// Always sleep relative to a periodic signal.
    Signal,
}

/// Periodic waiter configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WaiterConfig {
    /// Intended spacing between ticks.
    pub period: Duration,
    /// Longest tolerated gap between ticks before a cycle is an overrun.
    pub max_wait: Duration,
    /// Collect running statistics of cycle times.
    pub collect_statistics: bool,
    /// Timing strategy request.
    pub strategy: StrategySelection,
    /// Measurement resolution.
    pub resolution: Resolution,
    /// Completed cycles after each `start` left out of statistics.
    pub warmup_cycles: u32,
}

impl Default for WaiterConfig {
    fn default() -> Self {
        Self {
            period: Duration::from_millis(100),
            max_wait: Duration::from_millis(110),
            collect_statistics: false,
            strategy: StrategySelection::Auto,
            resolution: Resolution::Nanoseconds,
            warmup_cycles: 0,
        }
    }
}

impl WaiterConfig {
    /// Configuration with the given period and maximum wait, defaults otherwise.
    #[must_use]
    pub fn new(period: Duration, max_wait: Duration) -> Self {
        Self {
            period,
            max_wait,
            ..Self::default()
        }
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`WaiterError::InvalidConfiguration`] if the period or the
    /// maximum wait is zero (before or after truncation to the resolution),
    /// if either exceeds [`MAX_INTERVAL`], or if the maximum wait is shorter
    /// than the period.
    pub fn validate(&self) -> WaiterResult<()> {
        if self.period.is_zero() {
            return Err(WaiterError::invalid_configuration(
                "period must be greater than 0",
            ));
        }
        if self.max_wait.is_zero() {
            return Err(WaiterError::invalid_configuration(
                "max_wait must be greater than 0",
            ));
        }
        if self.period > MAX_INTERVAL || self.max_wait > MAX_INTERVAL {
            return Err(WaiterError::invalid_configuration(format!(
                "period {:?} and max_wait {:?} must not exceed {:?}",
                self.period, self.max_wait, MAX_INTERVAL
            )));
        }
        if self.max_wait < self.period {
            return Err(WaiterError::invalid_configuration(format!(
                "max_wait {:?} is shorter than period {:?}",
                self.max_wait, self.period
            )));
        }
        if self.period().is_zero() {
            return Err(WaiterError::invalid_configuration(format!(
                "period {:?} truncates to zero at {} resolution",
                self.period, self.resolution
            )));
        }
        Ok(())
    }

    /// Period truncated to the configured resolution.
    #[must_use]
    pub fn period(&self) -> Duration {
        self.resolution.truncate(self.period)
    }

    /// Maximum wait truncated to the configured resolution.
    #[must_use]
    pub fn max_wait(&self) -> Duration {
        self.resolution.truncate(self.max_wait)
    }

    /// Create a configuration builder.
    #[must_use]
    pub fn builder() -> WaiterConfigBuilder {
        WaiterConfigBuilder::default()
    }
}

/// Builder for [`WaiterConfig`].
#[derive(Debug, Default)]
pub struct WaiterConfigBuilder {
    config: WaiterConfig,
}

impl WaiterConfigBuilder {
    /// Set the period.
    #[must_use]
    pub fn period(mut self, period: Duration) -> Self {
        self.config.period = period;
        self
    }

    /// Set the maximum wait.
    #[must_use]
    pub fn max_wait(mut self, max_wait: Duration) -> Self {
        self.config.max_wait = max_wait;
        self
    }

    /// Enable or disable statistics.
    #[must_use]
    pub fn collect_statistics(mut self, enabled: bool) -> Self {
        self.config.collect_statistics = enabled;
        self
    }

    /// Set the timing strategy request.
    #[must_use]
    pub fn strategy(mut self, strategy: StrategySelection) -> Self {
        self.config.strategy = strategy;
        self
    }

    /// Set the measurement resolution.
    #[must_use]
    pub fn resolution(mut self, resolution: Resolution) -> Self {
        self.config.resolution = resolution;
        self
    }

    /// Set the number of warm-up cycles left out of statistics.
    #[must_use]
    pub fn warmup_cycles(mut self, cycles: u32) -> Self {
        self.config.warmup_cycles = cycles;
        self
    }

    /// Build the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn build(self) -> WaiterResult<WaiterConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}
