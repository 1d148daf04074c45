//! Online cycle-time statistics.
//!
//! Mean, standard deviation and time-erosion estimate are updated with
//! incremental recurrences, so no sample history is stored and each update
//! is O(1).

use serde::Serialize;

/// Snapshot of running cycle-time statistics.
///
/// All values are expressed in units of the waiter's
/// [`Resolution`](crate::Resolution).
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Statistics {
    /// Number of accepted samples.
    pub count: u64,
    /// Shortest accepted cycle time (`+inf` before the first sample).
    pub min: f64,
    /// Longest accepted cycle time.
    pub max: f64,
    /// Mean cycle time.
    pub mean: f64,
    /// Sample standard deviation of the cycle time.
    pub standard_deviation: f64,
    /// Mean per-cycle time spent outside the blocking sleep.
    pub time_erosion: f64,
}

impl Default for Statistics {
    fn default() -> Self {
        RunningStats::new().snapshot()
    }
}

/// Running statistics accumulator.
///
/// # RT-Safety
///
/// `record` is O(1), allocation-free and branch-light.
#[derive(Debug, Clone)]
pub struct RunningStats {
    count: u64,
    min: f64,
    max: f64,
    mean: f64,
    sd: f64,
    erosion: f64,
}

impl Default for RunningStats {
    fn default() -> Self {
        Self::new()
    }
}

impl RunningStats {
    /// Create an empty accumulator.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            count: 0,
            min: f64::INFINITY,
            max: 0.0,
            mean: 0.0,
            sd: 0.0,
            erosion: 0.0,
        }
    }

    /// Record one cycle.
    ///
    /// # Arguments
    ///
    /// * `elapsed` - Measured cycle time
    /// * `overhead` - Part of the cycle spent outside the sleep
    pub fn record(&mut self, elapsed: f64, overhead: f64) {
        self.count = self.count.saturating_add(1);
        self.min = self.min.min(elapsed);
        self.max = self.max.max(elapsed);

        if self.count <= 1 {
            self.mean = elapsed;
            self.sd = 0.0;
            self.erosion = 0.0;
            return;
        }

        let n = self.count as f64;
        let n1 = n - 1.0;
        let n2 = n - 2.0;

        self.mean = (n1 * self.mean + elapsed) / n;
        self.erosion = (n1 * self.erosion + overhead) / n;

        // Sample variance seeded with the previous variance and the updated mean.
        let variance = (n2 * self.sd.powi(2) + (n / n1) * (self.mean - elapsed).powi(2)) / n1;
        self.sd = variance.max(0.0).sqrt();
    }

    /// Number of accepted samples.
    #[inline]
    #[must_use]
    pub fn count(&self) -> u64 {
        self.count
    }

    /// Clear all samples.
    pub fn reset(&mut self) {
        *self = Self::new();
    }

    /// Current values.
    #[must_use]
    pub fn snapshot(&self) -> Statistics {
        Statistics {
            count: self.count,
            min: self.min,
            max: self.max,
            mean: self.mean,
            standard_deviation: self.sd,
            time_erosion: self.erosion,
        }
    }
}
