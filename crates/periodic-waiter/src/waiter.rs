//! Fixed-period waiter with overrun detection and running statistics.
//!
//! A [`PeriodicWaiter`] blocks the calling thread until the next tick of a
//! fixed-period schedule. The caller does its periodic work between two
//! `wait` calls:
//!
//! ```no_run
//! use periodic_waiter::{PeriodicWaiter, WaiterConfig};
//! use std::time::Duration;
//!
//! # fn main() -> Result<(), periodic_waiter::WaiterError> {
//! let config = WaiterConfig::builder()
//!     .period(Duration::from_millis(10))
//!     .max_wait(Duration::from_millis(12))
//!     .collect_statistics(true)
//!     .build()?;
//! let mut waiter = PeriodicWaiter::new(config)?;
//!
//! waiter.start()?;
//! for _ in 0..100 {
//!     // Sample sensors, drive actuators...
//!     waiter.wait_checked()?;
//! }
//! println!("{:?}", waiter.statistics()?);
//! waiter.stop();
//! # Ok(())
//! # }
//! ```

use serde::Serialize;
use std::fmt;
use std::time::{Duration, Instant};

use crate::config::WaiterConfig;
use crate::error::{WaiterError, WaiterResult};
use crate::rt_setup::{self, RtSetup};
use crate::stats::{RunningStats, Statistics};
use crate::strategy::{self, SleepOutcome, StrategyKind, TimingStrategy};

/// Classification of a completed `wait`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WaitStatus {
    /// Normal cycle.
    Ok,
    /// Signal strategy only: the periodic notification did not arrive
    /// within `max_wait`.
    SignalLate,
    /// The measured cycle time exceeded `max_wait`.
    MaxWaitExceeded,
    /// Deadline strategy only: the sleep was interrupted by an unrelated signal.
    Interrupted,
}

impl WaitStatus {
    /// Whether the cycle was normal.
    #[inline]
    #[must_use]
    pub fn is_ok(self) -> bool {
        self == WaitStatus::Ok
    }
}

impl fmt::Display for WaitStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WaitStatus::Ok => write!(f, "ok"),
            WaitStatus::SignalLate => write!(f, "signal late"),
            WaitStatus::MaxWaitExceeded => write!(f, "max wait exceeded"),
            WaitStatus::Interrupted => write!(f, "interrupted"),
        }
    }
}

/// Fixed-period precision waiter.
///
/// Lifecycle: `new` → `start` → `wait`* → `stop`, restartable. Dropping a
/// running waiter stops it.
///
/// # Concurrency
///
/// A waiter is driven by one thread. In signal mode the interval timer
/// targets the thread that called `start`, so `wait` must be called from
/// that same thread. `SIGALRM` stays unblocked on it until `stop`, and the
/// handler restarts the thread's other interrupted blocking calls.
///
/// # RT-Safety
///
/// - `wait` is O(1) and allocation-free
/// - `start` allocates the timing strategy; call it before entering the loop
pub struct PeriodicWaiter {
    config: WaiterConfig,

    /// Period truncated to the configured resolution
    period: Duration,

    /// Maximum wait truncated to the configured resolution
    max_wait: Duration,

    /// Armed (or injected) timing strategy
    strategy: Option<Box<dyn TimingStrategy>>,

    /// Strategy was supplied by the caller and survives `stop`
    injected: bool,

    running: bool,

    /// Time of the previous tick, or of `start`
    last_tick: Option<Instant>,

    last_elapsed: Duration,

    last_erosion: Duration,

    /// Completed waits since `start`, including anomalous ones
    cycles: u64,

    stats: Option<RunningStats>,
}

impl PeriodicWaiter {
    /// Create a waiter from a configuration.
    ///
    /// # Errors
    ///
    /// Returns [`WaiterError::InvalidConfiguration`] if the configuration
    /// fails [`WaiterConfig::validate`].
    pub fn new(config: WaiterConfig) -> WaiterResult<Self> {
        config.validate()?;
        Ok(Self {
            period: config.period(),
            max_wait: config.max_wait(),
            stats: config.collect_statistics.then(RunningStats::new),
            config,
            strategy: None,
            injected: false,
            running: false,
            last_tick: None,
            last_elapsed: Duration::ZERO,
            last_erosion: Duration::ZERO,
            cycles: 0,
        })
    }

    /// Create a waiter with default settings for the given period and maximum wait.
    ///
    /// # Errors
    ///
    /// Returns [`WaiterError::InvalidConfiguration`] for a zero period or
    /// maximum wait, or a maximum wait shorter than the period.
    pub fn with_period(period: Duration, max_wait: Duration) -> WaiterResult<Self> {
        Self::new(WaiterConfig::new(period, max_wait))
    }

    /// Create a waiter driven by a caller-supplied timing strategy.
    ///
    /// The strategy replaces the configured selection and is kept across
    /// `stop`/`start` cycles.
    ///
    /// # Errors
    ///
    /// Returns [`WaiterError::InvalidConfiguration`] if the configuration is invalid.
    pub fn with_strategy(
        config: WaiterConfig,
        strategy: Box<dyn TimingStrategy>,
    ) -> WaiterResult<Self> {
        let mut waiter = Self::new(config)?;
        waiter.strategy = Some(strategy);
        waiter.injected = true;
        Ok(waiter)
    }

    /// Move the calling thread to a real-time scheduling policy.
    ///
    /// Call before `start`: with [`StrategySelection::Auto`](crate::StrategySelection::Auto)
    /// a real-time thread gets the deadline strategy.
    ///
    /// # Errors
    ///
    /// Returns [`WaiterError::SchedulingUnavailable`] if the platform or
    /// the OS refuses. The waiter stays usable in signal mode.
    pub fn enable_elevated_scheduling(&self, setup: &RtSetup) -> WaiterResult<()> {
        rt_setup::enable_elevated_scheduling(setup)
    }

    /// Arm the timing resource and capture the reference time.
    ///
    /// Calling `start` on a running waiter is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`WaiterError::StrategyUnavailable`] if the requested strategy
    /// is unsupported, or [`WaiterError::Os`] if arming fails. The waiter is
    /// left unstarted.
    pub fn start(&mut self) -> WaiterResult<()> {
        if self.running {
            return Ok(());
        }

        let mut strategy = match self.strategy.take() {
            Some(strategy) => strategy,
            None => strategy::create(
                strategy::resolve(self.config.strategy),
                self.period,
                self.max_wait,
            )?,
        };

        self.last_tick = Some(Instant::now());
        let armed = strategy.arm();
        let kind = strategy.kind();
        if self.injected || armed.is_ok() {
            self.strategy = Some(strategy);
        }
        if let Err(err) = armed {
            self.last_tick = None;
            return Err(err);
        }

        self.running = true;
        tracing::debug!(
            strategy = %kind,
            period = ?self.period,
            max_wait = ?self.max_wait,
            statistics = self.stats.is_some(),
            "Periodic waiter started"
        );
        Ok(())
    }

    /// Block until the next tick and classify the cycle.
    ///
    /// The measured cycle time (available through [`last_elapsed`](Self::last_elapsed))
    /// spans from the previous tick, or from `start`, to the wake-up. Only
    /// [`WaitStatus::Ok`] cycles feed the statistics.
    ///
    /// # Errors
    ///
    /// Returns [`WaiterError::NotStarted`] before `start` (without side
    /// effects), or [`WaiterError::Os`] if the sleep call itself fails.
    pub fn wait(&mut self) -> WaiterResult<WaitStatus> {
        let (Some(strategy), Some(last_tick)) = (self.strategy.as_mut(), self.last_tick) else {
            return Err(WaiterError::NotStarted);
        };
        if !self.running {
            return Err(WaiterError::NotStarted);
        }

        let sleep_start = self.stats.is_some().then(Instant::now);
        let outcome = strategy.sleep()?;
        let now = Instant::now();

        let raw_elapsed = now.saturating_duration_since(last_tick);
        let elapsed = self.config.resolution.truncate(raw_elapsed);

        let mut status = match outcome {
            SleepOutcome::Completed => WaitStatus::Ok,
            SleepOutcome::SignalLate => WaitStatus::SignalLate,
            SleepOutcome::Interrupted => WaitStatus::Interrupted,
        };
        if elapsed > self.max_wait {
            status = WaitStatus::MaxWaitExceeded;
        }

        self.cycles = self.cycles.saturating_add(1);
        self.last_elapsed = elapsed;

        if let (Some(stats), Some(sleep_start)) = (self.stats.as_mut(), sleep_start) {
            let slept = now.saturating_duration_since(sleep_start);
            let erosion = self
                .config
                .resolution
                .truncate(raw_elapsed.saturating_sub(slept));
            self.last_erosion = erosion;

            let warmed_up = self.cycles > u64::from(self.config.warmup_cycles);
            if status.is_ok() && warmed_up {
                let resolution = self.config.resolution;
                stats.record(resolution.to_units(elapsed), resolution.to_units(erosion));
            }
        }

        self.last_tick = Some(now);

        if !status.is_ok() {
            tracing::warn!(
                cycle = self.cycles,
                status = %status,
                elapsed = ?elapsed,
                max_wait = ?self.max_wait,
                "Periodic waiter cycle missed its timing"
            );
        }

        Ok(status)
    }

    /// Block until the next tick, turning every anomalous cycle into an error.
    ///
    /// # Returns
    ///
    /// The measured cycle time on a normal cycle.
    ///
    /// # Errors
    ///
    /// Everything [`wait`](Self::wait) returns, plus
    /// [`WaiterError::SignalLate`], [`WaiterError::MaxWaitExceeded`] and
    /// [`WaiterError::Interrupted`] carrying the measured values. The waiter
    /// keeps running after these.
    pub fn wait_checked(&mut self) -> WaiterResult<Duration> {
        match self.wait()? {
            WaitStatus::Ok => Ok(self.last_elapsed),
            WaitStatus::SignalLate => Err(WaiterError::SignalLate {
                max_wait: self.max_wait,
            }),
            WaitStatus::MaxWaitExceeded => Err(WaiterError::MaxWaitExceeded {
                elapsed: self.last_elapsed,
                max_wait: self.max_wait,
            }),
            WaitStatus::Interrupted => Err(WaiterError::Interrupted {
                elapsed: self.last_elapsed,
            }),
        }
    }

    /// Disarm the timing resource and reset all cycle state.
    ///
    /// Idempotent; also called on drop. A `wait` blocked on another thread is
    /// not woken.
    pub fn stop(&mut self) {
        if let Some(strategy) = self.strategy.as_mut() {
            strategy.disarm();
        }
        if !self.injected {
            self.strategy = None;
        }

        let was_running = self.running;
        self.running = false;
        self.last_tick = None;
        self.last_elapsed = Duration::ZERO;
        self.last_erosion = Duration::ZERO;
        let cycles = std::mem::take(&mut self.cycles);
        if let Some(stats) = self.stats.as_mut() {
            stats.reset();
        }

        if was_running {
            tracing::debug!(cycles, "Periodic waiter stopped");
        }
    }

    /// Running statistics of accepted cycles.
    ///
    /// # Errors
    ///
    /// Returns [`WaiterError::StatisticsDisabled`] if the waiter was built
    /// without statistics.
    pub fn statistics(&self) -> WaiterResult<Statistics> {
        self.stats
            .as_ref()
            .map(RunningStats::snapshot)
            .ok_or(WaiterError::StatisticsDisabled)
    }

    /// Measured time of the most recent cycle.
    #[inline]
    pub fn last_elapsed(&self) -> Duration {
        self.last_elapsed
    }

    /// Time the most recent cycle spent outside the sleep.
    ///
    /// Only measured when statistics are enabled; zero otherwise.
    #[inline]
    pub fn last_time_erosion(&self) -> Duration {
        self.last_erosion
    }

    /// Completed waits since `start`, including anomalous ones.
    #[inline]
    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    /// Whether the waiter has been started and not stopped.
    #[inline]
    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Configured period.
    #[inline]
    pub fn period(&self) -> Duration {
        self.period
    }

    /// Configured maximum wait.
    #[inline]
    pub fn max_wait(&self) -> Duration {
        self.max_wait
    }

    /// Configuration the waiter was built with.
    #[inline]
    pub fn config(&self) -> &WaiterConfig {
        &self.config
    }

    /// Strategy armed by the last `start`, while running.
    pub fn active_strategy(&self) -> Option<StrategyKind> {
        if !self.running {
            return None;
        }
        self.strategy.as_ref().map(|s| s.kind())
    }
}

impl fmt::Display for PeriodicWaiter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Period: {:?}", self.period)?;
        writeln!(f, "Max wait: {:?}", self.max_wait)
    }
}

impl fmt::Debug for PeriodicWaiter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PeriodicWaiter")
            .field("period", &self.period)
            .field("max_wait", &self.max_wait)
            .field("strategy", &self.strategy.as_ref().map(|s| s.kind()))
            .field("running", &self.running)
            .field("cycles", &self.cycles)
            .field("last_elapsed", &self.last_elapsed)
            .finish_non_exhaustive()
    }
}

impl Drop for PeriodicWaiter {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Resolution;
    use std::cell::Cell;
    use std::collections::VecDeque;
    use std::rc::Rc;

    type TestResult = Result<(), Box<dyn std::error::Error>>;

    /// Strategy that replays scripted outcomes after a fixed nap.
    struct ScriptedStrategy {
        nap: Duration,
        outcomes: VecDeque<SleepOutcome>,
        armed: Rc<Cell<u32>>,
        disarmed: Rc<Cell<u32>>,
    }

    impl ScriptedStrategy {
        fn new(nap: Duration, outcomes: &[SleepOutcome]) -> Self {
            Self {
                nap,
                outcomes: outcomes.iter().copied().collect(),
                armed: Rc::new(Cell::new(0)),
                disarmed: Rc::new(Cell::new(0)),
            }
        }
    }

    impl TimingStrategy for ScriptedStrategy {
        fn kind(&self) -> StrategyKind {
            StrategyKind::Deadline
        }

        fn arm(&mut self) -> WaiterResult<()> {
            self.armed.set(self.armed.get() + 1);
            Ok(())
        }

        fn sleep(&mut self) -> WaiterResult<SleepOutcome> {
            std::thread::sleep(self.nap);
            Ok(self.outcomes.pop_front().unwrap_or(SleepOutcome::Completed))
        }

        fn disarm(&mut self) {
            self.disarmed.set(self.disarmed.get() + 1);
        }
    }

    fn config(period_ms: u64, max_wait_ms: u64) -> WaiterConfig {
        WaiterConfig::builder()
            .period(Duration::from_millis(period_ms))
            .max_wait(Duration::from_millis(max_wait_ms))
            .collect_statistics(true)
            .resolution(Resolution::Microseconds)
            .build()
            .unwrap_or_default()
    }

    fn scripted(
        period_ms: u64,
        max_wait_ms: u64,
        nap: Duration,
        outcomes: &[SleepOutcome],
    ) -> WaiterResult<PeriodicWaiter> {
        PeriodicWaiter::with_strategy(
            config(period_ms, max_wait_ms),
            Box::new(ScriptedStrategy::new(nap, outcomes)),
        )
    }

    #[test]
    fn test_invalid_configuration_fails_fast() {
        let result = PeriodicWaiter::with_period(Duration::from_millis(10), Duration::from_millis(5));
        assert!(matches!(result, Err(WaiterError::InvalidConfiguration(_))));
    }

    #[test]
    fn test_wait_before_start_has_no_side_effects() -> TestResult {
        let mut waiter = scripted(5, 50, Duration::from_millis(1), &[])?;

        assert!(matches!(waiter.wait(), Err(WaiterError::NotStarted)));
        assert!(matches!(waiter.wait_checked(), Err(WaiterError::NotStarted)));
        assert_eq!(waiter.cycles(), 0);
        assert_eq!(waiter.last_elapsed(), Duration::ZERO);
        assert_eq!(waiter.statistics()?.count, 0);
        assert!(!waiter.is_running());
        Ok(())
    }

    #[test]
    fn test_normal_cycles_feed_statistics() -> TestResult {
        let mut waiter = scripted(1, 200, Duration::from_millis(2), &[])?;
        waiter.start()?;

        for _ in 0..5 {
            assert_eq!(waiter.wait()?, WaitStatus::Ok);
        }

        let stats = waiter.statistics()?;
        assert_eq!(stats.count, 5);
        assert_eq!(waiter.cycles(), 5);
        assert!(stats.min <= stats.mean + 1e-9);
        assert!(stats.mean <= stats.max + 1e-9);
        assert!(stats.min >= 2_000.0, "min {} us", stats.min);
        Ok(())
    }

    #[test]
    fn test_signal_late_is_reported_and_not_sampled() -> TestResult {
        let mut waiter = scripted(
            1,
            200,
            Duration::from_millis(1),
            &[SleepOutcome::SignalLate, SleepOutcome::Completed],
        )?;
        waiter.start()?;

        assert_eq!(waiter.wait()?, WaitStatus::SignalLate);
        assert_eq!(waiter.statistics()?.count, 0);
        assert_eq!(waiter.wait()?, WaitStatus::Ok);
        assert_eq!(waiter.statistics()?.count, 1);
        assert_eq!(waiter.cycles(), 2);
        Ok(())
    }

    #[test]
    fn test_interrupted_is_reported() -> TestResult {
        let mut waiter = scripted(1, 200, Duration::from_millis(1), &[SleepOutcome::Interrupted])?;
        waiter.start()?;
        assert_eq!(waiter.wait()?, WaitStatus::Interrupted);
        assert_eq!(waiter.statistics()?.count, 0);
        Ok(())
    }

    #[test]
    fn test_overrun_overrides_completed_sleep() -> TestResult {
        let mut waiter = scripted(5, 10, Duration::from_millis(20), &[])?;
        waiter.start()?;

        assert_eq!(waiter.wait()?, WaitStatus::MaxWaitExceeded);
        assert!(waiter.last_elapsed() > Duration::from_millis(10));
        assert_eq!(waiter.statistics()?.count, 0);
        Ok(())
    }

    #[test]
    fn test_overrun_overrides_signal_late() -> TestResult {
        let mut waiter = scripted(5, 10, Duration::from_millis(20), &[SleepOutcome::SignalLate])?;
        waiter.start()?;
        assert_eq!(waiter.wait()?, WaitStatus::MaxWaitExceeded);
        Ok(())
    }

    #[test]
    fn test_wait_checked_carries_measurements() -> TestResult {
        let mut waiter = scripted(5, 10, Duration::from_millis(20), &[])?;
        waiter.start()?;

        match waiter.wait_checked() {
            Err(WaiterError::MaxWaitExceeded { elapsed, max_wait }) => {
                assert_eq!(max_wait, Duration::from_millis(10));
                assert!(elapsed > max_wait);
            }
            other => return Err(format!("unexpected result: {other:?}").into()),
        }
        assert!(waiter.is_running());
        Ok(())
    }

    #[test]
    fn test_wait_checked_maps_signal_late_and_interrupted() -> TestResult {
        let mut waiter = scripted(
            1,
            200,
            Duration::from_millis(1),
            &[SleepOutcome::SignalLate, SleepOutcome::Interrupted],
        )?;
        waiter.start()?;

        assert!(matches!(
            waiter.wait_checked(),
            Err(WaiterError::SignalLate { .. })
        ));
        assert!(matches!(
            waiter.wait_checked(),
            Err(WaiterError::Interrupted { .. })
        ));
        let elapsed = waiter.wait_checked()?;
        assert_eq!(elapsed, waiter.last_elapsed());
        Ok(())
    }

    #[test]
    fn test_statistics_disabled() -> TestResult {
        let waiter = PeriodicWaiter::with_period(Duration::from_millis(1), Duration::from_millis(2))?;
        assert!(matches!(
            waiter.statistics(),
            Err(WaiterError::StatisticsDisabled)
        ));
        Ok(())
    }

    #[test]
    fn test_erosion_not_measured_without_statistics() -> TestResult {
        let config = WaiterConfig::new(Duration::from_millis(1), Duration::from_millis(200));
        let mut waiter = PeriodicWaiter::with_strategy(
            config,
            Box::new(ScriptedStrategy::new(Duration::from_millis(1), &[])),
        )?;
        waiter.start()?;
        waiter.wait()?;
        assert_eq!(waiter.last_time_erosion(), Duration::ZERO);
        Ok(())
    }

    #[test]
    fn test_warmup_cycles_are_not_sampled() -> TestResult {
        let config = WaiterConfig {
            warmup_cycles: 2,
            ..config(1, 200)
        };
        let mut waiter = PeriodicWaiter::with_strategy(
            config,
            Box::new(ScriptedStrategy::new(Duration::from_millis(1), &[])),
        )?;
        waiter.start()?;

        for _ in 0..5 {
            waiter.wait()?;
        }
        assert_eq!(waiter.statistics()?.count, 3);
        Ok(())
    }

    #[test]
    fn test_stop_resets_state_and_is_idempotent() -> TestResult {
        let strategy = ScriptedStrategy::new(Duration::from_millis(1), &[]);
        let disarmed = Rc::clone(&strategy.disarmed);
        let mut waiter = PeriodicWaiter::with_strategy(config(1, 200), Box::new(strategy))?;

        waiter.start()?;
        waiter.wait()?;
        waiter.wait()?;
        waiter.stop();

        let stats = waiter.statistics()?;
        assert_eq!(stats.count, 0);
        assert!(stats.min.is_infinite());
        assert!(stats.max.abs() < f64::EPSILON);
        assert!(stats.mean.abs() < f64::EPSILON);
        assert!(stats.standard_deviation.abs() < f64::EPSILON);
        assert_eq!(waiter.cycles(), 0);
        assert_eq!(waiter.last_elapsed(), Duration::ZERO);
        assert!(!waiter.is_running());
        assert!(matches!(waiter.wait(), Err(WaiterError::NotStarted)));

        waiter.stop();
        assert!(!waiter.is_running());
        assert!(disarmed.get() >= 1);
        Ok(())
    }

    #[test]
    fn test_restart_rearms_injected_strategy() -> TestResult {
        let strategy = ScriptedStrategy::new(Duration::from_millis(1), &[]);
        let armed = Rc::clone(&strategy.armed);
        let mut waiter = PeriodicWaiter::with_strategy(config(1, 200), Box::new(strategy))?;

        waiter.start()?;
        waiter.start()?;
        assert_eq!(armed.get(), 1);

        waiter.stop();
        waiter.start()?;
        assert_eq!(armed.get(), 2);
        assert_eq!(waiter.wait()?, WaitStatus::Ok);
        assert_eq!(waiter.statistics()?.count, 1);
        Ok(())
    }

    #[test]
    fn test_drop_disarms() -> TestResult {
        let strategy = ScriptedStrategy::new(Duration::from_millis(1), &[]);
        let disarmed = Rc::clone(&strategy.disarmed);
        {
            let mut waiter = PeriodicWaiter::with_strategy(config(1, 200), Box::new(strategy))?;
            waiter.start()?;
        }
        assert_eq!(disarmed.get(), 1);
        Ok(())
    }

    #[test]
    fn test_active_strategy_only_while_running() -> TestResult {
        let mut waiter = scripted(1, 200, Duration::from_millis(1), &[])?;
        assert_eq!(waiter.active_strategy(), None);
        waiter.start()?;
        assert_eq!(waiter.active_strategy(), Some(StrategyKind::Deadline));
        waiter.stop();
        assert_eq!(waiter.active_strategy(), None);
        Ok(())
    }

    #[test]
    fn test_display_describes_configuration() -> TestResult {
        let waiter = PeriodicWaiter::with_period(Duration::from_millis(100), Duration::from_millis(110))?;
        let text = waiter.to_string();
        assert!(text.contains("Period: 100ms"), "{text}");
        assert!(text.contains("Max wait: 110ms"), "{text}");
        Ok(())
    }
}
