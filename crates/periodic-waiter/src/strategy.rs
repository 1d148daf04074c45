//! Timing strategies.
//!
//! A strategy owns the OS timing resource behind a waiter and performs the
//! single blocking sleep of each cycle. Two strategies are built in:
//!
//! - **Deadline**: sleeps to an absolute deadline that advances by exactly
//!   one period per cycle, so scheduling latency never accumulates.
//! - **Signal**: arms a periodic interval timer and sleeps for at most
//!   `max_wait`, expecting the timer's signal to cut the sleep short.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

use crate::config::StrategySelection;
use crate::error::{WaiterError, WaiterResult};

#[cfg(target_os = "linux")]
use crate::linux as platform;

#[cfg(not(target_os = "linux"))]
use crate::fallback as platform;

/// Concrete timing strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StrategyKind {
    /// Absolute-deadline sleep.
    Deadline,
    /// Relative sleep interrupted by a periodic signal.
    Signal,
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StrategyKind::Deadline => write!(f, "deadline"),
            StrategyKind::Signal => write!(f, "signal"),
        }
    }
}

/// How a single strategy sleep ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SleepOutcome {
    /// Woke at the tick: deadline reached, or periodic signal received.
    Completed,
    /// The bounded sleep ran to completion without the periodic signal.
    SignalLate,
    /// The deadline sleep was interrupted by an unrelated signal.
    Interrupted,
}

/// Timing resource driving a [`PeriodicWaiter`](crate::PeriodicWaiter).
///
/// The waiter calls `arm` once per `start`, `sleep` once per `wait`, and
/// `disarm` on `stop` or drop. `disarm` must be safe to call repeatedly.
pub trait TimingStrategy {
    /// Strategy kind.
    fn kind(&self) -> StrategyKind;

    /// Acquire and arm the timing resource. The first tick is one period away.
    ///
    /// # Errors
    ///
    /// Returns an error if the OS refuses to arm the resource.
    fn arm(&mut self) -> WaiterResult<()>;

    /// Block until the next tick.
    ///
    /// # Errors
    ///
    /// Returns an error only for OS failures; late or interrupted sleeps are
    /// reported through [`SleepOutcome`].
    fn sleep(&mut self) -> WaiterResult<SleepOutcome>;

    /// Release the timing resource.
    fn disarm(&mut self);
}

/// Whether the signal strategy is supported on this platform.
#[must_use]
pub fn signal_strategy_available() -> bool {
    platform::SIGNAL_STRATEGY_AVAILABLE
}

/// Resolve a strategy request for the calling thread.
///
/// `Auto` picks the deadline strategy when the thread already runs under a
/// real-time policy, or when the signal strategy is unsupported.
#[must_use]
pub fn resolve(selection: StrategySelection) -> StrategyKind {
    match selection {
        StrategySelection::Deadline => StrategyKind::Deadline,
        StrategySelection::Signal => StrategyKind::Signal,
        StrategySelection::Auto => {
            if platform::is_realtime_scheduled() || !signal_strategy_available() {
                StrategyKind::Deadline
            } else {
                StrategyKind::Signal
            }
        }
    }
}

/// Build a built-in strategy.
///
/// # Errors
///
/// Returns [`WaiterError::StrategyUnavailable`] when `kind` is not supported
/// on this platform.
pub fn create(
    kind: StrategyKind,
    period: Duration,
    max_wait: Duration,
) -> WaiterResult<Box<dyn TimingStrategy>> {
    match kind {
        StrategyKind::Deadline => Ok(Box::new(platform::DeadlineClock::new(period))),
        StrategyKind::Signal => platform::interval_signal(period, max_wait)
            .ok_or(WaiterError::StrategyUnavailable(StrategyKind::Signal)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_explicit_selection_is_honoured() {
        assert_eq!(resolve(StrategySelection::Deadline), StrategyKind::Deadline);
        assert_eq!(resolve(StrategySelection::Signal), StrategyKind::Signal);
    }

    #[test]
    fn test_auto_without_signal_support_is_deadline() {
        if !signal_strategy_available() {
            assert_eq!(resolve(StrategySelection::Auto), StrategyKind::Deadline);
        }
    }

    #[test]
    fn test_create_reports_kind() -> WaiterResult<()> {
        let period = Duration::from_millis(5);
        let deadline = create(StrategyKind::Deadline, period, period)?;
        assert_eq!(deadline.kind(), StrategyKind::Deadline);

        match create(StrategyKind::Signal, period, period) {
            Ok(signal) => assert_eq!(signal.kind(), StrategyKind::Signal),
            Err(err) => assert!(matches!(
                err,
                WaiterError::StrategyUnavailable(StrategyKind::Signal)
            )),
        }
        Ok(())
    }

    #[test]
    fn test_deadline_strategy_sleeps_about_one_period() -> WaiterResult<()> {
        let period = Duration::from_millis(10);
        let mut strategy = create(StrategyKind::Deadline, period, period)?;
        strategy.arm()?;

        let start = std::time::Instant::now();
        let outcome = strategy.sleep()?;
        let slept = start.elapsed();
        strategy.disarm();

        assert_eq!(outcome, SleepOutcome::Completed);
        assert!(slept >= Duration::from_millis(8), "slept {slept:?}");
        Ok(())
    }
}
