//! Fallback platform implementation for non-Linux systems.
//!
//! Only the deadline strategy is available, driven by `std::thread::sleep`
//! towards an [`Instant`] deadline. Real-time scheduling is unsupported.

use std::time::{Duration, Instant};

use crate::error::{WaiterError, WaiterResult};
use crate::rt_setup::RtSetup;
use crate::strategy::{SleepOutcome, StrategyKind, TimingStrategy};

pub(crate) const SIGNAL_STRATEGY_AVAILABLE: bool = false;

/// Deadline strategy using the standard library sleep.
pub(crate) struct DeadlineClock {
    period: Duration,
    next_deadline: Instant,
}

impl DeadlineClock {
    pub(crate) fn new(period: Duration) -> Self {
        Self {
            period,
            next_deadline: Instant::now(),
        }
    }
}

impl TimingStrategy for DeadlineClock {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Deadline
    }

    fn arm(&mut self) -> WaiterResult<()> {
        self.next_deadline = Instant::now() + self.period;
        Ok(())
    }

    fn sleep(&mut self) -> WaiterResult<SleepOutcome> {
        let remaining = self.next_deadline.saturating_duration_since(Instant::now());
        if !remaining.is_zero() {
            std::thread::sleep(remaining);
        }
        self.next_deadline += self.period;
        Ok(SleepOutcome::Completed)
    }

    fn disarm(&mut self) {}
}

pub(crate) fn interval_signal(
    _period: Duration,
    _max_wait: Duration,
) -> Option<Box<dyn TimingStrategy>> {
    None
}

pub(crate) fn enable_elevated_scheduling(_setup: &RtSetup) -> WaiterResult<()> {
    Err(WaiterError::scheduling_unavailable(
        "no real-time scheduling policy on this platform",
    ))
}

pub(crate) fn is_realtime_scheduled() -> bool {
    false
}
