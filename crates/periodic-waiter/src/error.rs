//! Error types for the periodic waiter.
//!
//! Timing violations carry the measured values so the raising wait variant
//! can report them without further lookups.

use std::io;
use std::time::Duration;

use thiserror::Error;

use crate::strategy::StrategyKind;

/// Errors produced by [`PeriodicWaiter`](crate::PeriodicWaiter) operations.
#[derive(Debug, Error)]
pub enum WaiterError {
    /// `wait` was called before `start`.
    #[error("Waiter not started")]
    NotStarted,

    /// Period or maximum wait rejected at construction.
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// The periodic notification did not interrupt the bounded sleep.
    #[error("Periodic signal was late: no notification within {max_wait:?}")]
    SignalLate {
        /// Configured maximum wait the sleep ran for.
        max_wait: Duration,
    },

    /// Measured cycle time exceeded the configured maximum wait.
    #[error("Cycle time {elapsed:?} exceeded maximum wait {max_wait:?}")]
    MaxWaitExceeded {
        /// Measured cycle time.
        elapsed: Duration,
        /// Configured maximum wait.
        max_wait: Duration,
    },

    /// Absolute sleep was cut short by an unrelated signal.
    #[error("Deadline sleep interrupted by signal after {elapsed:?}")]
    Interrupted {
        /// Measured cycle time at interruption.
        elapsed: Duration,
    },

    /// Real-time scheduling could not be enabled.
    #[error("Real-time scheduling unavailable: {0}")]
    SchedulingUnavailable(String),

    /// Statistics were requested from a waiter built without them.
    #[error("Statistics not enabled")]
    StatisticsDisabled,

    /// The requested timing strategy is not supported on this platform.
    #[error("Timing strategy {0} is not available on this platform")]
    StrategyUnavailable(StrategyKind),

    /// An underlying OS call failed.
    #[error("{operation} failed: {source}")]
    Os {
        /// Name of the failing call.
        operation: &'static str,
        /// OS error reported by the call.
        #[source]
        source: io::Error,
    },
}

impl WaiterError {
    /// Create an invalid configuration error.
    #[must_use]
    pub fn invalid_configuration(msg: impl Into<String>) -> Self {
        WaiterError::InvalidConfiguration(msg.into())
    }

    /// Create a scheduling unavailable error.
    #[must_use]
    pub fn scheduling_unavailable(msg: impl Into<String>) -> Self {
        WaiterError::SchedulingUnavailable(msg.into())
    }

    /// Wrap the calling thread's last OS error.
    #[must_use]
    pub fn last_os_error(operation: &'static str) -> Self {
        WaiterError::Os {
            operation,
            source: io::Error::last_os_error(),
        }
    }

    /// Wrap an error number returned directly by a call.
    #[must_use]
    pub fn from_errno(operation: &'static str, errno: i32) -> Self {
        WaiterError::Os {
            operation,
            source: io::Error::from_raw_os_error(errno),
        }
    }

    /// Whether this error reports a cycle that missed its timing contract.
    ///
    /// Timing violations leave the waiter running; the caller decides
    /// whether to keep cycling.
    #[must_use]
    pub fn is_timing_violation(&self) -> bool {
        matches!(
            self,
            WaiterError::SignalLate { .. }
                | WaiterError::MaxWaitExceeded { .. }
                | WaiterError::Interrupted { .. }
        )
    }
}

/// Result type for waiter operations.
pub type WaiterResult<T = ()> = Result<T, WaiterError>;
