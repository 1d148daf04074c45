//! Real-time scheduling setup.

use serde::{Deserialize, Serialize};

use crate::error::WaiterResult;

#[cfg(target_os = "linux")]
use crate::linux as platform;

#[cfg(not(target_os = "linux"))]
use crate::fallback as platform;

/// Fixed-priority real-time scheduling policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RtPolicy {
    /// First-in first-out (`SCHED_FIFO`).
    #[default]
    Fifo,
    /// Round-robin (`SCHED_RR`).
    RoundRobin,
}

/// Real-time setup applied to the calling thread.
///
/// On Linux the thread is moved to `policy` at `priority` (clamped to the
/// policy's valid range). This usually requires `CAP_SYS_NICE` or a suitable
/// `RLIMIT_RTPRIO`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RtSetup {
    /// Scheduling policy.
    pub policy: RtPolicy,

    /// Static priority within the policy.
    pub priority: i32,

    /// Lock all current and future pages to avoid page faults in the loop.
    pub lock_memory: bool,
}

impl Default for RtSetup {
    fn default() -> Self {
        Self {
            policy: RtPolicy::Fifo,
            priority: 1,
            lock_memory: false,
        }
    }
}

impl RtSetup {
    /// Create a new RtSetup with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the scheduling policy.
    pub fn with_policy(mut self, policy: RtPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Set the priority.
    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// Set memory locking.
    pub fn with_lock_memory(mut self, enabled: bool) -> Self {
        self.lock_memory = enabled;
        self
    }
}

/// Move the calling thread to a real-time scheduling policy.
///
/// # Errors
///
/// Returns [`WaiterError::SchedulingUnavailable`](crate::WaiterError::SchedulingUnavailable)
/// if the platform has no real-time policies or the OS rejects the request.
pub fn enable_elevated_scheduling(setup: &RtSetup) -> WaiterResult<()> {
    platform::enable_elevated_scheduling(setup)?;
    tracing::info!(
        policy = ?setup.policy,
        priority = setup.priority,
        lock_memory = setup.lock_memory,
        "Elevated scheduling enabled"
    );
    Ok(())
}

/// Whether the calling thread runs under a real-time policy.
#[must_use]
pub fn is_realtime_scheduled() -> bool {
    platform::is_realtime_scheduled()
}
