//! Prelude module for common waiter types.
//!
//! This module provides a convenient way to import the most commonly used
//! types from the waiter crate.

pub use crate::config::{Resolution, StrategySelection, WaiterConfig};
pub use crate::error::{WaiterError, WaiterResult};
pub use crate::rt_setup::{RtPolicy, RtSetup};
pub use crate::stats::Statistics;
pub use crate::strategy::{StrategyKind, TimingStrategy};
pub use crate::waiter::{PeriodicWaiter, WaitStatus};
