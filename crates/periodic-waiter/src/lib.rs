//! Fixed-period precision wait primitive for control loops.
//!
//! A [`PeriodicWaiter`] blocks the calling thread until the next tick of a
//! fixed-period schedule and reports when the loop fails to keep pace. It
//! targets sensor polling, actuator control and soft real-time sampling.
//!
//! - **Deadline strategy**: absolute `clock_nanosleep` to a deadline that
//!   advances by exactly one period per cycle, so latency never accumulates
//! - **Signal strategy**: a periodic interval timer whose signal interrupts a
//!   sleep bounded by the maximum wait; a sleep that runs out is reported as
//!   a late signal
//! - **Overrun detection**: every cycle longer than the maximum wait is
//!   flagged, whatever the strategy
//! - **Running statistics**: count, min, max, mean, standard deviation and
//!   time erosion computed online without storing samples
//! - **RtSetup**: optional real-time scheduling for the calling thread
//!
//! # RT-Safety Guarantees
//!
//! - **No heap allocations** in `wait` after `start`
//! - **One blocking call** per `wait`, inside the strategy sleep
//! - **O(1)** statistics update per cycle
//!
//! # Example
//!
//! ```no_run
//! use periodic_waiter::{PeriodicWaiter, RtSetup, WaitStatus};
//! use std::time::Duration;
//!
//! let mut waiter = PeriodicWaiter::with_period(
//!     Duration::from_millis(1),
//!     Duration::from_micros(1_500),
//! )
//! .expect("valid period");
//!
//! // Falls back to the signal strategy without real-time privileges.
//! if let Err(e) = waiter.enable_elevated_scheduling(&RtSetup::default()) {
//!     eprintln!("{e}");
//! }
//! waiter.start().expect("timer armed");
//!
//! loop {
//!     match waiter.wait().expect("sleep failed") {
//!         WaitStatus::Ok => { /* periodic work */ }
//!         status => eprintln!("cycle {}: {status}", waiter.cycles()),
//!     }
//! }
//! ```

#![deny(unsafe_op_in_unsafe_fn)]
#![deny(clippy::unwrap_used)]
#![deny(static_mut_refs)]
#![deny(unused_must_use)]

pub mod config;
pub mod error;
pub mod rt_setup;
pub mod stats;
pub mod strategy;
pub mod waiter;

#[cfg(target_os = "linux")]
mod linux;

#[cfg(not(target_os = "linux"))]
mod fallback;

pub mod prelude;

pub use config::{MAX_INTERVAL, Resolution, StrategySelection, WaiterConfig, WaiterConfigBuilder};
pub use error::{WaiterError, WaiterResult};
pub use rt_setup::{RtPolicy, RtSetup};
pub use stats::{RunningStats, Statistics};
pub use strategy::{SleepOutcome, StrategyKind, TimingStrategy};
pub use waiter::{PeriodicWaiter, WaitStatus};
