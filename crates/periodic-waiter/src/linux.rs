//! Linux-specific platform implementation.
//!
//! Both strategies run on `CLOCK_MONOTONIC`, the same clock that backs
//! [`std::time::Instant`], so deadlines and measured cycle times agree.

#![expect(unsafe_code, reason = "libc clock, timer, signal and scheduler calls")]

use std::io;
use std::mem;
use std::ptr;
use std::time::Duration;

use libc::{
    CLOCK_MONOTONIC, EINTR, MCL_CURRENT, MCL_FUTURE, SA_RESTART, SCHED_FIFO, SCHED_RR, SIG_BLOCK,
    SIG_UNBLOCK, SIGALRM, SIGEV_THREAD_ID, TIMER_ABSTIME, c_int, c_long, itimerspec, sched_param, sigevent, sigset_t,
    time_t, timer_t, timespec,
};
use parking_lot::Mutex;

use crate::error::{WaiterError, WaiterResult};
use crate::rt_setup::{RtPolicy, RtSetup};
use crate::strategy::{SleepOutcome, StrategyKind, TimingStrategy};

pub(crate) const SIGNAL_STRATEGY_AVAILABLE: bool = true;

const NANOS_PER_SEC: c_long = 1_000_000_000;

fn to_timespec(d: Duration) -> timespec {
    timespec {
        tv_sec: d.as_secs() as time_t,
        tv_nsec: d.subsec_nanos() as c_long,
    }
}

/// Advance a normalized timespec by `d`.
fn timespec_add(ts: &mut timespec, d: Duration) {
    ts.tv_sec += d.as_secs() as time_t;
    ts.tv_nsec += d.subsec_nanos() as c_long;
    if ts.tv_nsec >= NANOS_PER_SEC {
        ts.tv_nsec -= NANOS_PER_SEC;
        ts.tv_sec += 1;
    }
}

fn monotonic_now() -> WaiterResult<timespec> {
    let mut ts = timespec {
        tv_sec: 0,
        tv_nsec: 0,
    };
    // SAFETY: `ts` is a valid, writable timespec.
    let rc = unsafe { libc::clock_gettime(CLOCK_MONOTONIC, &mut ts) };
    if rc != 0 {
        return Err(WaiterError::last_os_error("clock_gettime"));
    }
    Ok(ts)
}

/// Absolute-deadline strategy on `clock_nanosleep(TIMER_ABSTIME)`.
pub(crate) struct DeadlineClock {
    period: Duration,
    next_deadline: timespec,
}

impl DeadlineClock {
    pub(crate) fn new(period: Duration) -> Self {
        Self {
            period,
            next_deadline: timespec {
                tv_sec: 0,
                tv_nsec: 0,
            },
        }
    }
}

impl TimingStrategy for DeadlineClock {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Deadline
    }

    fn arm(&mut self) -> WaiterResult<()> {
        let mut deadline = monotonic_now()?;
        timespec_add(&mut deadline, self.period);
        self.next_deadline = deadline;
        Ok(())
    }

    fn sleep(&mut self) -> WaiterResult<SleepOutcome> {
        // SAFETY: `next_deadline` is a normalized timespec; with TIMER_ABSTIME
        // no remainder is written, so the null pointer is allowed.
        let rc = unsafe {
            libc::clock_nanosleep(
                CLOCK_MONOTONIC,
                TIMER_ABSTIME,
                &self.next_deadline,
                ptr::null_mut(),
            )
        };

        // Fixed cadence: advance from the previous deadline, never from now.
        timespec_add(&mut self.next_deadline, self.period);

        match rc {
            0 => Ok(SleepOutcome::Completed),
            EINTR => Ok(SleepOutcome::Interrupted),
            errno => Err(WaiterError::from_errno("clock_nanosleep", errno)),
        }
    }

    fn disarm(&mut self) {}
}

pub(crate) fn interval_signal(
    period: Duration,
    max_wait: Duration,
) -> Option<Box<dyn TimingStrategy>> {
    Some(Box::new(IntervalSignal::new(period, max_wait)))
}

/// Relative-sleep strategy woken by a per-thread POSIX interval timer.
///
/// The timer delivers `SIGALRM` to the thread that armed it, so the
/// notification always lands on the sleeping thread even in multi-threaded
/// processes. `SIGALRM` is unblocked on that thread while armed; a mask that
/// blocked it before `arm` is restored by `disarm`.
pub(crate) struct IntervalSignal {
    period: Duration,
    max_wait: timespec,
    timer: Option<timer_t>,
    disposition: Option<DispositionGuard>,
    reblock: bool,
}

impl IntervalSignal {
    pub(crate) fn new(period: Duration, max_wait: Duration) -> Self {
        Self {
            period,
            max_wait: to_timespec(max_wait),
            timer: None,
            disposition: None,
            reblock: false,
        }
    }
}

impl TimingStrategy for IntervalSignal {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Signal
    }

    fn arm(&mut self) -> WaiterResult<()> {
        if self.timer.is_some() {
            return Ok(());
        }

        let disposition = DispositionGuard::acquire()?;
        let was_blocked = change_sigalrm_mask(SIG_UNBLOCK)?;

        // SAFETY: sigevent is plain data; all-zero is a valid initial value.
        let mut event: sigevent = unsafe { mem::zeroed() };
        event.sigev_notify = SIGEV_THREAD_ID;
        event.sigev_signo = SIGALRM;
        event.sigev_notify_thread_id = current_thread_id();

        let mut timer: timer_t = ptr::null_mut();
        // SAFETY: `event` and `timer` are live and writable for the call.
        let rc = unsafe { libc::timer_create(CLOCK_MONOTONIC, &mut event, &mut timer) };
        if rc != 0 {
            let err = WaiterError::last_os_error("timer_create");
            restore_sigalrm_mask(was_blocked);
            return Err(err);
        }

        let spec = itimerspec {
            it_interval: to_timespec(self.period),
            it_value: to_timespec(self.period),
        };
        // SAFETY: `timer` was just created; no previous value is requested.
        let rc = unsafe { libc::timer_settime(timer, 0, &spec, ptr::null_mut()) };
        if rc != 0 {
            let err = WaiterError::last_os_error("timer_settime");
            // SAFETY: `timer` is valid and deleted exactly once here.
            unsafe { libc::timer_delete(timer) };
            restore_sigalrm_mask(was_blocked);
            return Err(err);
        }

        self.timer = Some(timer);
        self.disposition = Some(disposition);
        self.reblock = was_blocked;
        Ok(())
    }

    fn sleep(&mut self) -> WaiterResult<SleepOutcome> {
        // SAFETY: `max_wait` is a normalized timespec; no remainder is requested.
        let rc = unsafe { libc::nanosleep(&self.max_wait, ptr::null_mut()) };
        if rc == 0 {
            return Ok(SleepOutcome::SignalLate);
        }

        let err = io::Error::last_os_error();
        if err.raw_os_error() == Some(EINTR) {
            Ok(SleepOutcome::Completed)
        } else {
            Err(WaiterError::Os {
                operation: "nanosleep",
                source: err,
            })
        }
    }

    fn disarm(&mut self) {
        if let Some(timer) = self.timer.take() {
            // SAFETY: `timer` came from timer_create and is deleted exactly once.
            let rc = unsafe { libc::timer_delete(timer) };
            if rc != 0 {
                tracing::warn!(error = %io::Error::last_os_error(), "timer_delete failed");
            }
            restore_sigalrm_mask(mem::take(&mut self.reblock));
        }
        // Restores the signal disposition once the last holder lets go.
        self.disposition = None;
    }
}

impl Drop for IntervalSignal {
    fn drop(&mut self) {
        self.disarm();
    }
}

fn current_thread_id() -> c_int {
    // SAFETY: gettid takes no arguments and cannot fail.
    let tid = unsafe { libc::syscall(libc::SYS_gettid) };
    tid as c_int
}

/// Apply `how` to `SIGALRM` in the calling thread's mask and report whether
/// it was blocked before.
fn change_sigalrm_mask(how: c_int) -> WaiterResult<bool> {
    // SAFETY: sigset_t is plain data; both sets are initialized below.
    let mut set: sigset_t = unsafe { mem::zeroed() };
    // SAFETY: as above.
    let mut old: sigset_t = unsafe { mem::zeroed() };
    // SAFETY: `set` is a valid, writable sigset_t.
    unsafe { libc::sigemptyset(&mut set) };
    // SAFETY: `set` is initialized and SIGALRM is a valid signal number.
    unsafe { libc::sigaddset(&mut set, SIGALRM) };
    // SAFETY: `set` is initialized and `old` is writable.
    let rc = unsafe { libc::pthread_sigmask(how, &set, &mut old) };
    if rc != 0 {
        return Err(WaiterError::from_errno("pthread_sigmask", rc));
    }
    // SAFETY: `old` was filled in by pthread_sigmask.
    Ok(unsafe { libc::sigismember(&old, SIGALRM) } == 1)
}

fn restore_sigalrm_mask(was_blocked: bool) {
    if !was_blocked {
        return;
    }
    if let Err(e) = change_sigalrm_mask(SIG_BLOCK) {
        tracing::warn!(error = %e, "failed to re-block SIGALRM");
    }
}

/// Periodic notification handler. Only its arrival matters: it interrupts
/// the sleeping thread and touches no state.
extern "C" fn on_tick(_signo: c_int) {}

struct Disposition {
    holders: usize,
    previous: Option<libc::sigaction>,
}

static DISPOSITION: Mutex<Disposition> = parking_lot::const_mutex(Disposition {
    holders: 0,
    previous: None,
});

/// Shared hold on the process-wide `SIGALRM` disposition.
///
/// The first holder saves the current disposition and installs [`on_tick`];
/// dropping the last holder restores the saved disposition.
struct DispositionGuard {
    _private: (),
}

impl DispositionGuard {
    fn acquire() -> WaiterResult<Self> {
        let mut state = DISPOSITION.lock();
        if state.holders == 0 {
            // SAFETY: sigaction is plain data; all-zero is a valid initial value.
            let mut action: libc::sigaction = unsafe { mem::zeroed() };
            action.sa_sigaction = on_tick as *const () as libc::sighandler_t;
            // nanosleep fails with EINTR regardless; SA_RESTART keeps the
            // caller's own blocking calls between waits from failing.
            action.sa_flags = SA_RESTART;
            // SAFETY: `sa_mask` is a valid, writable sigset_t.
            unsafe { libc::sigemptyset(&mut action.sa_mask) };

            // SAFETY: sigaction is plain data; all-zero is a valid initial value.
            let mut previous: libc::sigaction = unsafe { mem::zeroed() };
            // SAFETY: both pointers reference live sigaction values.
            let rc = unsafe { libc::sigaction(SIGALRM, &action, &mut previous) };
            if rc != 0 {
                return Err(WaiterError::last_os_error("sigaction"));
            }
            state.previous = Some(previous);
            tracing::debug!("SIGALRM handler installed");
        }
        state.holders += 1;
        Ok(Self { _private: () })
    }
}

impl Drop for DispositionGuard {
    fn drop(&mut self) {
        let mut state = DISPOSITION.lock();
        state.holders = state.holders.saturating_sub(1);
        if state.holders > 0 {
            return;
        }
        if let Some(previous) = state.previous.take() {
            // SAFETY: `previous` was filled in by sigaction; no old value is requested.
            let rc = unsafe { libc::sigaction(SIGALRM, &previous, ptr::null_mut()) };
            if rc != 0 {
                tracing::warn!(
                    error = %io::Error::last_os_error(),
                    "failed to restore SIGALRM disposition"
                );
            } else {
                tracing::debug!("SIGALRM disposition restored");
            }
        }
    }
}

#[cfg(test)]
fn sigalrm_holders() -> usize {
    DISPOSITION.lock().holders
}

pub(crate) fn enable_elevated_scheduling(setup: &RtSetup) -> WaiterResult<()> {
    let policy = match setup.policy {
        RtPolicy::Fifo => SCHED_FIFO,
        RtPolicy::RoundRobin => SCHED_RR,
    };

    // SAFETY: plain query on a valid policy constant.
    let min = unsafe { libc::sched_get_priority_min(policy) };
    // SAFETY: plain query on a valid policy constant.
    let max = unsafe { libc::sched_get_priority_max(policy) };
    if min < 0 || max < 0 {
        return Err(WaiterError::scheduling_unavailable(format!(
            "priority range query failed: {}",
            io::Error::last_os_error()
        )));
    }

    let param = sched_param {
        sched_priority: setup.priority.clamp(min, max),
    };
    // SAFETY: `param` is a valid sched_param; pid 0 targets the calling thread.
    let rc = unsafe { libc::sched_setscheduler(0, policy, &param) };
    if rc != 0 {
        return Err(WaiterError::scheduling_unavailable(format!(
            "sched_setscheduler: {}",
            io::Error::last_os_error()
        )));
    }

    if setup.lock_memory {
        // SAFETY: flags are valid mlockall constants.
        let rc = unsafe { libc::mlockall(MCL_CURRENT | MCL_FUTURE) };
        if rc != 0 {
            return Err(WaiterError::scheduling_unavailable(format!(
                "mlockall: {}",
                io::Error::last_os_error()
            )));
        }
    }

    Ok(())
}

pub(crate) fn is_realtime_scheduled() -> bool {
    // SAFETY: pid 0 queries the calling thread.
    let policy = unsafe { libc::sched_getscheduler(0) };
    policy == SCHED_FIFO || policy == SCHED_RR
}
