//! Signal strategy tests.
//!
//! Each waiter's interval timer is directed at the thread that started it,
//! so these run safely in parallel with each other and with the rest of the
//! test harness.

#![cfg(target_os = "linux")]

use periodic_waiter::{
    PeriodicWaiter, StrategyKind, StrategySelection, WaitStatus, WaiterConfig, WaiterError,
};
use std::io::{Read, Write};
use std::os::unix::net::UnixStream;
use std::thread;
use std::time::Duration;

type TestResult = Result<(), Box<dyn std::error::Error>>;

fn signal_waiter(period: Duration, max_wait: Duration) -> Result<PeriodicWaiter, WaiterError> {
    let config = WaiterConfig::builder()
        .period(period)
        .max_wait(max_wait)
        .collect_statistics(true)
        .strategy(StrategySelection::Signal)
        .build()?;
    PeriodicWaiter::new(config)
}

#[test]
fn test_signal_mode_normal_cycles() -> TestResult {
    let period = Duration::from_millis(10);
    let mut waiter = signal_waiter(period, Duration::from_millis(100))?;
    waiter.start()?;
    assert_eq!(waiter.active_strategy(), Some(StrategyKind::Signal));

    for _ in 0..10 {
        thread::sleep(Duration::from_millis(2));
        assert_eq!(waiter.wait()?, WaitStatus::Ok);
    }

    let stats = waiter.statistics()?;
    assert_eq!(stats.count, 10);
    let mean_ms = stats.mean / 1_000_000.0;
    assert!((5.0..=40.0).contains(&mean_ms), "mean {mean_ms} ms");
    Ok(())
}

#[test]
fn test_signal_mode_overrun_is_reported() -> TestResult {
    let mut waiter = signal_waiter(Duration::from_millis(10), Duration::from_millis(30))?;
    waiter.start()?;

    // Ticks keep firing during the work; the wake-up after it is past max_wait.
    thread::sleep(Duration::from_millis(35));
    assert_eq!(waiter.wait()?, WaitStatus::MaxWaitExceeded);
    assert_eq!(waiter.statistics()?.count, 0);

    // The next tick wakes normally.
    assert_eq!(waiter.wait()?, WaitStatus::Ok);
    assert_eq!(waiter.statistics()?.count, 1);
    assert_eq!(waiter.cycles(), 2);
    Ok(())
}

#[test]
fn test_blocking_read_between_waits_survives_ticks() -> TestResult {
    let mut waiter = signal_waiter(Duration::from_millis(10), Duration::from_millis(200))?;
    waiter.start()?;

    let (mut reader, mut writer) = UnixStream::pair()?;
    let peer = thread::spawn(move || -> std::io::Result<()> {
        thread::sleep(Duration::from_millis(50));
        writer.write_all(b"x")
    });

    // Several ticks land while this read blocks; it must not fail with EINTR.
    let mut buf = [0u8; 1];
    let read = reader.read(&mut buf)?;
    assert_eq!(read, 1);
    assert_eq!(&buf, b"x");
    peer.join().map_err(|e| format!("writer thread panicked: {e:?}"))??;

    assert_eq!(waiter.wait()?, WaitStatus::Ok);
    Ok(())
}

#[test]
fn test_signal_mode_restart() -> TestResult {
    let mut waiter = signal_waiter(Duration::from_millis(5), Duration::from_millis(100))?;

    for _ in 0..3 {
        waiter.start()?;
        assert_eq!(waiter.wait()?, WaitStatus::Ok);
        assert_eq!(waiter.statistics()?.count, 1);
        waiter.stop();
        assert_eq!(waiter.active_strategy(), None);
    }
    Ok(())
}

#[test]
fn test_concurrent_waiters_on_separate_threads() -> TestResult {
    let periods = [4u64, 7, 11];
    let handles: Vec<_> = periods
        .iter()
        .map(|&ms| {
            thread::spawn(move || -> Result<u64, String> {
                let mut waiter =
                    signal_waiter(Duration::from_millis(ms), Duration::from_millis(ms * 10))
                        .map_err(|e| e.to_string())?;
                waiter.start().map_err(|e| e.to_string())?;
                for _ in 0..8 {
                    let status = waiter.wait().map_err(|e| e.to_string())?;
                    if status != WaitStatus::Ok {
                        return Err(format!("{ms} ms waiter: {status}"));
                    }
                }
                let stats = waiter.statistics().map_err(|e| e.to_string())?;
                Ok(stats.count)
            })
        })
        .collect();

    for handle in handles {
        let count = handle.join().map_err(|e| format!("waiter thread panicked: {e:?}"))??;
        assert_eq!(count, 8);
    }
    Ok(())
}

#[test]
fn test_dropping_running_waiter_releases_timer() -> TestResult {
    for _ in 0..5 {
        let mut waiter = signal_waiter(Duration::from_millis(2), Duration::from_millis(50))?;
        waiter.start()?;
        waiter.wait()?;
    }

    // A fresh waiter still gets its own ticks after the others were dropped.
    let mut waiter = signal_waiter(Duration::from_millis(3), Duration::from_millis(50))?;
    waiter.start()?;
    assert_eq!(waiter.wait()?, WaitStatus::Ok);
    Ok(())
}
