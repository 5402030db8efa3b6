//! Tick loop runner with stop control.
//!
//! [`run_driver`] calls [`TickDriver::run_tick`] on a fixed
//! `tokio::time::interval` until [`DriverControl::request_stop`] is called.
//! A tick that runs long delays the next one instead of stacking up
//! missed ticks.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::Notify;
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};

use crate::tick::TickDriver;

/// Errors that can occur when starting the tick loop.
#[derive(Debug, thiserror::Error)]
pub enum RunnerError {
    /// The tick interval was zero.
    #[error("tick interval must be non-zero")]
    ZeroInterval,
}

/// Shared stop flag for the tick loop.
///
/// Wrapped in an `Arc` and shared between the loop and whatever decides
/// to shut it down (a signal handler, a test).
#[derive(Debug, Default)]
pub struct DriverControl {
    stop_requested: AtomicBool,
    stop_notify: Notify,
}

impl DriverControl {
    /// Create a control in the running state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask the loop to stop after the current tick.
    pub fn request_stop(&self) {
        self.stop_requested.store(true, Ordering::Release);
        self.stop_notify.notify_one();
    }

    /// Whether a stop has been requested.
    pub fn is_stop_requested(&self) -> bool {
        self.stop_requested.load(Ordering::Acquire)
    }
}

/// What the loop did before it stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DriverReport {
    /// Ticks executed.
    pub ticks: u64,
    /// Ticks in which at least one step failed.
    pub ticks_with_failures: u64,
}

/// Run ticks every `interval` until a stop is requested.
///
/// The first tick runs immediately.
///
/// # Errors
///
/// Returns [`RunnerError::ZeroInterval`] if `interval` is zero.
pub async fn run_driver(
    driver: &TickDriver,
    control: &DriverControl,
    interval: Duration,
) -> Result<DriverReport, RunnerError> {
    if interval.is_zero() {
        return Err(RunnerError::ZeroInterval);
    }
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut report = DriverReport {
        ticks: 0,
        ticks_with_failures: 0,
    };

    info!(interval_secs = interval.as_secs(), "tick loop starting");
    loop {
        if control.is_stop_requested() {
            break;
        }
        tokio::select! {
            () = control.stop_notify.notified() => continue,
            _ = ticker.tick() => {}
        }

        let summary = driver.run_tick().await;
        report.ticks = report.ticks.saturating_add(1);
        if !summary.failures.is_empty() {
            report.ticks_with_failures = report.ticks_with_failures.saturating_add(1);
        }
    }

    if report.ticks_with_failures > 0 {
        warn!(
            ticks = report.ticks,
            ticks_with_failures = report.ticks_with_failures,
            "tick loop stopped with failures"
        );
    } else {
        info!(ticks = report.ticks, "tick loop stopped");
    }
    Ok(report)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Arc;

    use conquest_store::{MemoryStore, Store};
    use conquest_warfare::{Clock, ManualClock, NationDirectory, StaticDirectory, WarfareConfig};

    use super::*;
    use crate::services::Conquest;

    fn driver() -> TickDriver {
        let conquest = Conquest::new(
            Arc::new(MemoryStore::new()) as Arc<dyn Store>,
            Arc::new(StaticDirectory::new()) as Arc<dyn NationDirectory>,
            Arc::new(ManualClock::default()) as Arc<dyn Clock>,
            &WarfareConfig::default(),
        );
        TickDriver::new(Arc::new(conquest))
    }

    #[tokio::test]
    async fn zero_interval_rejected() {
        let control = DriverControl::new();
        let result = run_driver(&driver(), &control, Duration::ZERO).await;
        assert!(matches!(result, Err(RunnerError::ZeroInterval)));
    }

    #[tokio::test]
    async fn stop_before_start_runs_no_ticks() {
        let control = DriverControl::new();
        control.request_stop();
        let report = run_driver(&driver(), &control, Duration::from_secs(60))
            .await
            .unwrap();
        assert_eq!(report.ticks, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn ticks_on_interval_until_stopped() {
        let control = Arc::new(DriverControl::new());
        let stopper = Arc::clone(&control);
        tokio::spawn(async move {
            // Ticks at 0s, 60s, and 120s; stop before the one at 180s.
            tokio::time::sleep(Duration::from_secs(150)).await;
            stopper.request_stop();
        });

        let report = run_driver(&driver(), &control, Duration::from_secs(60))
            .await
            .unwrap();
        assert_eq!(report.ticks, 3);
        assert_eq!(report.ticks_with_failures, 0);
    }
}
