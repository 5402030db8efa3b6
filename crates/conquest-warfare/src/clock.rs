//! Injectable time source.
//!
//! Managers never read wall time directly; they ask a [`Clock`]. Production
//! uses [`SystemClock`]. Tests drive a [`ManualClock`] so deadlines (war
//! start, truce expiry, election phases) can be crossed deterministically.

use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, TimeDelta, Utc};

/// A source of the current time.
pub trait Clock: Send + Sync + core::fmt::Debug {
    /// The current instant.
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    /// Create a clock frozen at `start`.
    pub const fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    /// Move the clock forward by `delta`, saturating at the end of time.
    pub fn advance(&self, delta: TimeDelta) {
        let mut now = self.now.lock().unwrap_or_else(PoisonError::into_inner);
        *now = after(*now, delta);
    }

    /// Jump to `instant`.
    pub fn set(&self, instant: DateTime<Utc>) {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner) = instant;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new(Utc::now())
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// `instant + delta`, saturating at [`DateTime::<Utc>::MAX_UTC`].
pub fn after(instant: DateTime<Utc>, delta: TimeDelta) -> DateTime<Utc> {
    instant
        .checked_add_signed(delta)
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_clock_advances() {
        let start = Utc::now();
        let clock = ManualClock::new(start);
        clock.advance(TimeDelta::hours(25));
        assert_eq!(clock.now(), after(start, TimeDelta::hours(25)));
    }

    #[test]
    fn after_saturates() {
        let end = after(DateTime::<Utc>::MAX_UTC, TimeDelta::days(1));
        assert_eq!(end, DateTime::<Utc>::MAX_UTC);
    }

    #[test]
    fn set_jumps_backwards_too() {
        let start = Utc::now();
        let clock = ManualClock::new(start);
        clock.advance(TimeDelta::days(3));
        clock.set(start);
        assert_eq!(clock.now(), start);
    }
}
