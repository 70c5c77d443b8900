//! Wall-clock abstraction so leases and deadlines can be driven in tests.

use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, Duration, TimeZone, Utc};

/// Source of the current time.
pub trait Clock: Send + Sync {
    /// Current instant.
    fn now(&self) -> DateTime<Utc>;

    /// Current instant as unix seconds.
    fn timestamp(&self) -> i64 {
        self.now().timestamp()
    }
}

/// The real system clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock that only moves when told to.
///
/// With [`ManualClock::with_auto_advance`] every reading moves the clock
/// forward by a fixed step, which lets a bounded loop observe time passing
/// without sleeping.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
    step: Duration,
}

impl ManualClock {
    /// Create a clock frozen at `start`.
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
            step: Duration::zero(),
        }
    }

    /// Create a clock frozen at the given unix timestamp.
    pub fn at(secs: i64) -> Self {
        let start = Utc
            .timestamp_opt(secs, 0)
            .single()
            .unwrap_or(DateTime::<Utc>::UNIX_EPOCH);
        Self::new(start)
    }

    /// Advance by `step` after every reading.
    pub fn with_auto_advance(mut self, step: Duration) -> Self {
        self.step = step;
        self
    }

    /// Move the clock forward.
    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap_or_else(PoisonError::into_inner);
        *now += by;
    }

    /// Jump to an absolute instant.
    pub fn set(&self, to: DateTime<Utc>) {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner) = to;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        let mut now = self.now.lock().unwrap_or_else(PoisonError::into_inner);
        let current = *now;
        *now += self.step;
        current
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_clock_only_moves_when_advanced() {
        let clock = ManualClock::at(1_000);
        assert_eq!(clock.timestamp(), 1_000);
        assert_eq!(clock.timestamp(), 1_000);
        clock.advance(Duration::seconds(30));
        assert_eq!(clock.timestamp(), 1_030);
    }

    #[test]
    fn auto_advance_steps_each_reading() {
        let clock = ManualClock::at(0).with_auto_advance(Duration::seconds(2));
        assert_eq!(clock.timestamp(), 0);
        assert_eq!(clock.timestamp(), 2);
        assert_eq!(clock.timestamp(), 4);
    }
}
