//! Deadline bookkeeping for the periodic sweep of pending events.
//!
//! The timer does not sleep by itself; the owner asks for the next deadline
//! and calls back into the monitor when it is reached.

use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

/// Shortest period the timer accepts; a zero period would fire forever.
pub const MIN_PERIOD: Duration = Duration::from_millis(1);

#[derive(Debug, Clone)]
pub struct SweepTimer {
    period: Duration,
    next_fire: Option<Instant>,
}

impl SweepTimer {
    /// Create an idle timer. Periods below [`MIN_PERIOD`] are raised to it.
    #[must_use]
    pub fn new(period: Duration) -> Self {
        Self {
            period: period.max(MIN_PERIOD),
            next_fire: None,
        }
    }

    /// Schedule the first tick unless one is already scheduled.
    ///
    /// Returns whether the timer was idle before.
    pub fn arm(&mut self, now: Instant) -> bool {
        if self.next_fire.is_some() {
            return false;
        }
        debug!("Waiting for event pairs");
        self.next_fire = Some(now + self.period);
        true
    }

    /// Schedule the following tick one period after `now`.
    pub fn reschedule(&mut self, now: Instant) {
        self.next_fire = Some(now + self.period);
    }

    pub fn cancel(&mut self) {
        if self.next_fire.take().is_some() {
            debug!("No more events to pair");
        }
    }

    #[must_use]
    pub fn is_armed(&self) -> bool {
        self.next_fire.is_some()
    }

    #[must_use]
    pub fn is_due(&self, now: Instant) -> bool {
        self.next_fire.is_some_and(|deadline| now >= deadline)
    }

    #[must_use]
    pub fn deadline(&self) -> Option<Instant> {
        self.next_fire
    }

    #[must_use]
    pub fn period(&self) -> Duration {
        self.period
    }
}
