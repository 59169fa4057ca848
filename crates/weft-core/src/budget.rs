#![forbid(unsafe_code)]

//! Time-slice accounting.

use std::cell::Cell;
use std::time::Duration;

use web_time::Instant;

/// Monotonic clock anchored at construction.
///
/// Hosts that have no clock of their own report [`MonotonicClock::elapsed`]
/// from [`HostScheduler::now`](crate::HostScheduler::now).
#[derive(Debug, Clone, Copy)]
pub struct MonotonicClock {
    origin: Instant,
}

impl MonotonicClock {
    #[must_use]
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }

    /// Time since construction.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.origin.elapsed()
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

/// Budget for one slice of cooperative work.
///
/// Timestamps are supplied by the caller so the budget works with any clock,
/// including the manual clocks used in tests.
#[derive(Debug)]
pub struct FrameBudget {
    budget: Duration,
    started: Cell<Duration>,
}

impl FrameBudget {
    #[must_use]
    pub fn new(budget: Duration) -> Self {
        Self {
            budget,
            started: Cell::new(Duration::ZERO),
        }
    }

    /// Begin a new slice at `now`.
    pub fn restart(&self, now: Duration) {
        self.started.set(now);
    }

    /// Time spent in the current slice.
    #[must_use]
    pub fn elapsed(&self, now: Duration) -> Duration {
        now.saturating_sub(self.started.get())
    }

    /// Whether the current slice has used up its budget.
    #[must_use]
    pub fn is_exhausted(&self, now: Duration) -> bool {
        let exhausted = self.elapsed(now) >= self.budget;
        #[cfg(feature = "tracing")]
        if exhausted {
            tracing::trace!(
                budget_us = self.budget.as_micros() as u64,
                elapsed_us = self.elapsed(now).as_micros() as u64,
                "frame budget exhausted"
            );
        }
        exhausted
    }

    #[must_use]
    pub fn budget(&self) -> Duration {
        self.budget
    }
}
