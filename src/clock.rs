//! The run clock.
//!
//! A [`Clock`] is anchored at the instant a test run started submitting. Every
//! time-based decision of a run (duration bound, trim-by-time, rate pacing,
//! report ticks) is measured as an offset from that anchor, so all of them agree
//! on what "now" means.
//!
//! The clock is built on [`tokio::time::Instant`], which makes it controllable
//! with tokio's paused test time.
//!
//! # Example
//!
//! ```ignore
//! use rlt_worker::clock::Clock;
//! use tokio::time::Duration;
//!
//! let clock = Clock::start_now();
//! let mut ticker = clock.ticker(Duration::from_millis(100));
//! ticker.tick().await; // fires at 100ms after start
//! assert!(clock.elapsed() >= Duration::from_millis(100));
//! ```

use tokio::time::{self, Duration, Instant};

/// A monotonic clock measuring time since the start of a test run.
#[derive(Debug, Clone, Copy)]
pub struct Clock {
    start: Instant,
}

impl Clock {
    /// Creates a clock anchored at the given instant.
    pub fn start_at(start: Instant) -> Self {
        Self { start }
    }

    /// Creates a clock anchored at the current instant.
    pub fn start_now() -> Self {
        Self::start_at(Instant::now())
    }

    /// Returns the instant the run started.
    pub fn start(&self) -> Instant {
        self.start
    }

    /// Returns the time elapsed since the run started.
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    /// Sleeps until `offset` has elapsed since the start of the run.
    ///
    /// If the offset is already behind, returns immediately.
    pub async fn sleep_until(&self, offset: Duration) {
        match self.start.checked_add(offset) {
            Some(deadline) => time::sleep_until(deadline).await,
            // beyond the range of Instant
            None => time::sleep(offset.saturating_sub(self.elapsed())).await,
        }
    }

    /// Creates a [`Ticker`] that ticks at fixed intervals according to this clock.
    pub fn ticker(&self, interval: Duration) -> Ticker {
        Ticker::new(*self, interval)
    }
}

#[cfg(feature = "rate_limit")]
impl governor::clock::Clock for Clock {
    type Instant = std::time::Instant;

    fn now(&self) -> Self::Instant {
        self.start.into_std() + self.elapsed()
    }
}
#[cfg(feature = "rate_limit")]
impl governor::clock::ReasonablyRealtime for Clock {}

/// A ticker that produces ticks at fixed offsets from the run start.
///
/// Unlike [`tokio::time::Interval`], the first tick fires one full interval
/// after the start instead of immediately, and missed ticks are skipped rather
/// than burst: a tick that is late by several intervals fires once and the
/// next one is scheduled on the following interval boundary.
#[derive(Debug, Clone)]
pub struct Ticker {
    clock: Clock,
    interval: Duration,
    next_tick: Duration,
}

impl Ticker {
    /// Creates a new ticker with the given clock and interval.
    pub fn new(clock: Clock, interval: Duration) -> Self {
        Self { clock, interval, next_tick: interval }
    }

    /// Waits for the next tick.
    pub async fn tick(&mut self) {
        self.clock.sleep_until(self.next_tick).await;
        if self.interval.is_zero() {
            return;
        }
        let elapsed = self.clock.elapsed();
        while self.next_tick <= elapsed {
            self.next_tick += self.interval;
        }
    }
}
