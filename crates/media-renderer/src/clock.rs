//! Wall-clock sources.
//!
//! The renderer reads "now" through [`Clock`] so pacing can be driven by a
//! monotonic system clock in production and by [`ManualClock`] in simulations.

use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Instant;

/// Monotonic wall clock in microseconds.
pub trait Clock: Send + Sync {
    fn now_us(&self) -> i64;
}

/// [`Instant`]-backed clock counting from its creation.
#[derive(Debug)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now_us(&self) -> i64 {
        i64::try_from(self.origin.elapsed().as_micros()).unwrap_or(i64::MAX)
    }
}

/// Clock that only moves when told to.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicI64,
}

impl ManualClock {
    pub fn new(start_us: i64) -> Self {
        Self {
            now: AtomicI64::new(start_us),
        }
    }

    pub fn set(&self, now_us: i64) {
        self.now.store(now_us, Ordering::SeqCst);
    }

    pub fn advance(&self, delta_us: i64) {
        self.now.fetch_add(delta_us, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_us(&self) -> i64 {
        self.now.load(Ordering::SeqCst)
    }
}
