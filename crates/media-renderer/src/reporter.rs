//! Throttled upward notifications.

/// Rate limiter keyed on wall time.
#[derive(Clone, Debug)]
pub(crate) struct Throttle {
    interval_us: i64,
    last_us: Option<i64>,
}

impl Throttle {
    pub(crate) fn new(interval_us: i64) -> Self {
        Self {
            interval_us,
            last_us: None,
        }
    }

    pub(crate) fn ready(&self, now_us: i64) -> bool {
        match self.last_us {
            Some(last) => now_us - last >= self.interval_us,
            None => true,
        }
    }

    pub(crate) fn mark(&mut self, now_us: i64) {
        self.last_us = Some(now_us);
    }

    pub(crate) fn reset(&mut self) {
        self.last_us = None;
    }
}

/// Decides when a position notification may go out.
#[derive(Debug)]
pub(crate) struct PositionReporter {
    throttle: Throttle,
    force_next: bool,
}

impl PositionReporter {
    pub(crate) fn new(min_interval_us: i64) -> Self {
        Self {
            throttle: Throttle::new(min_interval_us),
            force_next: false,
        }
    }

    /// Let the next report through regardless of the interval.
    pub(crate) fn request_immediate(&mut self) {
        self.force_next = true;
    }

    pub(crate) fn reset(&mut self) {
        self.throttle.reset();
    }

    /// Returns `true` and records the emission when a report is allowed now.
    pub(crate) fn should_emit(&mut self, now_us: i64, force: bool) -> bool {
        if !(force || self.force_next || self.throttle.ready(now_us)) {
            return false;
        }
        self.force_next = false;
        self.throttle.mark(now_us);
        true
    }
}

/// Accumulates lateness of dropped video frames and releases it in batches.
#[derive(Debug)]
pub(crate) struct LateReporter {
    throttle: Throttle,
    accumulated_us: i64,
}

impl LateReporter {
    pub(crate) fn new(interval_us: i64) -> Self {
        Self {
            throttle: Throttle::new(interval_us),
            accumulated_us: 0,
        }
    }

    pub(crate) fn accumulate(&mut self, late_by_us: i64) {
        self.accumulated_us = self.accumulated_us.saturating_add(late_by_us.max(0));
    }

    pub(crate) fn accumulated_us(&self) -> i64 {
        self.accumulated_us
    }

    /// Take the accumulated lateness when there is some and the interval allows it.
    pub(crate) fn take_report(&mut self, now_us: i64) -> Option<i64> {
        if self.accumulated_us == 0 || !self.throttle.ready(now_us) {
            return None;
        }
        self.throttle.mark(now_us);
        Some(std::mem::take(&mut self.accumulated_us))
    }

    pub(crate) fn reset(&mut self) {
        self.accumulated_us = 0;
        self.throttle.reset();
    }
}
