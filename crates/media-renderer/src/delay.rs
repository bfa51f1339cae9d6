//! One-shot artificial latency for the next queued buffer.

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct PendingDelay {
    delay_us: i64,
    requested_at_us: i64,
}

#[derive(Debug, Default)]
pub(crate) struct DelayInjector {
    pending: Option<PendingDelay>,
}

impl DelayInjector {
    /// Arm a delay. A newer request replaces one that was never consumed.
    pub(crate) fn arm(&mut self, delay_us: i64, requested_at_us: i64) {
        self.pending = Some(PendingDelay {
            delay_us: delay_us.max(0),
            requested_at_us,
        });
    }

    pub(crate) fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Consume the pending delay; returns the wall time the next entry becomes visible.
    pub(crate) fn take_visible_at(&mut self) -> Option<i64> {
        self.pending
            .take()
            .map(|p| p.requested_at_us.saturating_add(p.delay_us))
    }

    pub(crate) fn clear(&mut self) {
        self.pending = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delay_is_consumed_once() {
        let mut d = DelayInjector::default();
        assert_eq!(d.take_visible_at(), None);
        d.arm(30_000, 1_000);
        assert!(d.is_pending());
        assert_eq!(d.take_visible_at(), Some(31_000));
        assert_eq!(d.take_visible_at(), None);
    }

    #[test]
    fn negative_delay_is_clamped() {
        let mut d = DelayInjector::default();
        d.arm(-5, 100);
        assert_eq!(d.take_visible_at(), Some(100));
    }

    #[test]
    fn newer_request_replaces_pending() {
        let mut d = DelayInjector::default();
        d.arm(10, 0);
        d.arm(20, 5);
        assert_eq!(d.take_visible_at(), Some(25));
        d.arm(10, 0);
        d.clear();
        assert!(!d.is_pending());
    }
}
