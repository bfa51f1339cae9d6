//! Media-time to wall-time mapping.

/// "At wall time `real_us`, playback was at media time `media_us`."
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AnchorPoint {
    pub media_us: i64,
    pub real_us: i64,
}

/// Playback anchor with pause support.
///
/// While running, position is `media + (now - real)`. While frozen, position
/// is `media` regardless of the wall clock.
#[derive(Clone, Copy, Debug, Default)]
pub struct PlaybackAnchor {
    point: Option<AnchorPoint>,
    frozen: bool,
}

impl PlaybackAnchor {
    pub fn set(&mut self, media_us: i64, real_us: i64) {
        self.point = Some(AnchorPoint { media_us, real_us });
    }

    pub fn invalidate(&mut self) {
        self.point = None;
    }

    pub fn is_set(&self) -> bool {
        self.point.is_some()
    }

    pub fn point(&self) -> Option<AnchorPoint> {
        self.point
    }

    pub fn position_us(&self, now_us: i64) -> Option<i64> {
        let p = self.point?;
        if self.frozen {
            Some(p.media_us)
        } else {
            Some(p.media_us + (now_us - p.real_us))
        }
    }

    /// Wall time at which `media_us` is due.
    pub fn real_time_for(&self, media_us: i64) -> Option<i64> {
        self.point.map(|p| p.real_us + (media_us - p.media_us))
    }

    /// Pin the anchor to the position derived at `now_us`.
    pub fn freeze(&mut self, now_us: i64) {
        if self.frozen {
            return;
        }
        if let Some(media_us) = self.position_us(now_us) {
            self.point = Some(AnchorPoint {
                media_us,
                real_us: now_us,
            });
        }
        self.frozen = true;
    }

    /// Restart the anchor from `now_us`, keeping the frozen media time.
    pub fn thaw(&mut self, now_us: i64) {
        if !self.frozen {
            return;
        }
        if let Some(p) = self.point.as_mut() {
            p.real_us = now_us;
        }
        self.frozen = false;
    }
}
