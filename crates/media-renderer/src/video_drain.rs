//! Video drain scheduler.
//!
//! Frames are released one at a time against the playback anchor. A frame that
//! is early gets a single wake-up at its due time, a frame that is too late is
//! dropped and its lateness accumulated for the next late-by report.

use renderer_types::{AckStatus, RendererEvent, StatsEvent, StreamKind};

use crate::engine::RendererCore;
use crate::entry::Payload;

impl RendererCore {
    pub(crate) fn on_drain_video(&mut self, generation: u64) {
        if !self.video.accepts(generation) {
            tracing::trace!(
                generation,
                current = self.video.generation(),
                "stale video tick"
            );
            return;
        }
        self.video.drain_pending = false;
        if self.paused || self.video_held() {
            return;
        }

        let now = self.now_us();
        let Some(front) = self.video.front() else {
            return;
        };
        if front.hidden_until(now).is_some() {
            self.post_drain_video();
            return;
        }
        if let Some(status) = front.eos_status() {
            self.video.pop();
            self.notify_eos(StreamKind::Video, status);
            return;
        }
        let Some(media_time_us) = front.media_time_us() else {
            return;
        };

        // Without audio the video stream paces itself from its first frame.
        if !self.anchor.is_set() && !self.has_audio {
            self.anchor.set(media_time_us, now);
            self.seek_time_us = None;
        }
        let late_by_us = self
            .anchor
            .real_time_for(media_time_us)
            .map_or(0, |real_us| now - real_us);
        if late_by_us < 0 {
            self.post_drain_video();
            return;
        }

        let Some(entry) = self.video.pop() else {
            return;
        };
        if late_by_us > self.config.video_late_tolerance_us {
            tracing::debug!(media_time_us, late_by_us, "dropping late video frame");
            self.late.accumulate(late_by_us);
            self.record(StatsEvent::VideoFrameDropped {
                media_time_us,
                late_by_us,
            });
            entry.finish(AckStatus::Dropped);
        } else {
            if let (Payload::Buffer { buffer, .. }, Some(output)) =
                (&entry.payload, self.video_output.as_mut())
            {
                output.render(buffer);
            }
            self.record(StatsEvent::VideoFrameRendered {
                media_time_us,
                late_by_us,
            });
            entry.finish(AckStatus::Rendered);
            if self.sync.disarm() {
                tracing::debug!(media_time_us, "first video frame released");
            }
        }

        if let Some(late_by_us) = self.late.take_report(now) {
            tracing::info!(late_by_us, "video running late");
            self.emit(RendererEvent::VideoLateBy { late_by_us });
        }
        self.notify_position(false);
        self.post_drain_video();
    }
}
