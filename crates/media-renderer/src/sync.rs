//! Start-of-stream synchronization.
//!
//! When both streams are expected and neither has delivered anything yet, the
//! stream that shows up first waits for the other: audio is held until the
//! video queue has its first frame, and video is held until the device has
//! accepted the first audio bytes.

#[derive(Debug)]
pub(crate) struct StartSync {
    armed: bool,
}

impl Default for StartSync {
    fn default() -> Self {
        Self { armed: true }
    }
}

impl StartSync {
    pub(crate) fn arm(&mut self) {
        self.armed = true;
    }

    /// Returns whether the phase was still armed.
    pub(crate) fn disarm(&mut self) -> bool {
        std::mem::replace(&mut self.armed, false)
    }

    pub(crate) fn is_active(&self, has_audio: bool, has_video: bool) -> bool {
        self.armed && has_audio && has_video
    }

    pub(crate) fn holds_video(&self, has_audio: bool, has_video: bool) -> bool {
        self.is_active(has_audio, has_video)
    }

    pub(crate) fn holds_audio(&self, has_audio: bool, has_video: bool, video_queued: bool) -> bool {
        self.is_active(has_audio, has_video) && !video_queued
    }
}

/// `true` when leading audio should be trimmed so both streams start together.
pub(crate) fn audio_leads_too_far(audio_front_us: i64, video_front_us: i64, max_lead_us: i64) -> bool {
    video_front_us - audio_front_us > max_lead_us
}
