/// Pacing parameters shared by the drain schedulers and reporters.
///
/// All durations are in microseconds, matching media timestamps.
#[derive(Clone, Debug)]
pub struct RendererConfig {
    /// Minimum spacing between two position notifications.
    pub min_position_update_interval_us: i64,
    /// A video frame later than this is dropped instead of rendered.
    pub video_late_tolerance_us: i64,
    /// Minimum spacing between two accumulated late-by notifications.
    pub late_report_interval_us: i64,
    /// Audio tick retry interval while the queue is empty or the device is not ready.
    pub audio_poll_interval_us: i64,
    /// Lower bound for the audio tick reschedule delay.
    pub audio_min_reschedule_us: i64,
    /// At stream start, audio leading the first video frame by more than this is trimmed.
    pub sync_max_audio_lead_us: i64,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            min_position_update_interval_us: 100_000,
            video_late_tolerance_us: 40_000,
            late_report_interval_us: 1_000_000,
            audio_poll_interval_us: 10_000,
            audio_min_reschedule_us: 2_000,
            sync_max_audio_lead_us: 100_000,
        }
    }
}
