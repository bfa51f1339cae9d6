use serde::{Deserialize, Serialize};

/// Elementary stream handled by the renderer.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum StreamKind {
    Audio,
    Video,
}

impl StreamKind {
    pub fn is_audio(self) -> bool {
        matches!(self, StreamKind::Audio)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            StreamKind::Audio => "audio",
            StreamKind::Video => "video",
        }
    }
}

impl std::fmt::Display for StreamKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Terminal status carried by an end-of-stream marker.
///
/// The renderer never interprets this value; it is handed back to the owner
/// unchanged in [`RendererEvent::Eos`].
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FinalStatus {
    /// Natural end of stream.
    EndOfStream,
    /// Upstream (decoder, transport, or device) failure with its native code.
    Error { code: i32 },
}

impl FinalStatus {
    pub fn is_ok(self) -> bool {
        matches!(self, FinalStatus::EndOfStream)
    }
}

/// Outcome passed to a buffer's consumption acknowledgement.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AckStatus {
    /// Fully delivered to the audio device or released to the display path.
    Rendered,
    /// Consumed without being rendered (late video frame, trimmed leading audio).
    Dropped,
    /// Discarded by a flush or by shutdown.
    Cancelled,
}

impl AckStatus {
    /// `true` when the renderer took the buffer off its queue as part of playback.
    pub fn is_consumed(self) -> bool {
        matches!(self, AckStatus::Rendered | AckStatus::Dropped)
    }
}

/// Notifications emitted to the owning controller.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum RendererEvent {
    /// A stream drained its end-of-stream marker.
    Eos { stream: StreamKind, status: FinalStatus },
    /// A flush request for `stream` has been fully handled.
    FlushComplete { stream: StreamKind },
    /// Current media position in microseconds.
    Position { position_us: i64 },
    /// Lateness accumulated by dropped video frames since the last report.
    VideoLateBy { late_by_us: i64 },
}

/// Records handed to a registered statistics collector.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StatsEvent {
    BufferQueued { stream: StreamKind, media_time_us: i64 },
    VideoFrameRendered { media_time_us: i64, late_by_us: i64 },
    VideoFrameDropped { media_time_us: i64, late_by_us: i64 },
    AudioWrite { requested_bytes: usize, accepted_bytes: usize },
    Flushed { stream: StreamKind, cancelled: usize },
}
