//! Collaborator interfaces consumed by the renderer.

use renderer_types::StatsEvent;
use thiserror::Error;

use crate::entry::MediaBuffer;

/// Errors an audio sink may report. Neither is fatal: the drain tick is
/// retried after the poll interval.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SinkError {
    /// The device is not ready to report its clock or accept data yet.
    #[error("audio sink not ready")]
    NotReady,
    /// Any other device-side failure.
    #[error("audio sink error: {0}")]
    Device(String),
}

/// Audio output device.
///
/// Implementations handle their own synchronization; the renderer calls every
/// method from its worker thread while the owner may reconfigure the device
/// and then call `signal_audio_sink_changed`.
pub trait AudioSink: Send + Sync {
    /// Output sample rate in Hz.
    fn sample_rate(&self) -> u32;
    /// Bytes per interleaved frame.
    fn frame_size(&self) -> usize;
    /// Device buffer capacity in frames.
    fn buffer_frames(&self) -> u32;
    /// Frames played out since the last flush.
    fn played_frames(&self) -> Result<u64, SinkError>;
    /// Output latency not covered by buffered frames.
    fn latency_us(&self) -> i64;
    /// Write up to `data.len()` bytes and return how many were accepted.
    ///
    /// A short or zero-length write means the device is busy. Must not block
    /// indefinitely.
    fn write(&self, data: &[u8]) -> Result<usize, SinkError>;
    fn start(&self);
    fn pause(&self);
    /// Drop buffered data and reset the played-frame counter.
    fn flush(&self);
}

/// Device parameters cached by the renderer until the sink reports a change.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SinkParams {
    pub sample_rate: u32,
    pub frame_size: usize,
    pub buffer_frames: u32,
}

impl SinkParams {
    pub fn read(sink: &dyn AudioSink) -> Self {
        Self {
            sample_rate: sink.sample_rate(),
            frame_size: sink.frame_size().max(1),
            buffer_frames: sink.buffer_frames(),
        }
    }

    pub fn frames_to_us(&self, frames: u64) -> i64 {
        if self.sample_rate == 0 {
            return 0;
        }
        let us = u128::from(frames) * 1_000_000 / u128::from(self.sample_rate);
        i64::try_from(us).unwrap_or(i64::MAX)
    }

    pub fn bytes_to_us(&self, bytes: usize) -> i64 {
        self.frames_to_us((bytes / self.frame_size) as u64)
    }
}

/// Display path that performs the actual rendering of a released frame.
pub trait VideoOutput: Send {
    fn render(&mut self, frame: &MediaBuffer);
}

/// Receiver of opaque statistics records.
pub trait StatsCollector: Send + Sync {
    fn record(&self, event: StatsEvent);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conversions_use_frame_size_and_rate() {
        let params = SinkParams {
            sample_rate: 48_000,
            frame_size: 4,
            buffer_frames: 4_800,
        };
        assert_eq!(params.frames_to_us(48_000), 1_000_000);
        assert_eq!(params.frames_to_us(480), 10_000);
        assert_eq!(params.bytes_to_us(1_920), 10_000);
    }

    #[test]
    fn zero_rate_converts_to_zero() {
        let params = SinkParams {
            sample_rate: 0,
            frame_size: 4,
            buffer_frames: 0,
        };
        assert_eq!(params.frames_to_us(1_000), 0);
    }
}
