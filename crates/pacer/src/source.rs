//! Synthetic producers: a sine tone for audio and a numbered test pattern for video.
//!
//! Each producer runs on its own thread, keeps a bounded number of buffers in
//! flight (released through their consumption acks), backs off while its
//! stream is flushing, and queues an end-of-stream marker at the configured
//! duration.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};
use std::thread::JoinHandle;
use std::time::Duration;

use anyhow::{Context, Result};
use bytes::Bytes;
use crossbeam_channel::RecvTimeoutError;
use media_renderer::{
    AckStatus, ConsumeAck, FinalStatus, MediaBuffer, RendererHandle, SinkParams, StreamKind,
    VideoOutput,
};

const IDLE: Duration = Duration::from_millis(5);

/// Shared control for all producers of one run.
///
/// A seek is two-phase: [`SourceControl::hold`] stops producers before the
/// renderer is flushed, and [`SourceControl::seek`] restarts them at the new
/// media time once the flushes have completed.
#[derive(Debug, Default)]
pub struct SourceControl {
    stop: AtomicBool,
    hold: AtomicBool,
    epoch: AtomicU64,
    seek_to_us: AtomicI64,
}

impl SourceControl {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stop(&self) {
        self.stop.store(true, Ordering::Release);
    }

    pub fn is_stopped(&self) -> bool {
        self.stop.load(Ordering::Acquire)
    }

    pub fn hold(&self) {
        self.hold.store(true, Ordering::Release);
    }

    pub fn is_held(&self) -> bool {
        self.hold.load(Ordering::Acquire)
    }

    /// Restart production at `time_us` and release the hold.
    pub fn seek(&self, time_us: i64) {
        self.seek_to_us.store(time_us, Ordering::Release);
        self.epoch.fetch_add(1, Ordering::AcqRel);
        self.hold.store(false, Ordering::Release);
    }

    fn epoch(&self) -> u64 {
        self.epoch.load(Ordering::Acquire)
    }

    fn seek_target(&self) -> i64 {
        self.seek_to_us.load(Ordering::Acquire)
    }
}

/// Per-producer tallies returned when its thread exits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProducerReport {
    pub queued: u64,
    pub rendered: u64,
    pub dropped: u64,
    pub cancelled: u64,
}

impl ProducerReport {
    fn tally(&mut self, status: AckStatus) {
        match status {
            AckStatus::Rendered => self.rendered += 1,
            AckStatus::Dropped => self.dropped += 1,
            AckStatus::Cancelled => self.cancelled += 1,
        }
    }
}

/// Produces the payload for the buffer starting at a media time.
pub trait FrameSource: Send + 'static {
    /// Payload and duration of the buffer starting at `time_us`.
    fn frame_at(&mut self, time_us: i64) -> (Bytes, i64);
}

pub struct ProducerSpec {
    pub stream: StreamKind,
    pub duration_us: i64,
    pub max_in_flight: usize,
}

/// Spawn a producer thread feeding `source` into the renderer.
pub fn spawn_producer<S: FrameSource>(
    handle: RendererHandle,
    spec: ProducerSpec,
    control: Arc<SourceControl>,
    source: S,
) -> Result<JoinHandle<ProducerReport>> {
    let name = format!("{}-producer", spec.stream);
    std::thread::Builder::new()
        .name(name)
        .spawn(move || run_producer(&handle, &spec, &control, source))
        .context("spawn producer thread")
}

fn run_producer<S: FrameSource>(
    handle: &RendererHandle,
    spec: &ProducerSpec,
    control: &SourceControl,
    mut source: S,
) -> ProducerReport {
    let stream = spec.stream;
    let (ack_tx, ack_rx) = crossbeam_channel::unbounded::<(u64, AckStatus)>();
    let mut report = ProducerReport::default();
    let mut in_flight = 0usize;
    let mut seen_epoch = control.epoch();
    let mut time_us = 0i64;
    let mut eos_sent = false;
    let mut seq = 0u64;

    while !control.is_stopped() {
        while let Ok((_, status)) = ack_rx.try_recv() {
            in_flight = in_flight.saturating_sub(1);
            report.tally(status);
        }

        let epoch = control.epoch();
        if epoch != seen_epoch {
            seen_epoch = epoch;
            time_us = control.seek_target();
            eos_sent = false;
            tracing::debug!(stream = %stream, time_us, "producer restarted");
        }

        let idle = control.is_held()
            || handle.is_flushing(stream)
            || eos_sent
            || in_flight >= spec.max_in_flight;
        if idle {
            match ack_rx.recv_timeout(IDLE) {
                Ok((_, status)) => {
                    in_flight = in_flight.saturating_sub(1);
                    report.tally(status);
                }
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => break,
            }
            continue;
        }

        if time_us >= spec.duration_us {
            handle.queue_eos(stream, FinalStatus::EndOfStream);
            eos_sent = true;
            tracing::debug!(stream = %stream, time_us, "end of stream queued");
            continue;
        }

        let (data, step_us) = source.frame_at(time_us);
        let ack = ConsumeAck::to_channel(ack_tx.clone(), seq);
        handle.queue_buffer(stream, MediaBuffer::new(data, time_us), ack);
        tracing::trace!(stream = %stream, seq, time_us, "buffer queued");
        seq += 1;
        in_flight += 1;
        report.queued += 1;
        time_us += step_us.max(1);
    }

    while let Ok((_, status)) = ack_rx.try_recv() {
        report.tally(status);
    }
    tracing::debug!(stream = %stream, ?report, "producer stopped");
    report
}

/// Sine tone as interleaved little-endian `f32`.
pub struct ToneSource {
    sample_rate: u32,
    channels: usize,
    hz: f32,
    chunk_frames: usize,
}

impl ToneSource {
    pub fn new(params: &SinkParams, hz: f32, chunk_ms: u64) -> Self {
        let channels = (params.frame_size / 4).max(1);
        let chunk_frames = (u64::from(params.sample_rate) * chunk_ms / 1_000).max(1);
        Self {
            sample_rate: params.sample_rate.max(1),
            channels,
            hz,
            chunk_frames: usize::try_from(chunk_frames).unwrap_or(usize::MAX),
        }
    }
}

impl FrameSource for ToneSource {
    fn frame_at(&mut self, time_us: i64) -> (Bytes, i64) {
        let rate = i64::from(self.sample_rate);
        let first_frame = time_us * rate / 1_000_000;
        let mut out = Vec::with_capacity(self.chunk_frames * self.channels * 4);
        for i in 0..self.chunk_frames as i64 {
            let t = (first_frame + i) as f64 / rate as f64;
            let v = (0.2 * (2.0 * std::f64::consts::PI * f64::from(self.hz) * t).sin()) as f32;
            for _ in 0..self.channels {
                out.extend_from_slice(&v.to_le_bytes());
            }
        }
        let step_us = self.chunk_frames as i64 * 1_000_000 / rate;
        (Bytes::from(out), step_us)
    }
}

/// Video frames carrying only their frame number.
pub struct PatternSource {
    frame_us: i64,
}

impl PatternSource {
    pub fn new(fps: u32) -> Self {
        Self {
            frame_us: 1_000_000 / i64::from(fps.max(1)),
        }
    }
}

impl FrameSource for PatternSource {
    fn frame_at(&mut self, time_us: i64) -> (Bytes, i64) {
        let index = (time_us / self.frame_us) as u64;
        (Bytes::copy_from_slice(&index.to_le_bytes()), self.frame_us)
    }
}

/// Frame number encoded by [`PatternSource`].
pub fn pattern_index(frame: &MediaBuffer) -> Option<u64> {
    let bytes: [u8; 8] = frame.data.get(..8)?.try_into().ok()?;
    Some(u64::from_le_bytes(bytes))
}

/// Display stand-in that counts released frames.
pub struct FrameCounter {
    shown: Arc<AtomicU64>,
}

impl FrameCounter {
    pub fn new(shown: Arc<AtomicU64>) -> Self {
        Self { shown }
    }
}

impl VideoOutput for FrameCounter {
    fn render(&mut self, frame: &MediaBuffer) {
        self.shown.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(index = ?pattern_index(frame), time_us = frame.time_us, "frame shown");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use media_renderer::{AudioSink, RendererEvent, RendererOptions, SinkError, spawn_renderer};
    use std::sync::Mutex;

    fn params(rate: u32, channels: usize) -> SinkParams {
        SinkParams {
            sample_rate: rate,
            frame_size: channels * 4,
            buffer_frames: rate / 10,
        }
    }

    #[test]
    fn tone_chunk_has_expected_shape() {
        let mut tone = ToneSource::new(&params(48_000, 2), 440.0, 20);
        let (data, step) = tone.frame_at(0);
        assert_eq!(data.len(), 960 * 2 * 4);
        assert_eq!(step, 20_000);
        let first = f32::from_le_bytes([data[0], data[1], data[2], data[3]]);
        assert_eq!(first, 0.0);
    }

    #[test]
    fn tone_is_continuous_across_chunks() {
        let mut tone = ToneSource::new(&params(1_000, 1), 50.0, 10);
        let (a, step) = tone.frame_at(0);
        let (b, _) = tone.frame_at(step);
        let mut whole = ToneSource::new(&params(1_000, 1), 50.0, 20);
        let (c, _) = whole.frame_at(0);
        let joined: Vec<u8> = a.iter().chain(b.iter()).copied().collect();
        assert_eq!(joined, c.to_vec());
    }

    #[test]
    fn pattern_frames_carry_their_index() {
        let mut pattern = PatternSource::new(25);
        let (data, step) = pattern.frame_at(120_000);
        assert_eq!(step, 40_000);
        assert_eq!(pattern_index(&MediaBuffer::new(data, 120_000)), Some(3));
        assert_eq!(pattern_index(&MediaBuffer::new(Bytes::new(), 0)), None);
    }

    #[test]
    fn seek_releases_hold_and_moves_target() {
        let control = SourceControl::new();
        control.hold();
        assert!(control.is_held());
        let before = control.epoch();
        control.seek(3_000_000);
        assert!(!control.is_held());
        assert_eq!(control.epoch(), before + 1);
        assert_eq!(control.seek_target(), 3_000_000);
    }

    struct InstantSink {
        written: Mutex<u64>,
    }

    impl AudioSink for InstantSink {
        fn sample_rate(&self) -> u32 {
            1_000
        }
        fn frame_size(&self) -> usize {
            4
        }
        fn buffer_frames(&self) -> u32 {
            1_000
        }
        fn played_frames(&self) -> Result<u64, SinkError> {
            Ok(*self.written.lock().unwrap())
        }
        fn latency_us(&self) -> i64 {
            0
        }
        fn write(&self, data: &[u8]) -> Result<usize, SinkError> {
            *self.written.lock().unwrap() += (data.len() / 4) as u64;
            Ok(data.len())
        }
        fn start(&self) {}
        fn pause(&self) {}
        fn flush(&self) {
            *self.written.lock().unwrap() = 0;
        }
    }

    #[test]
    fn tone_producer_runs_to_end_of_stream() {
        let sink = Arc::new(InstantSink {
            written: Mutex::new(0),
        });
        let (tx, rx) = crossbeam_channel::unbounded();
        let renderer = spawn_renderer(sink.clone(), tx, RendererOptions::default()).unwrap();
        renderer.set_media_presence(StreamKind::Audio, true);

        let control = Arc::new(SourceControl::new());
        let tone = ToneSource::new(&SinkParams::read(&*sink), 100.0, 20);
        let producer = spawn_producer(
            renderer.handle(),
            ProducerSpec {
                stream: StreamKind::Audio,
                duration_us: 200_000,
                max_in_flight: 4,
            },
            control.clone(),
            tone,
        )
        .unwrap();

        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        let mut eos = None;
        while eos.is_none() && std::time::Instant::now() < deadline {
            if let Ok(RendererEvent::Eos { stream, status }) =
                rx.recv_timeout(Duration::from_millis(50))
            {
                eos = Some((stream, status));
            }
        }
        assert_eq!(eos, Some((StreamKind::Audio, FinalStatus::EndOfStream)));

        control.stop();
        let report = producer.join().unwrap();
        assert_eq!(report.queued, 10);
        assert_eq!(report.rendered, 10);
        assert_eq!(*sink.written.lock().unwrap(), 200);
        renderer.shutdown();
    }
}
