//! [`AudioSink`] implementations for the host.

use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex, PoisonError};

use anyhow::{Context, Result};
use cpal::traits::{DeviceTrait, StreamTrait};
use media_renderer::{AudioSink, Clock, SinkError, SystemClock};

use crate::device;
use crate::output::{self, OutputCounters};
use crate::queue::SharedAudio;

const BYTES_PER_SAMPLE: usize = 4;

/// Interleaved little-endian `f32` bytes into samples, whole samples only.
pub fn decode_f32le(data: &[u8]) -> Vec<f32> {
    data.chunks_exact(BYTES_PER_SAMPLE)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect()
}

/// Sink writing into a cpal output stream.
///
/// The stream itself is not `Send` and stays with the caller of [`open_cpal_sink`].
pub struct CpalSink {
    queue: Arc<SharedAudio>,
    counters: Arc<OutputCounters>,
    sample_rate: u32,
    latency_us: i64,
}

impl CpalSink {
    pub fn counters(&self) -> &Arc<OutputCounters> {
        &self.counters
    }
}

impl AudioSink for CpalSink {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn frame_size(&self) -> usize {
        self.queue.channels() * BYTES_PER_SAMPLE
    }

    fn buffer_frames(&self) -> u32 {
        u32::try_from(self.queue.capacity_frames()).unwrap_or(u32::MAX)
    }

    fn played_frames(&self) -> Result<u64, SinkError> {
        Ok(self.queue.played_frames())
    }

    fn latency_us(&self) -> i64 {
        self.latency_us
    }

    fn write(&self, data: &[u8]) -> Result<usize, SinkError> {
        let samples = decode_f32le(data);
        Ok(self.queue.try_push(&samples) * BYTES_PER_SAMPLE)
    }

    fn start(&self) {
        self.counters.paused.store(false, Ordering::Relaxed);
    }

    fn pause(&self) {
        self.counters.paused.store(true, Ordering::Relaxed);
    }

    fn flush(&self) {
        let dropped = self.queue.clear();
        tracing::debug!(dropped_frames = dropped, "output queue flushed");
    }
}

/// Open the output device and start a stream fed by a [`CpalSink`].
pub fn open_cpal_sink(needle: Option<&str>, buffer_ms: u64) -> Result<(Arc<CpalSink>, cpal::Stream)> {
    let host = cpal::default_host();
    let device = device::pick_device(&host, needle)?;
    let desc = device.description().context("read device description")?;
    tracing::info!(device = %desc, "output device");

    let choice = device::pick_output(&device, 512)?;
    let rate = choice.stream.sample_rate;
    let channels = usize::from(choice.stream.channels);
    let capacity_frames = usize::try_from(u64::from(rate) * buffer_ms / 1_000).unwrap_or(usize::MAX);
    let latency_us = choice
        .callback_frames
        .map_or(0, |frames| i64::from(frames) * 1_000_000 / i64::from(rate.max(1)));
    tracing::info!(
        rate_hz = rate,
        channels,
        sample_format = ?choice.sample_format,
        callback_frames = ?choice.callback_frames,
        capacity_frames,
        "device output config"
    );

    let queue = Arc::new(SharedAudio::new(channels, capacity_frames));
    let counters = Arc::new(OutputCounters::default());
    let stream = output::build_output_stream(
        &device,
        &choice.stream,
        choice.sample_format,
        queue.clone(),
        counters.clone(),
    )?;
    stream.play().context("start output stream")?;

    let sink = Arc::new(CpalSink {
        queue,
        counters,
        sample_rate: rate,
        latency_us,
    });
    Ok((sink, stream))
}

#[derive(Debug)]
struct NullState {
    written: u64,
    played: u64,
    last_us: i64,
    paused: bool,
}

/// Sink that plays nothing but consumes frames at its sample rate.
pub struct NullSink {
    sample_rate: u32,
    channels: usize,
    buffer_frames: u32,
    clock: SystemClock,
    state: Mutex<NullState>,
}

impl NullSink {
    pub fn new(sample_rate: u32, channels: usize, buffer_ms: u64) -> Self {
        let clock = SystemClock::new();
        let last_us = clock.now_us();
        Self {
            sample_rate,
            channels: channels.max(1),
            buffer_frames: u32::try_from(u64::from(sample_rate) * buffer_ms / 1_000).unwrap_or(u32::MAX),
            clock,
            state: Mutex::new(NullState {
                written: 0,
                played: 0,
                last_us,
                paused: false,
            }),
        }
    }

    fn with_state<R>(&self, f: impl FnOnce(&mut NullState) -> R) -> R {
        let mut st = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let now = self.clock.now_us();
        if !st.paused {
            let elapsed = u64::try_from(now - st.last_us).unwrap_or(0);
            let frames = elapsed * u64::from(self.sample_rate) / 1_000_000;
            if frames > 0 {
                st.played = (st.played + frames).min(st.written);
                st.last_us = now;
            }
        } else {
            st.last_us = now;
        }
        f(&mut st)
    }
}

impl AudioSink for NullSink {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn frame_size(&self) -> usize {
        self.channels * BYTES_PER_SAMPLE
    }

    fn buffer_frames(&self) -> u32 {
        self.buffer_frames
    }

    fn played_frames(&self) -> Result<u64, SinkError> {
        Ok(self.with_state(|st| st.played))
    }

    fn latency_us(&self) -> i64 {
        0
    }

    fn write(&self, data: &[u8]) -> Result<usize, SinkError> {
        let frame_size = self.frame_size();
        let buffer_frames = u64::from(self.buffer_frames);
        Ok(self.with_state(|st| {
            let free = buffer_frames.saturating_sub(st.written - st.played);
            let frames = (data.len() / frame_size).min(usize::try_from(free).unwrap_or(usize::MAX));
            st.written += frames as u64;
            frames * frame_size
        }))
    }

    fn start(&self) {
        self.with_state(|st| st.paused = false);
    }

    fn pause(&self) {
        self.with_state(|st| st.paused = true);
    }

    fn flush(&self) {
        self.with_state(|st| {
            st.written = 0;
            st.played = 0;
        });
    }
}
