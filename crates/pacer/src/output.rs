//! cpal output stream fed from [`SharedAudio`].
//!
//! The callback never blocks: it takes whatever is queued and pads the rest with
//! silence. Played frames are counted by the queue itself.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use anyhow::{Result, anyhow};
use cpal::traits::DeviceTrait;

use crate::queue::SharedAudio;

/// Counters shared between the callback and the sink.
#[derive(Debug, Default)]
pub struct OutputCounters {
    /// When set, the callback outputs silence and does not drain the queue.
    pub paused: AtomicBool,
    pub underrun_frames: AtomicU64,
    pub underrun_events: AtomicU64,
}

pub fn build_output_stream(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    sample_format: cpal::SampleFormat,
    queue: Arc<SharedAudio>,
    counters: Arc<OutputCounters>,
) -> Result<cpal::Stream> {
    match sample_format {
        cpal::SampleFormat::F32 => build_stream::<f32>(device, config, queue, counters),
        cpal::SampleFormat::I16 => build_stream::<i16>(device, config, queue, counters),
        cpal::SampleFormat::I32 => build_stream::<i32>(device, config, queue, counters),
        cpal::SampleFormat::U16 => build_stream::<u16>(device, config, queue, counters),
        other => Err(anyhow!("Unsupported sample format: {other:?}")),
    }
}

fn build_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    queue: Arc<SharedAudio>,
    counters: Arc<OutputCounters>,
) -> Result<cpal::Stream>
where
    T: cpal::Sample + cpal::SizedSample + cpal::FromSample<f32> + Send + 'static,
{
    let channels = usize::from(config.channels).max(1);
    let silence = <T as cpal::Sample>::from_sample::<f32>(0.0);
    let mut scratch: Vec<f32> = Vec::new();

    let err_fn = |err| tracing::warn!("stream error: {err}");

    let stream = device.build_output_stream(
        config,
        move |data: &mut [T], _| {
            if counters.paused.load(Ordering::Relaxed) {
                data.fill(silence);
                return;
            }

            scratch.resize(data.len(), 0.0);
            let got = queue.pop_into(&mut scratch);
            for (dst, src) in data.iter_mut().zip(&scratch[..got]) {
                *dst = <T as cpal::Sample>::from_sample::<f32>(*src);
            }
            if got < data.len() {
                data[got..].fill(silence);
                counters.underrun_events.fetch_add(1, Ordering::Relaxed);
                counters
                    .underrun_frames
                    .fetch_add(((data.len() - got) / channels) as u64, Ordering::Relaxed);
            }
        },
        err_fn,
        None,
    )?;

    Ok(stream)
}
