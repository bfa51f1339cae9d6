//! Bounded interleaved-sample queue between the renderer's audio writes and the
//! cpal callback.
//!
//! Both sides are non-blocking: the writer is told how many frames fit, the
//! callback takes what is there and pads the rest with silence. The played
//! frame count lives under the same lock as the samples, so a clear can never
//! race with a callback crediting frames that were already discarded.

use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};

#[derive(Debug, Default)]
struct Ring {
    samples: VecDeque<f32>,
    played_frames: u64,
}

pub struct SharedAudio {
    channels: usize,
    capacity_samples: usize,
    inner: Mutex<Ring>,
}

impl SharedAudio {
    pub fn new(channels: usize, capacity_frames: usize) -> Self {
        let channels = channels.max(1);
        Self {
            channels,
            capacity_samples: capacity_frames.saturating_mul(channels),
            inner: Mutex::new(Ring {
                samples: VecDeque::with_capacity(capacity_frames * channels),
                played_frames: 0,
            }),
        }
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    pub fn capacity_frames(&self) -> usize {
        self.capacity_samples / self.channels
    }

    pub fn len_frames(&self) -> usize {
        self.lock().samples.len() / self.channels
    }

    /// Frames handed to the device since the last [`SharedAudio::clear`].
    pub fn played_frames(&self) -> u64 {
        self.lock().played_frames
    }

    /// Push as many whole frames of `samples` as fit and return the samples taken.
    pub fn try_push(&self, samples: &[f32]) -> usize {
        let mut ring = self.lock();
        let free = self.capacity_samples.saturating_sub(ring.samples.len());
        let take = samples.len().min(free) / self.channels * self.channels;
        ring.samples.extend(&samples[..take]);
        take
    }

    /// Fill `out` from the queue, count the whole frames taken as played, and
    /// return the samples copied; the rest of `out` is untouched.
    pub fn pop_into(&self, out: &mut [f32]) -> usize {
        let mut ring = self.lock();
        let n = out.len().min(ring.samples.len());
        for (dst, src) in out.iter_mut().zip(ring.samples.drain(..n)) {
            *dst = src;
        }
        ring.played_frames += (n / self.channels) as u64;
        n
    }

    /// Drop everything buffered and restart the played count; returns the frames discarded.
    pub fn clear(&self) -> usize {
        let mut ring = self.lock();
        let frames = ring.samples.len() / self.channels;
        ring.samples.clear();
        ring.played_frames = 0;
        frames
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Ring> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
