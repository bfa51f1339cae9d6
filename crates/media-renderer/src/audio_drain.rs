//! Audio drain scheduler.
//!
//! Each tick fills the sink's free headroom from the front of the audio queue
//! and reschedules itself after half of what is now buffered.

use renderer_types::{AckStatus, StatsEvent, StreamKind};

use crate::engine::RendererCore;
use crate::entry::Payload;
use crate::sink::SinkError;

#[derive(Debug, PartialEq, Eq)]
pub(crate) enum AudioTick {
    /// Run again after this many microseconds.
    Reschedule(i64),
    /// Nothing more for this generation until new work is queued.
    Idle,
}

impl RendererCore {
    pub(crate) fn on_drain_audio(&mut self, generation: u64) {
        if !self.audio.accepts(generation) {
            tracing::trace!(
                generation,
                current = self.audio.generation(),
                "stale audio tick"
            );
            return;
        }
        self.audio.drain_pending = false;
        if self.paused || self.audio_held() {
            return;
        }
        if let AudioTick::Reschedule(delay_us) = self.drain_audio_queue() {
            self.post_drain_audio(delay_us);
        }
    }

    pub(crate) fn drain_audio_queue(&mut self) -> AudioTick {
        let now = self.now_us();
        let poll_us = self.config.audio_poll_interval_us;
        let Some(front) = self.audio.front() else {
            return AudioTick::Reschedule(poll_us);
        };
        if let Some(at) = front.hidden_until(now) {
            return AudioTick::Reschedule(at - now);
        }

        let played = match self.sink.played_frames() {
            Ok(played) => played,
            Err(SinkError::NotReady) => {
                tracing::trace!("audio sink not ready");
                return AudioTick::Reschedule(poll_us);
            }
            Err(err) => {
                tracing::warn!(error = %err, "audio sink position unavailable");
                return AudioTick::Reschedule(poll_us);
            }
        };

        let params = self.sink_params;
        let frame_size = params.frame_size as u64;
        let mut pending_frames = (self.bytes_written / frame_size).saturating_sub(played);
        let mut budget = u64::from(params.buffer_frames).saturating_sub(pending_frames) * frame_size;
        let mut anchored = false;

        loop {
            let Some(entry) = self.audio.front() else {
                break;
            };
            if entry.hidden_until(now).is_some() {
                break;
            }
            if let Some(status) = entry.eos_status() {
                self.audio.pop();
                self.notify_eos(StreamKind::Audio, status);
                return AudioTick::Idle;
            }
            if budget == 0 {
                break;
            }
            let Payload::Buffer { buffer, .. } = &entry.payload else {
                break;
            };
            let offset = entry.offset;
            if offset >= buffer.len() {
                if let Some(done) = self.audio.pop() {
                    done.finish(AckStatus::Rendered);
                }
                continue;
            }
            let take = (buffer.len() - offset).min(usize::try_from(budget).unwrap_or(usize::MAX));
            let chunk = buffer.data.slice(offset..offset + take);
            let entry_time_us = buffer.time_us;
            let total = buffer.len();

            let anchor_real_us = now + params.frames_to_us(pending_frames) + self.sink.latency_us();
            let accepted = match self.sink.write(&chunk) {
                Ok(n) => n.min(chunk.len()),
                Err(err) => {
                    tracing::warn!(error = %err, requested = chunk.len(), "audio write failed");
                    return AudioTick::Reschedule(poll_us);
                }
            };
            self.record(StatsEvent::AudioWrite {
                requested_bytes: chunk.len(),
                accepted_bytes: accepted,
            });
            if accepted == 0 && !chunk.is_empty() {
                tracing::trace!(requested = chunk.len(), "audio sink busy");
                break;
            }

            if !anchored {
                anchored = true;
                self.anchor
                    .set(entry_time_us + params.bytes_to_us(offset), anchor_real_us);
                self.seek_time_us = None;
            }
            self.bytes_written += accepted as u64;
            pending_frames += accepted as u64 / frame_size;
            budget = budget.saturating_sub(accepted as u64);
            if self.sync.disarm() {
                tracing::debug!(
                    media_time_us = entry_time_us,
                    "first audio accepted; releasing video"
                );
                self.post_drain_video();
            }

            let consumed = offset + accepted;
            if consumed >= total {
                if let Some(done) = self.audio.pop() {
                    done.finish(AckStatus::Rendered);
                }
            } else {
                if let Some(entry) = self.audio.front_mut() {
                    entry.offset = consumed;
                }
                if accepted < take {
                    tracing::trace!(requested = take, accepted, "short audio write");
                }
                break;
            }
        }

        self.notify_position(false);
        let buffered_us = params.frames_to_us(pending_frames);
        AudioTick::Reschedule((buffered_us / 2).max(self.config.audio_min_reschedule_us))
    }
}
