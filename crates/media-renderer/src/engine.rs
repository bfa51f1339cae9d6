//! Renderer state and message handlers.
//!
//! [`RendererCore`] is owned by the worker thread and is only ever touched
//! from there. Handlers never block on anything but the audio sink; delayed
//! work is expressed as [`Post`]s that the dispatcher turns into timers.

use std::ops::ControlFlow;
use std::sync::Arc;

use crossbeam_channel::Sender;
use renderer_types::{AckStatus, FinalStatus, RendererEvent, StatsEvent, StreamKind};

use crate::anchor::PlaybackAnchor;
use crate::clock::Clock;
use crate::config::RendererConfig;
use crate::delay::DelayInjector;
use crate::dispatcher::{Message, Post};
use crate::entry::{ConsumeAck, MediaBuffer, QueueEntry};
use crate::flush::FlushFlags;
use crate::reporter::{LateReporter, PositionReporter};
use crate::sink::{AudioSink, SinkParams, StatsCollector, VideoOutput};
use crate::stream::StreamQueue;
use crate::sync::{StartSync, audio_leads_too_far};

pub(crate) struct RendererCore {
    clock: Arc<dyn Clock>,
    pub(crate) config: RendererConfig,
    pub(crate) sink: Arc<dyn AudioSink>,
    pub(crate) sink_params: SinkParams,
    pub(crate) video_output: Option<Box<dyn VideoOutput>>,
    notify: Sender<RendererEvent>,
    stats: Option<Arc<dyn StatsCollector>>,
    flags: Arc<FlushFlags>,
    pub(crate) audio: StreamQueue,
    pub(crate) video: StreamQueue,
    pub(crate) anchor: PlaybackAnchor,
    /// Bytes accepted by the sink since its last flush.
    pub(crate) bytes_written: u64,
    pub(crate) has_audio: bool,
    pub(crate) has_video: bool,
    pub(crate) sync: StartSync,
    pub(crate) paused: bool,
    pub(crate) seek_time_us: Option<i64>,
    pub(crate) position: PositionReporter,
    pub(crate) late: LateReporter,
    pub(crate) delay: DelayInjector,
    posts: Vec<Post>,
}

impl RendererCore {
    pub(crate) fn new(
        clock: Arc<dyn Clock>,
        config: RendererConfig,
        sink: Arc<dyn AudioSink>,
        video_output: Option<Box<dyn VideoOutput>>,
        notify: Sender<RendererEvent>,
        flags: Arc<FlushFlags>,
    ) -> Self {
        let sink_params = SinkParams::read(sink.as_ref());
        tracing::info!(
            rate_hz = sink_params.sample_rate,
            frame_size = sink_params.frame_size,
            buffer_frames = sink_params.buffer_frames,
            "renderer audio sink"
        );
        Self {
            clock,
            position: PositionReporter::new(config.min_position_update_interval_us),
            late: LateReporter::new(config.late_report_interval_us),
            config,
            sink,
            sink_params,
            video_output,
            notify,
            stats: None,
            flags,
            audio: StreamQueue::default(),
            video: StreamQueue::default(),
            anchor: PlaybackAnchor::default(),
            bytes_written: 0,
            has_audio: false,
            has_video: false,
            sync: StartSync::default(),
            paused: false,
            seek_time_us: None,
            delay: DelayInjector::default(),
            posts: Vec::new(),
        }
    }

    pub(crate) fn now_us(&self) -> i64 {
        self.clock.now_us()
    }

    pub(crate) fn take_posts(&mut self) -> Vec<Post> {
        std::mem::take(&mut self.posts)
    }

    pub(crate) fn post(&mut self, delay_us: i64, msg: Message) {
        self.posts.push(Post { delay_us, msg });
    }

    pub(crate) fn handle(&mut self, msg: Message) -> ControlFlow<()> {
        match msg {
            Message::DrainAudio { generation } => self.on_drain_audio(generation),
            Message::DrainVideo { generation } => self.on_drain_video(generation),
            Message::QueueBuffer { stream, buffer, ack } => {
                self.on_queue_buffer(stream, buffer, ack)
            }
            Message::QueueEos { stream, status } => self.on_queue_eos(stream, status),
            Message::Flush { stream } => self.on_flush(stream),
            Message::TimeDiscontinuity => self.on_time_discontinuity(),
            Message::AudioSinkChanged => self.on_audio_sink_changed(),
            Message::Pause => self.on_pause(),
            Message::Resume => self.on_resume(),
            Message::SeekPosition { time_us } => self.on_seek_position(time_us),
            Message::QueueDelay {
                delay_us,
                requested_at_us,
            } => {
                tracing::debug!(delay_us, requested_at_us, "delay armed for next buffer");
                self.delay.arm(delay_us, requested_at_us);
            }
            Message::RegisterStats(stats) => self.stats = Some(stats),
            Message::SetMediaPresence { stream, present } => {
                self.on_set_media_presence(stream, present)
            }
            Message::Shutdown => return ControlFlow::Break(()),
        }
        ControlFlow::Continue(())
    }

    pub(crate) fn queue_mut(&mut self, stream: StreamKind) -> &mut StreamQueue {
        match stream {
            StreamKind::Audio => &mut self.audio,
            StreamKind::Video => &mut self.video,
        }
    }

    fn mark_present(&mut self, stream: StreamKind) {
        match stream {
            StreamKind::Audio => self.has_audio = true,
            StreamKind::Video => self.has_video = true,
        }
    }

    fn on_queue_buffer(&mut self, stream: StreamKind, buffer: MediaBuffer, ack: ConsumeAck) {
        if self.flags.is_flushing(stream) {
            tracing::trace!(
                stream = %stream,
                time_us = buffer.time_us,
                "dropping buffer queued during flush"
            );
            ack.fire(AckStatus::Cancelled);
            return;
        }
        self.mark_present(stream);

        let visible_at_us = self.delay.take_visible_at();
        if let Some(at) = visible_at_us {
            tracing::debug!(stream = %stream, visible_at_us = at, "holding delayed buffer");
        }
        self.record(StatsEvent::BufferQueued {
            stream,
            media_time_us: buffer.time_us,
        });
        self.queue_mut(stream)
            .push(QueueEntry::buffer(buffer, ack, visible_at_us));

        self.trim_leading_audio();
        self.kick_drains();
    }

    fn on_queue_eos(&mut self, stream: StreamKind, status: FinalStatus) {
        if self.flags.is_flushing(stream) {
            tracing::trace!(stream = %stream, "dropping end of stream queued during flush");
            return;
        }
        if self.sync.disarm() {
            tracing::debug!(stream = %stream, "end of stream queued before start sync completed");
        }
        self.queue_mut(stream).push(QueueEntry::eos(status, None));
        self.kick_drains();
    }

    fn on_flush(&mut self, stream: StreamKind) {
        let queue = self.queue_mut(stream);
        let cancelled = queue.flush();
        let generation = queue.generation();
        match stream {
            StreamKind::Audio => {
                self.sink.flush();
                self.bytes_written = 0;
            }
            StreamKind::Video => self.late.reset(),
        }
        self.sync.disarm();
        self.record(StatsEvent::Flushed { stream, cancelled });
        self.flags.finish(stream);
        tracing::info!(
            stream = %stream,
            cancelled,
            generation,
            "flush complete"
        );
        self.emit(RendererEvent::FlushComplete { stream });
        self.kick_drains();
    }

    fn on_time_discontinuity(&mut self) {
        if !self.audio.is_empty() || !self.video.is_empty() {
            tracing::warn!(
                audio_queued = self.audio.len(),
                video_queued = self.video.len(),
                "time discontinuity with entries still queued"
            );
        }
        self.anchor.invalidate();
        self.sync.arm();
        self.position.reset();
        self.late.reset();
        tracing::debug!("time discontinuity");
    }

    fn on_audio_sink_changed(&mut self) {
        self.sink_params = SinkParams::read(self.sink.as_ref());
        self.bytes_written = 0;
        tracing::info!(
            rate_hz = self.sink_params.sample_rate,
            frame_size = self.sink_params.frame_size,
            buffer_frames = self.sink_params.buffer_frames,
            "audio sink changed"
        );
    }

    fn on_pause(&mut self) {
        if self.paused {
            return;
        }
        let now = self.now_us();
        self.anchor.freeze(now);
        self.paused = true;
        self.sink.pause();
        tracing::info!(position_us = ?self.position_us(now), "paused");
    }

    fn on_resume(&mut self) {
        if !self.paused {
            return;
        }
        let now = self.now_us();
        self.anchor.thaw(now);
        self.paused = false;
        self.sink.start();
        tracing::info!(position_us = ?self.position_us(now), "resumed");
        self.position.request_immediate();
        self.notify_position(false);
        self.kick_drains();
    }

    fn on_seek_position(&mut self, time_us: i64) {
        self.seek_time_us = Some(time_us);
        self.anchor.invalidate();
        tracing::debug!(time_us, "seek position");
        self.position.request_immediate();
        self.notify_position(false);
    }

    fn on_set_media_presence(&mut self, stream: StreamKind, present: bool) {
        match stream {
            StreamKind::Audio => self.has_audio = present,
            StreamKind::Video => self.has_video = present,
        }
        tracing::debug!(stream = %stream, present, "media presence");
        self.kick_drains();
    }

    /// Drop audio that starts well before the first video frame.
    fn trim_leading_audio(&mut self) {
        if !self.sync.is_active(self.has_audio, self.has_video) {
            return;
        }
        let Some(video_front_us) = self.video.front().and_then(QueueEntry::media_time_us) else {
            return;
        };
        while let Some(audio_front_us) = self.audio.front().and_then(QueueEntry::media_time_us) {
            let max_lead_us = self.config.sync_max_audio_lead_us;
            if !audio_leads_too_far(audio_front_us, video_front_us, max_lead_us) {
                break;
            }
            if let Some(entry) = self.audio.pop() {
                tracing::debug!(
                    audio_time_us = audio_front_us,
                    video_time_us = video_front_us,
                    "dropping audio that starts before first video"
                );
                entry.finish(AckStatus::Dropped);
            }
        }
    }

    pub(crate) fn audio_held(&self) -> bool {
        self.sync
            .holds_audio(self.has_audio, self.has_video, !self.video.is_empty())
    }

    pub(crate) fn video_held(&self) -> bool {
        self.sync.holds_video(self.has_audio, self.has_video)
    }

    /// Post drain ticks for every stream that has work and is allowed to run.
    pub(crate) fn kick_drains(&mut self) {
        if !self.audio.is_empty() {
            self.post_drain_audio(0);
        }
        self.post_drain_video();
    }

    pub(crate) fn post_drain_audio(&mut self, delay_us: i64) {
        if self.audio.drain_pending || self.paused || self.audio_held() {
            return;
        }
        self.audio.drain_pending = true;
        let generation = self.audio.generation();
        self.post(delay_us, Message::DrainAudio { generation });
    }

    pub(crate) fn post_drain_video(&mut self) {
        if self.video.drain_pending || self.paused || self.video_held() {
            return;
        }
        let now = self.now_us();
        let Some(front) = self.video.front() else {
            return;
        };
        let delay_us = match (front.hidden_until(now), front.media_time_us()) {
            (Some(at), _) => at - now,
            (None, Some(media_us)) => self
                .anchor
                .real_time_for(media_us)
                .map_or(0, |real_us| (real_us - now).max(0)),
            (None, None) => 0,
        };
        self.video.drain_pending = true;
        let generation = self.video.generation();
        self.post(delay_us, Message::DrainVideo { generation });
    }

    pub(crate) fn position_us(&self, now_us: i64) -> Option<i64> {
        self.anchor.position_us(now_us).or(self.seek_time_us)
    }

    pub(crate) fn notify_position(&mut self, force: bool) {
        let now = self.now_us();
        let Some(position_us) = self.position_us(now) else {
            return;
        };
        if !self.position.should_emit(now, force) {
            return;
        }
        tracing::trace!(position_us, "position");
        self.emit(RendererEvent::Position { position_us });
    }

    pub(crate) fn notify_eos(&mut self, stream: StreamKind, status: FinalStatus) {
        self.notify_position(true);
        tracing::info!(stream = %stream, status = ?status, "end of stream");
        self.emit(RendererEvent::Eos { stream, status });
    }

    pub(crate) fn emit(&self, event: RendererEvent) {
        if self.notify.send(event).is_err() {
            tracing::trace!(?event, "renderer owner gone; event dropped");
        }
    }

    pub(crate) fn record(&self, event: StatsEvent) {
        if let Some(stats) = &self.stats {
            stats.record(event);
        }
    }

    /// Cancel everything still queued. Called once when the worker exits.
    pub(crate) fn shutdown(&mut self) {
        let audio = self.audio.flush();
        let video = self.video.flush();
        let delay_pending = self.delay.is_pending();
        self.delay.clear();
        tracing::info!(
            audio_cancelled = audio,
            video_cancelled = video,
            delay_pending,
            "renderer stopped"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{Sim, ack_log};
    use renderer_types::RendererEvent;

    #[test]
    fn flush_cancels_queued_audio_and_bumps_generation() {
        let mut sim = Sim::new();
        sim.core.paused = true;
        let (log, ack) = ack_log();
        for i in 0..3u32 {
            sim.queue(StreamKind::Audio, 100, i64::from(i) * 100_000, ack(i));
        }
        assert_eq!(sim.core.audio.len(), 3);
        assert_eq!(sim.core.audio.generation(), 0);

        sim.flush(StreamKind::Audio);

        assert_eq!(sim.core.audio.len(), 0);
        assert_eq!(sim.core.audio.generation(), 1);
        assert_eq!(
            log.statuses(),
            vec![AckStatus::Cancelled, AckStatus::Cancelled, AckStatus::Cancelled]
        );
        assert!(!sim.handle_flags().is_flushing(StreamKind::Audio));
        assert_eq!(sim.sink.flushes(), 1);
        assert!(sim
            .events()
            .contains(&RendererEvent::FlushComplete { stream: StreamKind::Audio }));
    }

    #[test]
    fn stale_tick_after_flush_does_nothing() {
        let mut sim = Sim::new();
        sim.set_presence(StreamKind::Video, false);
        let (log, ack) = ack_log();
        sim.queue(StreamKind::Audio, 100, 0, ack(0));
        let posted = sim.pending_timers();
        assert_eq!(posted, 1);

        // Flush while the tick is still scheduled, then queue fresh data.
        sim.flush(StreamKind::Audio);
        sim.core.paused = true;
        sim.queue(StreamKind::Audio, 100, 0, ack(1));
        let writes_before = sim.sink.writes();

        // Run the stale tick only.
        let stale = sim.core.audio.generation() - 1;
        sim.send(Message::DrainAudio { generation: stale });

        assert_eq!(sim.sink.writes(), writes_before);
        assert_eq!(sim.core.audio.len(), 1);
        // Only the original, now stale, timer remains.
        assert_eq!(sim.pending_timers(), 1);
        assert_eq!(log.statuses(), vec![AckStatus::Cancelled]);
    }

    #[test]
    fn buffers_queued_while_flag_set_are_cancelled() {
        let mut sim = Sim::new();
        let (log, ack) = ack_log();
        sim.handle_flags().begin(StreamKind::Video);
        sim.queue(StreamKind::Video, 10, 0, ack(0));
        assert_eq!(sim.core.video.len(), 0);
        assert_eq!(log.statuses(), vec![AckStatus::Cancelled]);
    }

    #[test]
    fn back_to_back_flushes_reject_buffers_until_the_last_completes() {
        let mut sim = Sim::new();
        sim.core.paused = true;
        let (log, ack) = ack_log();
        sim.handle_flags().begin(StreamKind::Audio);
        sim.handle_flags().begin(StreamKind::Audio);

        sim.send(Message::Flush {
            stream: StreamKind::Audio,
        });
        assert!(sim.handle_flags().is_flushing(StreamKind::Audio));
        sim.queue(StreamKind::Audio, 100, 0, ack(0));
        assert_eq!(sim.core.audio.len(), 0);
        assert_eq!(log.tagged(), vec![(0, AckStatus::Cancelled)]);

        sim.send(Message::Flush {
            stream: StreamKind::Audio,
        });
        assert!(!sim.handle_flags().is_flushing(StreamKind::Audio));
        sim.queue(StreamKind::Audio, 100, 0, ack(1));
        assert_eq!(sim.core.audio.len(), 1);
        let completions = sim
            .events()
            .into_iter()
            .filter(|e| matches!(e, RendererEvent::FlushComplete { .. }))
            .count();
        assert_eq!(completions, 2);
    }

    #[test]
    fn pause_then_resume_keeps_position() {
        let mut sim = Sim::new();
        let now = sim.now();
        sim.core.anchor.set(500_000, now);
        sim.advance(200_000);
        let before = sim.core.position_us(sim.now());
        sim.send(Message::Pause);
        sim.send(Message::Resume);
        assert_eq!(sim.core.position_us(sim.now()), before);
        assert_eq!(before, Some(700_000));
        assert_eq!(sim.positions().last().copied(), Some(700_000));
    }

    #[test]
    fn paused_position_is_frozen() {
        let mut sim = Sim::new();
        let now = sim.now();
        sim.core.anchor.set(0, now);
        sim.advance(100_000);
        sim.send(Message::Pause);
        sim.advance(5_000_000);
        assert_eq!(sim.core.position_us(sim.now()), Some(100_000));
        assert!(sim.sink.is_paused());
        sim.send(Message::Resume);
        sim.advance(50_000);
        assert_eq!(sim.core.position_us(sim.now()), Some(150_000));
        assert!(!sim.sink.is_paused());
    }

    #[test]
    fn seek_reports_target_immediately() {
        let mut sim = Sim::new();
        let now = sim.now();
        sim.core.anchor.set(0, now);
        sim.send(Message::SeekPosition { time_us: 0 });
        sim.events();
        sim.advance(1_000);
        sim.send(Message::SeekPosition { time_us: 42_000_000 });
        assert_eq!(sim.positions(), vec![42_000_000]);
        assert!(!sim.core.anchor.is_set());
    }

    #[test]
    fn discontinuity_invalidates_anchor_and_rearms_sync() {
        let mut sim = Sim::new();
        sim.core.anchor.set(1, 1);
        sim.core.sync.disarm();
        sim.send(Message::TimeDiscontinuity);
        assert!(!sim.core.anchor.is_set());
        assert!(sim.core.sync.is_active(true, true));
    }

    #[test]
    fn sink_change_rereads_params() {
        let mut sim = Sim::new();
        sim.core.bytes_written = 500;
        sim.sink.set_sample_rate(2_000);
        sim.send(Message::AudioSinkChanged);
        assert_eq!(sim.core.sink_params.sample_rate, 2_000);
        assert_eq!(sim.core.bytes_written, 0);
    }

    #[test]
    fn stats_collector_receives_records() {
        let mut sim = Sim::new();
        let stats = sim.register_stats();
        let (_log, ack) = ack_log();
        sim.core.paused = true;
        sim.queue(StreamKind::Audio, 10, 7, ack(0));
        sim.flush(StreamKind::Audio);
        let records = stats.records();
        assert!(records.contains(&StatsEvent::BufferQueued {
            stream: StreamKind::Audio,
            media_time_us: 7
        }));
        assert!(records.contains(&StatsEvent::Flushed {
            stream: StreamKind::Audio,
            cancelled: 1
        }));
    }

    #[test]
    fn shutdown_cancels_everything() {
        let mut sim = Sim::new();
        sim.core.paused = true;
        let (log, ack) = ack_log();
        sim.queue(StreamKind::Audio, 10, 0, ack(0));
        sim.queue(StreamKind::Video, 10, 0, ack(1));
        assert!(sim.core.handle(Message::Shutdown).is_break());
        sim.core.shutdown();
        assert_eq!(log.statuses(), vec![AckStatus::Cancelled, AckStatus::Cancelled]);
    }
}
