use std::sync::atomic::{AtomicU64, Ordering};

use media_renderer::{FinalStatus, RendererEvent, StatsCollector, StatsEvent, StreamKind};

/// Renderer statistics tallied from [`StatsEvent`] records.
#[derive(Debug, Default)]
pub struct StatsCounter {
    audio_buffers_queued: AtomicU64,
    video_buffers_queued: AtomicU64,
    video_rendered: AtomicU64,
    video_dropped: AtomicU64,
    audio_bytes_requested: AtomicU64,
    audio_bytes_accepted: AtomicU64,
    short_writes: AtomicU64,
    flushes: AtomicU64,
    cancelled: AtomicU64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub audio_buffers_queued: u64,
    pub video_buffers_queued: u64,
    pub video_rendered: u64,
    pub video_dropped: u64,
    pub audio_bytes_requested: u64,
    pub audio_bytes_accepted: u64,
    pub short_writes: u64,
    pub flushes: u64,
    pub cancelled: u64,
}

impl StatsCounter {
    pub fn snapshot(&self) -> StatsSnapshot {
        let load = |v: &AtomicU64| v.load(Ordering::Relaxed);
        StatsSnapshot {
            audio_buffers_queued: load(&self.audio_buffers_queued),
            video_buffers_queued: load(&self.video_buffers_queued),
            video_rendered: load(&self.video_rendered),
            video_dropped: load(&self.video_dropped),
            audio_bytes_requested: load(&self.audio_bytes_requested),
            audio_bytes_accepted: load(&self.audio_bytes_accepted),
            short_writes: load(&self.short_writes),
            flushes: load(&self.flushes),
            cancelled: load(&self.cancelled),
        }
    }
}

impl StatsCollector for StatsCounter {
    fn record(&self, event: StatsEvent) {
        let bump = |v: &AtomicU64, n: u64| {
            v.fetch_add(n, Ordering::Relaxed);
        };
        match event {
            StatsEvent::BufferQueued { stream, .. } => match stream {
                StreamKind::Audio => bump(&self.audio_buffers_queued, 1),
                StreamKind::Video => bump(&self.video_buffers_queued, 1),
            },
            StatsEvent::VideoFrameRendered { .. } => bump(&self.video_rendered, 1),
            StatsEvent::VideoFrameDropped { .. } => bump(&self.video_dropped, 1),
            StatsEvent::AudioWrite {
                requested_bytes,
                accepted_bytes,
            } => {
                bump(&self.audio_bytes_requested, requested_bytes as u64);
                bump(&self.audio_bytes_accepted, accepted_bytes as u64);
                if accepted_bytes < requested_bytes {
                    bump(&self.short_writes, 1);
                }
            }
            StatsEvent::Flushed { cancelled, .. } => {
                bump(&self.flushes, 1);
                bump(&self.cancelled, cancelled as u64);
            }
        }
    }
}

/// What a `play` run observed, built from renderer events.
#[derive(Debug, Clone, Default)]
pub struct PlaybackSummary {
    pub last_position_us: Option<i64>,
    pub position_reports: u64,
    pub eos: Vec<(StreamKind, FinalStatus)>,
    pub flushes_completed: u64,
    pub late_reports: u64,
    pub late_by_us_total: i64,
    pub frames_shown: u64,
    pub underrun_frames: Option<u64>,
    pub stats: StatsSnapshot,
}

impl PlaybackSummary {
    pub fn apply(&mut self, event: &RendererEvent) {
        match *event {
            RendererEvent::Position { position_us } => {
                self.last_position_us = Some(position_us);
                self.position_reports += 1;
            }
            RendererEvent::Eos { stream, status } => self.eos.push((stream, status)),
            RendererEvent::FlushComplete { .. } => self.flushes_completed += 1,
            RendererEvent::VideoLateBy { late_by_us } => {
                self.late_reports += 1;
                self.late_by_us_total += late_by_us;
            }
        }
    }

    pub fn eos_count(&self) -> usize {
        self.eos.len()
    }

    pub fn log(&self) {
        tracing::info!(
            last_position_ms = ?self.last_position_us.map(|us| us / 1_000),
            position_reports = self.position_reports,
            frames_shown = self.frames_shown,
            video_rendered = self.stats.video_rendered,
            video_dropped = self.stats.video_dropped,
            late_by_ms_total = self.late_by_us_total / 1_000,
            short_writes = self.stats.short_writes,
            underrun_frames = ?self.underrun_frames,
            flushes = self.flushes_completed,
            "playback summary"
        );
        for (stream, status) in &self.eos {
            tracing::info!(stream = %stream, status = ?status, "end of stream");
        }
    }
}
