//! Public renderer surface.
//!
//! [`spawn_renderer`] starts the worker thread and returns a [`Renderer`] that
//! owns it. Producers and controllers talk to the worker through cloneable
//! [`RendererHandle`]s; every call is a non-blocking channel send except the
//! flush-flag check.

use std::ops::Deref;
use std::sync::Arc;
use std::thread::JoinHandle;

use anyhow::{Context, Result};
use crossbeam_channel::Sender;
use renderer_types::{AckStatus, FinalStatus, RendererEvent, StreamKind};

use crate::clock::{Clock, SystemClock};
use crate::config::RendererConfig;
use crate::dispatcher::{self, Message};
use crate::engine::RendererCore;
use crate::entry::{ConsumeAck, MediaBuffer};
use crate::flush::FlushFlags;
use crate::sink::{AudioSink, StatsCollector, VideoOutput};

/// Cloneable sender side of a running renderer.
#[derive(Clone)]
pub struct RendererHandle {
    tx: Sender<Message>,
    flags: Arc<FlushFlags>,
    clock: Arc<dyn Clock>,
}

impl RendererHandle {
    /// Queue a decoded buffer. While `stream` is flushing the buffer is
    /// released immediately with [`AckStatus::Cancelled`].
    pub fn queue_buffer(&self, stream: StreamKind, buffer: MediaBuffer, ack: ConsumeAck) {
        if self.flags.is_flushing(stream) {
            ack.fire(AckStatus::Cancelled);
            return;
        }
        self.send(Message::QueueBuffer { stream, buffer, ack });
    }

    /// Queue the end-of-stream marker. Ignored while `stream` is flushing.
    pub fn queue_eos(&self, stream: StreamKind, status: FinalStatus) {
        if self.flags.is_flushing(stream) {
            tracing::debug!(stream = %stream, "end of stream ignored during flush");
            return;
        }
        self.send(Message::QueueEos { stream, status });
    }

    /// Start flushing `stream`. Completion is reported as
    /// [`RendererEvent::FlushComplete`].
    pub fn flush(&self, stream: StreamKind) {
        self.flags.begin(stream);
        self.send(Message::Flush { stream });
    }

    pub fn is_flushing(&self, stream: StreamKind) -> bool {
        self.flags.is_flushing(stream)
    }

    pub fn signal_time_discontinuity(&self) {
        self.send(Message::TimeDiscontinuity);
    }

    pub fn signal_audio_sink_changed(&self) {
        self.send(Message::AudioSinkChanged);
    }

    pub fn pause(&self) {
        self.send(Message::Pause);
    }

    pub fn resume(&self) {
        self.send(Message::Resume);
    }

    pub fn notify_seek_position(&self, time_us: i64) {
        self.send(Message::SeekPosition { time_us });
    }

    /// Hold the next queued buffer until `delay_us` after this call.
    pub fn queue_delay(&self, delay_us: i64) {
        let requested_at_us = self.clock.now_us();
        self.send(Message::QueueDelay {
            delay_us,
            requested_at_us,
        });
    }

    pub fn register_stats(&self, stats: Arc<dyn StatsCollector>) {
        self.send(Message::RegisterStats(stats));
    }

    pub fn set_media_presence(&self, stream: StreamKind, present: bool) {
        self.send(Message::SetMediaPresence { stream, present });
    }

    fn send(&self, msg: Message) {
        let kind = msg.kind();
        if self.tx.send(msg).is_err() {
            tracing::trace!(message = kind, "renderer stopped; message dropped");
        }
    }
}

/// Construction options beyond the sink and the event channel.
pub struct RendererOptions {
    pub config: RendererConfig,
    pub video_output: Option<Box<dyn VideoOutput>>,
    /// Defaults to a [`SystemClock`].
    pub clock: Option<Arc<dyn Clock>>,
}

impl Default for RendererOptions {
    fn default() -> Self {
        Self {
            config: RendererConfig::default(),
            video_output: None,
            clock: None,
        }
    }
}

/// Owner of the renderer worker. Dropping it shuts the worker down.
pub struct Renderer {
    handle: RendererHandle,
    join: Option<JoinHandle<()>>,
}

impl Renderer {
    pub fn handle(&self) -> RendererHandle {
        self.handle.clone()
    }

    /// Stop the worker, cancelling everything still queued, and wait for it.
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        let Some(join) = self.join.take() else {
            return;
        };
        self.handle.send(Message::Shutdown);
        if join.join().is_err() {
            tracing::warn!("renderer worker panicked");
        }
    }
}

impl Deref for Renderer {
    type Target = RendererHandle;

    fn deref(&self) -> &RendererHandle {
        &self.handle
    }
}

impl Drop for Renderer {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Start the renderer worker thread.
pub fn spawn_renderer(
    sink: Arc<dyn AudioSink>,
    notify: Sender<RendererEvent>,
    opts: RendererOptions,
) -> Result<Renderer> {
    let clock = opts
        .clock
        .unwrap_or_else(|| Arc::new(SystemClock::new()) as Arc<dyn Clock>);
    let flags = Arc::new(FlushFlags::new());
    let (tx, rx) = crossbeam_channel::unbounded();
    let core = RendererCore::new(
        clock.clone(),
        opts.config,
        sink,
        opts.video_output,
        notify,
        flags.clone(),
    );
    let join = std::thread::Builder::new()
        .name("media-renderer".into())
        .spawn(move || dispatcher::run(core, rx))
        .context("spawn renderer thread")?;
    Ok(Renderer {
        handle: RendererHandle { tx, flags, clock },
        join: Some(join),
    })
}
