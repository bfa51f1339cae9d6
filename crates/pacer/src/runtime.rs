//! Pacer runtime.
//!
//! Wires an audio sink, the renderer and the synthetic producers together and
//! runs the scripted control timeline until every stream has ended.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use anyhow::Result;
use crossbeam_channel::RecvTimeoutError;
use media_renderer::{
    AudioSink, RendererEvent, RendererHandle, RendererOptions, SinkParams, StreamKind,
    spawn_renderer,
};

use crate::config::{PlayConfig, ScriptConfig, ms_to_us};
use crate::device;
use crate::output::OutputCounters;
use crate::sink::{self, NullSink};
use crate::source::{
    FrameCounter, PatternSource, ProducerReport, ProducerSpec, SourceControl, ToneSource,
    spawn_producer,
};
use crate::status::{PlaybackSummary, StatsCounter};

const EVENT_POLL: Duration = Duration::from_millis(20);
const NULL_SINK_RATE_HZ: u32 = 48_000;
const NULL_SINK_CHANNELS: usize = 2;
/// Wall-clock slack past the stream duration before giving up on end of stream.
const EOS_GRACE: Duration = Duration::from_secs(5);

/// List output devices and print them to stdout.
pub fn list_devices() -> Result<()> {
    let host = cpal::default_host();
    device::list_devices(&host)
}

struct OpenedSink {
    sink: Arc<dyn AudioSink>,
    counters: Option<Arc<OutputCounters>>,
    _stream: Option<cpal::Stream>,
}

fn open_sink(config: &PlayConfig) -> Result<OpenedSink> {
    if config.null_sink || config.no_audio {
        tracing::info!(rate_hz = NULL_SINK_RATE_HZ, "using null sink");
        return Ok(OpenedSink {
            sink: Arc::new(NullSink::new(
                NULL_SINK_RATE_HZ,
                NULL_SINK_CHANNELS,
                config.buffer_ms,
            )),
            counters: None,
            _stream: None,
        });
    }
    let (sink, stream) = sink::open_cpal_sink(config.device.as_deref(), config.buffer_ms)?;
    Ok(OpenedSink {
        counters: Some(sink.counters().clone()),
        sink,
        _stream: Some(stream),
    })
}

/// Scripted control actions, fired once each at their wall-clock offset.
#[derive(Debug)]
struct Script {
    pause_at: Option<Duration>,
    resume_at: Option<Duration>,
    seek: Option<(Duration, i64)>,
}

impl Script {
    fn new(cfg: &ScriptConfig) -> Self {
        let pause_at = cfg.pause_at_ms.map(Duration::from_millis);
        Self {
            pause_at,
            resume_at: pause_at.map(|at| at + Duration::from_millis(cfg.pause_for_ms)),
            seek: cfg
                .seek
                .map(|(at, to)| (Duration::from_millis(at), ms_to_us(to))),
        }
    }
}

/// A seek waits for both flushes to complete before producers restart.
#[derive(Debug)]
struct PendingSeek {
    to_us: i64,
    awaiting: Vec<StreamKind>,
}

struct Session {
    handle: RendererHandle,
    control: Arc<SourceControl>,
    streams: Vec<StreamKind>,
    ended: Vec<StreamKind>,
    pending_seek: Option<PendingSeek>,
}

impl Session {
    fn run_script(&mut self, script: &mut Script, elapsed: Duration) {
        if script.pause_at.is_some_and(|at| elapsed >= at) {
            script.pause_at = None;
            tracing::info!(elapsed_ms = elapsed.as_millis(), "pause");
            self.handle.pause();
        }
        if script.pause_at.is_none() && script.resume_at.is_some_and(|at| elapsed >= at) {
            script.resume_at = None;
            tracing::info!(elapsed_ms = elapsed.as_millis(), "resume");
            self.handle.resume();
        }
        if let Some((at, to_us)) = script.seek {
            if elapsed >= at {
                script.seek = None;
                self.begin_seek(to_us);
            }
        }
    }

    fn begin_seek(&mut self, to_us: i64) {
        tracing::info!(to_us, "seek");
        self.control.hold();
        self.ended.clear();
        for stream in &self.streams {
            self.handle.flush(*stream);
        }
        self.pending_seek = Some(PendingSeek {
            to_us,
            awaiting: self.streams.clone(),
        });
    }

    fn on_flush_complete(&mut self, stream: StreamKind) {
        let Some(seek) = self.pending_seek.as_mut() else {
            return;
        };
        seek.awaiting.retain(|s| *s != stream);
        if !seek.awaiting.is_empty() {
            return;
        }
        let to_us = seek.to_us;
        self.pending_seek = None;
        self.handle.notify_seek_position(to_us);
        self.handle.signal_time_discontinuity();
        self.control.seek(to_us);
        tracing::debug!(to_us, "producers restarted after seek");
    }

    /// Record an end of stream; `true` once every stream has ended.
    fn on_eos(&mut self, stream: StreamKind) -> bool {
        if self.pending_seek.is_some() {
            return false;
        }
        if !self.ended.contains(&stream) {
            self.ended.push(stream);
        }
        self.ended.len() >= self.streams.len()
    }
}

/// Play the synthetic streams with the resolved configuration.
pub fn run_play(config: PlayConfig) -> Result<PlaybackSummary> {
    let interrupted = Arc::new(AtomicBool::new(false));
    {
        let interrupted = interrupted.clone();
        if let Err(e) = ctrlc::set_handler(move || interrupted.store(true, Ordering::Relaxed)) {
            tracing::warn!("ctrl-c handler not installed: {e}");
        }
    }

    let opened = open_sink(&config)?;
    let params = SinkParams::read(&*opened.sink);
    let shown = Arc::new(AtomicU64::new(0));
    let stats = Arc::new(StatsCounter::default());
    let (event_tx, event_rx) = crossbeam_channel::unbounded();

    let renderer = spawn_renderer(
        opened.sink.clone(),
        event_tx,
        RendererOptions {
            config: config.renderer.clone(),
            video_output: Some(Box::new(FrameCounter::new(shown.clone()))),
            clock: None,
        },
    )?;
    renderer.register_stats(stats.clone());

    let has_audio = !config.no_audio;
    renderer.set_media_presence(StreamKind::Audio, has_audio);
    renderer.set_media_presence(StreamKind::Video, true);
    if let Some(ms) = config.script.inject_delay_ms {
        tracing::info!(delay_ms = ms, "delaying first buffer");
        renderer.queue_delay(ms_to_us(ms));
    }

    let control = Arc::new(SourceControl::new());
    let duration_us = ms_to_us(config.source.duration_ms);
    let mut streams = Vec::new();
    let mut producers: Vec<JoinHandle<ProducerReport>> = Vec::new();
    if has_audio {
        streams.push(StreamKind::Audio);
        producers.push(spawn_producer(
            renderer.handle(),
            ProducerSpec {
                stream: StreamKind::Audio,
                duration_us,
                max_in_flight: config.source.max_in_flight,
            },
            control.clone(),
            ToneSource::new(&params, config.source.tone_hz, config.source.chunk_ms),
        )?);
    }
    streams.push(StreamKind::Video);
    producers.push(spawn_producer(
        renderer.handle(),
        ProducerSpec {
            stream: StreamKind::Video,
            duration_us,
            max_in_flight: config.source.max_in_flight,
        },
        control.clone(),
        PatternSource::new(config.source.fps),
    )?);
    tracing::info!(
        duration_ms = config.source.duration_ms,
        audio = has_audio,
        fps = config.source.fps,
        "playing"
    );

    let mut session = Session {
        handle: renderer.handle(),
        control: control.clone(),
        streams,
        ended: Vec::new(),
        pending_seek: None,
    };
    let mut script = Script::new(&config.script);
    let mut summary = PlaybackSummary::default();
    let deadline = wall_deadline(&config);
    let started = Instant::now();

    loop {
        session.run_script(&mut script, started.elapsed());

        match event_rx.recv_timeout(EVENT_POLL) {
            Ok(event) => {
                log_event(&event);
                summary.apply(&event);
                match event {
                    RendererEvent::FlushComplete { stream } => session.on_flush_complete(stream),
                    RendererEvent::Eos { stream, .. } => {
                        // A pending scripted seek restarts the streams.
                        if session.on_eos(stream) && script.seek.is_none() {
                            break;
                        }
                    }
                    _ => {}
                }
            }
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => {
                tracing::warn!("renderer stopped unexpectedly");
                break;
            }
        }

        if interrupted.load(Ordering::Relaxed) {
            tracing::info!("interrupted");
            break;
        }
        if started.elapsed() > deadline {
            tracing::warn!(
                elapsed_ms = started.elapsed().as_millis(),
                "end of stream not reached"
            );
            break;
        }
    }

    control.stop();
    for producer in producers {
        match producer.join() {
            Ok(report) => tracing::debug!(?report, "producer joined"),
            Err(_) => tracing::warn!("producer thread panicked"),
        }
    }
    renderer.shutdown();

    summary.frames_shown = shown.load(Ordering::Relaxed);
    summary.stats = stats.snapshot();
    summary.underrun_frames = opened
        .counters
        .as_ref()
        .map(|c| c.underrun_frames.load(Ordering::Relaxed));
    Ok(summary)
}

fn wall_deadline(config: &PlayConfig) -> Duration {
    let duration = config.source.duration_ms;
    let mut total = duration;
    if let Some((at, to)) = config.script.seek {
        total = total.max(at + duration.saturating_sub(to));
    }
    if config.script.pause_at_ms.is_some() {
        total += config.script.pause_for_ms;
    }
    total += config.script.inject_delay_ms.unwrap_or(0);
    Duration::from_millis(total) + EOS_GRACE
}

fn log_event(event: &RendererEvent) {
    match event {
        RendererEvent::Position { position_us } => {
            tracing::debug!(position_ms = position_us / 1_000, "position");
        }
        RendererEvent::Eos { stream, status } => {
            tracing::info!(stream = %stream, status = ?status, "end of stream");
        }
        RendererEvent::FlushComplete { stream } => {
            tracing::info!(stream = %stream, "flush complete");
        }
        RendererEvent::VideoLateBy { late_by_us } => {
            tracing::info!(late_by_ms = late_by_us / 1_000, "video running late");
        }
    }
}
