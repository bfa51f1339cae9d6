//! Virtual-time harness for renderer unit tests.
//!
//! [`Sim`] drives a [`RendererCore`] directly: messages are dispatched
//! synchronously and self-posted ticks fire when the manual clock reaches them.

use std::sync::{Arc, Mutex};

use crossbeam_channel::{Receiver, unbounded};
use renderer_types::{AckStatus, RendererEvent, StatsEvent, StreamKind};

use crate::clock::{Clock, ManualClock};
use crate::config::RendererConfig;
use crate::engine::RendererCore;
use crate::dispatcher::{Message, TimerQueue, dispatch};
use crate::entry::{ConsumeAck, MediaBuffer};
use crate::flush::FlushFlags;
use crate::sink::{AudioSink, SinkError, StatsCollector, VideoOutput};

pub(crate) const SIM_START_US: i64 = 10_000_000;

#[derive(Debug)]
struct SinkState {
    sample_rate: u32,
    written: u64,
    played: u64,
    last_us: i64,
    paused: bool,
    accept_limit: Option<usize>,
    not_ready: bool,
    latency_us: i64,
    accepted_total: u64,
    writes: usize,
    flushes: usize,
}

/// Audio sink at 1 kHz with one-byte frames: one byte plays for one millisecond.
pub(crate) struct ScriptedSink {
    clock: Arc<ManualClock>,
    state: Mutex<SinkState>,
}

impl ScriptedSink {
    fn new(clock: Arc<ManualClock>) -> Self {
        let last_us = clock.now_us();
        Self {
            clock,
            state: Mutex::new(SinkState {
                sample_rate: 1_000,
                written: 0,
                played: 0,
                last_us,
                paused: false,
                accept_limit: None,
                not_ready: false,
                latency_us: 0,
                accepted_total: 0,
                writes: 0,
                flushes: 0,
            }),
        }
    }

    fn with_state<R>(&self, f: impl FnOnce(&mut SinkState) -> R) -> R {
        let mut st = self.state.lock().unwrap();
        let now = self.clock.now_us();
        if !st.paused {
            let elapsed = u64::try_from(now - st.last_us).unwrap_or(0);
            let frames = elapsed * u64::from(st.sample_rate) / 1_000_000;
            st.played = (st.played + frames).min(st.written);
        }
        st.last_us = now;
        f(&mut st)
    }

    pub(crate) fn set_accept_limit(&self, limit: Option<usize>) {
        self.with_state(|st| st.accept_limit = limit);
    }

    pub(crate) fn set_not_ready(&self, not_ready: bool) {
        self.with_state(|st| st.not_ready = not_ready);
    }

    pub(crate) fn set_latency_us(&self, latency_us: i64) {
        self.with_state(|st| st.latency_us = latency_us);
    }

    pub(crate) fn set_sample_rate(&self, rate: u32) {
        self.with_state(|st| st.sample_rate = rate);
    }

    pub(crate) fn bytes_accepted(&self) -> u64 {
        self.with_state(|st| st.accepted_total)
    }

    pub(crate) fn writes(&self) -> usize {
        self.with_state(|st| st.writes)
    }

    pub(crate) fn flushes(&self) -> usize {
        self.with_state(|st| st.flushes)
    }

    pub(crate) fn is_paused(&self) -> bool {
        self.with_state(|st| st.paused)
    }
}

impl AudioSink for ScriptedSink {
    fn sample_rate(&self) -> u32 {
        self.with_state(|st| st.sample_rate)
    }

    fn frame_size(&self) -> usize {
        1
    }

    fn buffer_frames(&self) -> u32 {
        200
    }

    fn played_frames(&self) -> Result<u64, SinkError> {
        self.with_state(|st| {
            if st.not_ready {
                Err(SinkError::NotReady)
            } else {
                Ok(st.played)
            }
        })
    }

    fn latency_us(&self) -> i64 {
        self.with_state(|st| st.latency_us)
    }

    fn write(&self, data: &[u8]) -> Result<usize, SinkError> {
        self.with_state(|st| {
            st.writes += 1;
            let n = st.accept_limit.map_or(data.len(), |limit| data.len().min(limit));
            st.written += n as u64;
            st.accepted_total += n as u64;
            Ok(n)
        })
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
            st.flushes += 1;
        });
    }
}

struct RecordingOutput {
    frames: Arc<Mutex<Vec<i64>>>,
}

impl VideoOutput for RecordingOutput {
    fn render(&mut self, frame: &MediaBuffer) {
        self.frames.lock().unwrap().push(frame.time_us);
    }
}

#[derive(Default)]
pub(crate) struct RecordingStats {
    records: Mutex<Vec<StatsEvent>>,
}

impl RecordingStats {
    pub(crate) fn records(&self) -> Vec<StatsEvent> {
        self.records.lock().unwrap().clone()
    }
}

impl StatsCollector for RecordingStats {
    fn record(&self, event: StatsEvent) {
        self.records.lock().unwrap().push(event);
    }
}

/// Shared record of acknowledgements fired in tests.
#[derive(Clone, Default)]
pub(crate) struct AckLog {
    seen: Arc<Mutex<Vec<(u32, AckStatus)>>>,
}

impl AckLog {
    pub(crate) fn statuses(&self) -> Vec<AckStatus> {
        self.seen.lock().unwrap().iter().map(|(_, s)| *s).collect()
    }

    pub(crate) fn tagged(&self) -> Vec<(u32, AckStatus)> {
        self.seen.lock().unwrap().clone()
    }
}

/// Log plus a factory for acks that record into it under a tag.
pub(crate) fn ack_log() -> (AckLog, impl Fn(u32) -> ConsumeAck) {
    let log = AckLog::default();
    let seen = log.seen.clone();
    let make = move |tag: u32| {
        let seen = seen.clone();
        ConsumeAck::new(move |status| seen.lock().unwrap().push((tag, status)))
    };
    (log, make)
}

pub(crate) struct Sim {
    pub(crate) clock: Arc<ManualClock>,
    pub(crate) sink: Arc<ScriptedSink>,
    pub(crate) core: RendererCore,
    flags: Arc<FlushFlags>,
    timers: TimerQueue,
    events: Receiver<RendererEvent>,
    rendered: Arc<Mutex<Vec<i64>>>,
}

impl Sim {
    pub(crate) fn new() -> Self {
        let clock = Arc::new(ManualClock::new(SIM_START_US));
        let sink = Arc::new(ScriptedSink::new(clock.clone()));
        let rendered = Arc::new(Mutex::new(Vec::new()));
        let flags = Arc::new(FlushFlags::new());
        let (tx, events) = unbounded();
        let core = RendererCore::new(
            clock.clone(),
            RendererConfig::default(),
            sink.clone(),
            Some(Box::new(RecordingOutput {
                frames: rendered.clone(),
            })),
            tx,
            flags.clone(),
        );
        Self {
            clock,
            sink,
            core,
            flags,
            timers: TimerQueue::default(),
            events,
            rendered,
        }
    }

    pub(crate) fn now(&self) -> i64 {
        self.clock.now_us()
    }

    pub(crate) fn advance(&self, delta_us: i64) {
        self.clock.advance(delta_us);
    }

    pub(crate) fn handle_flags(&self) -> &Arc<FlushFlags> {
        &self.flags
    }

    pub(crate) fn send(&mut self, msg: Message) {
        let _ = dispatch(&mut self.core, &mut self.timers, msg);
    }

    pub(crate) fn queue(&mut self, stream: StreamKind, len: usize, time_us: i64, ack: ConsumeAck) {
        self.send(Message::QueueBuffer {
            stream,
            buffer: MediaBuffer::new(vec![0u8; len], time_us),
            ack,
        });
    }

    pub(crate) fn flush(&mut self, stream: StreamKind) {
        self.flags.begin(stream);
        self.send(Message::Flush { stream });
    }

    pub(crate) fn set_presence(&mut self, stream: StreamKind, present: bool) {
        self.send(Message::SetMediaPresence { stream, present });
    }

    pub(crate) fn register_stats(&mut self) -> Arc<RecordingStats> {
        let stats = Arc::new(RecordingStats::default());
        self.send(Message::RegisterStats(stats.clone()));
        stats
    }

    pub(crate) fn pending_timers(&self) -> usize {
        self.timers.len()
    }

    /// Fire the earliest timer, moving the clock forward to it if needed.
    pub(crate) fn step(&mut self) -> bool {
        let Some(due) = self.timers.next_due() else {
            return false;
        };
        if due > self.now() {
            self.clock.set(due);
        }
        let now = self.now();
        match self.timers.pop_due(now) {
            Some(msg) => {
                self.send(msg);
                true
            }
            None => false,
        }
    }

    /// Fire every timer due within the next `duration_us`, then land on the end.
    pub(crate) fn run_for(&mut self, duration_us: i64) {
        let end = self.now() + duration_us;
        while self.timers.next_due().is_some_and(|due| due <= end) {
            self.step();
        }
        self.clock.set(end);
    }

    pub(crate) fn events(&self) -> Vec<RendererEvent> {
        self.events.try_iter().collect()
    }

    pub(crate) fn positions(&self) -> Vec<i64> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                RendererEvent::Position { position_us } => Some(position_us),
                _ => None,
            })
            .collect()
    }

    pub(crate) fn rendered(&self) -> Vec<i64> {
        self.rendered.lock().unwrap().clone()
    }
}
