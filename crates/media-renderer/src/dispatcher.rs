//! Renderer worker loop.
//!
//! Public operations arrive as [`Message`]s on a crossbeam channel. Drain ticks
//! posted by the core itself wait in a [`TimerQueue`] until due. Due timers
//! always run before the next channel message is taken.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::ops::ControlFlow;
use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError};
use renderer_types::{FinalStatus, StreamKind};

use crate::engine::RendererCore;
use crate::entry::{ConsumeAck, MediaBuffer};
use crate::sink::StatsCollector;

/// Work items executed on the renderer worker.
pub(crate) enum Message {
    DrainAudio { generation: u64 },
    DrainVideo { generation: u64 },
    QueueBuffer {
        stream: StreamKind,
        buffer: MediaBuffer,
        ack: ConsumeAck,
    },
    QueueEos { stream: StreamKind, status: FinalStatus },
    Flush { stream: StreamKind },
    TimeDiscontinuity,
    AudioSinkChanged,
    Pause,
    Resume,
    SeekPosition { time_us: i64 },
    QueueDelay { delay_us: i64, requested_at_us: i64 },
    RegisterStats(Arc<dyn StatsCollector>),
    SetMediaPresence { stream: StreamKind, present: bool },
    Shutdown,
}

impl Message {
    pub(crate) fn kind(&self) -> &'static str {
        match self {
            Message::DrainAudio { .. } => "drain_audio",
            Message::DrainVideo { .. } => "drain_video",
            Message::QueueBuffer { .. } => "queue_buffer",
            Message::QueueEos { .. } => "queue_eos",
            Message::Flush { .. } => "flush",
            Message::TimeDiscontinuity => "time_discontinuity",
            Message::AudioSinkChanged => "audio_sink_changed",
            Message::Pause => "pause",
            Message::Resume => "resume",
            Message::SeekPosition { .. } => "seek_position",
            Message::QueueDelay { .. } => "queue_delay",
            Message::RegisterStats(_) => "register_stats",
            Message::SetMediaPresence { .. } => "set_media_presence",
            Message::Shutdown => "shutdown",
        }
    }

    /// Tie-break for timers due at the same instant: audio before video.
    fn rank(&self) -> u8 {
        match self {
            Message::DrainAudio { .. } => 0,
            Message::DrainVideo { .. } => 1,
            _ => 2,
        }
    }
}

/// A message the core wants delivered back to itself after `delay_us`.
pub(crate) struct Post {
    pub(crate) delay_us: i64,
    pub(crate) msg: Message,
}

struct Timed {
    due_us: i64,
    rank: u8,
    seq: u64,
    msg: Message,
}

impl Timed {
    fn key(&self) -> (i64, u8, u64) {
        (self.due_us, self.rank, self.seq)
    }
}

impl PartialEq for Timed {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl Eq for Timed {}

impl PartialOrd for Timed {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Timed {
    // Reversed so the max-heap yields the earliest timer.
    fn cmp(&self, other: &Self) -> Ordering {
        other.key().cmp(&self.key())
    }
}

/// Min-heap of delayed self-posts.
#[derive(Default)]
pub(crate) struct TimerQueue {
    heap: BinaryHeap<Timed>,
    seq: u64,
}

impl TimerQueue {
    pub(crate) fn push(&mut self, due_us: i64, msg: Message) {
        self.seq = self.seq.wrapping_add(1);
        self.heap.push(Timed {
            due_us,
            rank: msg.rank(),
            seq: self.seq,
            msg,
        });
    }

    pub(crate) fn next_due(&self) -> Option<i64> {
        self.heap.peek().map(|t| t.due_us)
    }

    pub(crate) fn pop_due(&mut self, now_us: i64) -> Option<Message> {
        if self.next_due()? > now_us {
            return None;
        }
        self.heap.pop().map(|t| t.msg)
    }

    pub(crate) fn len(&self) -> usize {
        self.heap.len()
    }

    pub(crate) fn clear(&mut self) {
        self.heap.clear();
    }
}

/// Hand one message to the core and file the posts it produced.
pub(crate) fn dispatch(
    core: &mut RendererCore,
    timers: &mut TimerQueue,
    msg: Message,
) -> ControlFlow<()> {
    tracing::trace!(message = msg.kind(), "dispatch");
    let flow = core.handle(msg);
    let now = core.now_us();
    for post in core.take_posts() {
        timers.push(now.saturating_add(post.delay_us.max(0)), post.msg);
    }
    flow
}

/// Worker main loop; returns once shut down or once every handle is gone.
pub(crate) fn run(mut core: RendererCore, rx: Receiver<Message>) {
    let mut timers = TimerQueue::default();
    loop {
        let now = core.now_us();
        if let Some(msg) = timers.pop_due(now) {
            if dispatch(&mut core, &mut timers, msg).is_break() {
                break;
            }
            continue;
        }

        let msg = match timers.next_due() {
            Some(due) => {
                let wait = Duration::from_micros(u64::try_from(due - now).unwrap_or(0));
                match rx.recv_timeout(wait) {
                    Ok(msg) => msg,
                    Err(RecvTimeoutError::Timeout) => continue,
                    Err(RecvTimeoutError::Disconnected) => break,
                }
            }
            None => match rx.recv() {
                Ok(msg) => msg,
                Err(_) => break,
            },
        };
        if dispatch(&mut core, &mut timers, msg).is_break() {
            break;
        }
    }

    tracing::debug!(outstanding = timers.len(), "dropping scheduled ticks");
    timers.clear();
    core.shutdown();
}
