//! Per-stream queue store and generation guard.
//!
//! Every scheduled drain tick carries the generation that was current when it
//! was posted. A flush bumps the generation, so ticks posted before the flush
//! find a mismatch when they run and do nothing. Posting and checking both
//! happen on the renderer worker, which makes the comparison race-free.

use std::collections::VecDeque;

use renderer_types::AckStatus;

use crate::entry::QueueEntry;

#[derive(Debug, Default)]
pub(crate) struct StreamQueue {
    entries: VecDeque<QueueEntry>,
    /// A drain tick for the current generation is already posted.
    pub(crate) drain_pending: bool,
    generation: u64,
}

impl StreamQueue {
    pub(crate) fn push(&mut self, entry: QueueEntry) {
        self.entries.push_back(entry);
    }

    pub(crate) fn front(&self) -> Option<&QueueEntry> {
        self.entries.front()
    }

    pub(crate) fn front_mut(&mut self) -> Option<&mut QueueEntry> {
        self.entries.front_mut()
    }

    pub(crate) fn pop(&mut self) -> Option<QueueEntry> {
        self.entries.pop_front()
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub(crate) fn generation(&self) -> u64 {
        self.generation
    }

    /// `true` when a tick stamped with `generation` may still act on this queue.
    pub(crate) fn accepts(&self, generation: u64) -> bool {
        generation == self.generation
    }

    /// Empty the queue, cancel every entry, and invalidate outstanding ticks.
    ///
    /// Returns the number of cancelled entries.
    pub(crate) fn flush(&mut self) -> usize {
        let cancelled = self.entries.len();
        for entry in self.entries.drain(..) {
            entry.finish(AckStatus::Cancelled);
        }
        self.generation = self.generation.wrapping_add(1);
        self.drain_pending = false;
        cancelled
    }
}
