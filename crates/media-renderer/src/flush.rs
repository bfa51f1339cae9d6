//! Flush-in-progress flags shared with producer threads.
//!
//! These are the only renderer state producers touch directly. The lock is
//! held for the flag access alone, never across queue work. Each stream keeps
//! a count of requested flushes not yet handled, so back-to-back flushes keep
//! the stream flushing until the last one completes.

use std::sync::{Mutex, PoisonError};

use renderer_types::StreamKind;

#[derive(Debug, Default)]
struct Flags {
    audio: u32,
    video: u32,
}

impl Flags {
    fn slot(&mut self, stream: StreamKind) -> &mut u32 {
        match stream {
            StreamKind::Audio => &mut self.audio,
            StreamKind::Video => &mut self.video,
        }
    }
}

#[derive(Debug, Default)]
pub struct FlushFlags {
    inner: Mutex<Flags>,
}

impl FlushFlags {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_flushing(&self, stream: StreamKind) -> bool {
        let mut g = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        *g.slot(stream) > 0
    }

    pub(crate) fn begin(&self, stream: StreamKind) {
        let mut g = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        let pending = g.slot(stream);
        *pending = pending.saturating_add(1);
    }

    pub(crate) fn finish(&self, stream: StreamKind) {
        let mut g = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        let pending = g.slot(stream);
        *pending = pending.saturating_sub(1);
    }
}
