//! Queue entries and their consumption acknowledgements.

use std::fmt;

use bytes::Bytes;
use renderer_types::{AckStatus, FinalStatus};

/// Decoded frame handed to the renderer.
///
/// `data` is shared with the producer; cloning is cheap.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MediaBuffer {
    /// Interleaved PCM bytes for audio, an opaque frame handle for video.
    pub data: Bytes,
    /// Presentation time of the first sample/frame in microseconds.
    pub time_us: i64,
}

impl MediaBuffer {
    pub fn new(data: impl Into<Bytes>, time_us: i64) -> Self {
        Self {
            data: data.into(),
            time_us,
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

type AckFn = Box<dyn FnOnce(AckStatus) + Send>;

/// Consumption acknowledgement that fires exactly once.
///
/// [`ConsumeAck::fire`] consumes the ack. An ack that is dropped without firing
/// reports [`AckStatus::Cancelled`], so a buffer lost to shutdown or a closed
/// channel is still released back to its producer.
pub struct ConsumeAck {
    notify: Option<AckFn>,
}

impl ConsumeAck {
    pub fn new(notify: impl FnOnce(AckStatus) + Send + 'static) -> Self {
        Self {
            notify: Some(Box::new(notify)),
        }
    }

    /// Ack that reports `(tag, status)` on `tx`.
    pub fn to_channel<T: Send + 'static>(
        tx: crossbeam_channel::Sender<(T, AckStatus)>,
        tag: T,
    ) -> Self {
        Self::new(move |status| {
            let _ = tx.send((tag, status));
        })
    }

    /// Ack for producers that do not track releases.
    pub fn noop() -> Self {
        Self { notify: None }
    }

    pub fn fire(mut self, status: AckStatus) {
        if let Some(notify) = self.notify.take() {
            notify(status);
        }
    }
}

impl Drop for ConsumeAck {
    fn drop(&mut self) {
        if let Some(notify) = self.notify.take() {
            notify(AckStatus::Cancelled);
        }
    }
}

impl fmt::Debug for ConsumeAck {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConsumeAck")
            .field("pending", &self.notify.is_some())
            .finish()
    }
}

#[derive(Debug)]
pub(crate) enum Payload {
    Buffer { buffer: MediaBuffer, ack: ConsumeAck },
    Eos(FinalStatus),
}

/// One pending frame in a stream queue.
#[derive(Debug)]
pub(crate) struct QueueEntry {
    pub(crate) payload: Payload,
    /// Bytes of `buffer` already accepted downstream.
    pub(crate) offset: usize,
    /// Wall time before which the drain schedulers must not look at this entry.
    pub(crate) visible_at_us: Option<i64>,
}

impl QueueEntry {
    pub(crate) fn buffer(buffer: MediaBuffer, ack: ConsumeAck, visible_at_us: Option<i64>) -> Self {
        Self {
            payload: Payload::Buffer { buffer, ack },
            offset: 0,
            visible_at_us,
        }
    }

    pub(crate) fn eos(status: FinalStatus, visible_at_us: Option<i64>) -> Self {
        Self {
            payload: Payload::Eos(status),
            offset: 0,
            visible_at_us,
        }
    }

    pub(crate) fn media_time_us(&self) -> Option<i64> {
        match &self.payload {
            Payload::Buffer { buffer, .. } => Some(buffer.time_us),
            Payload::Eos(_) => None,
        }
    }

    pub(crate) fn eos_status(&self) -> Option<FinalStatus> {
        match self.payload {
            Payload::Eos(status) => Some(status),
            Payload::Buffer { .. } => None,
        }
    }

    /// Wall time this entry still has to wait for, if any.
    pub(crate) fn hidden_until(&self, now_us: i64) -> Option<i64> {
        self.visible_at_us.filter(|at| *at > now_us)
    }

    /// Release the entry's acknowledgement. End-of-stream markers carry none.
    pub(crate) fn finish(self, status: AckStatus) {
        if let Payload::Buffer { ack, .. } = self.payload {
            ack.fire(status);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    fn recording_ack() -> (ConsumeAck, Arc<Mutex<Vec<AckStatus>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let ack = ConsumeAck::new(move |status| sink.lock().unwrap().push(status));
        (ack, seen)
    }

    #[test]
    fn fire_reports_status_once() {
        let (ack, seen) = recording_ack();
        ack.fire(AckStatus::Rendered);
        assert_eq!(*seen.lock().unwrap(), vec![AckStatus::Rendered]);
    }

    #[test]
    fn dropped_ack_reports_cancelled() {
        let (ack, seen) = recording_ack();
        drop(ack);
        assert_eq!(*seen.lock().unwrap(), vec![AckStatus::Cancelled]);
    }

    #[test]
    fn channel_ack_carries_tag() {
        let (tx, rx) = crossbeam_channel::unbounded();
        ConsumeAck::to_channel(tx, 7u32).fire(AckStatus::Dropped);
        assert_eq!(rx.try_recv().unwrap(), (7, AckStatus::Dropped));
    }

    #[test]
    fn hidden_until_only_reports_future_times() {
        let entry = QueueEntry::eos(FinalStatus::EndOfStream, Some(500));
        assert_eq!(entry.hidden_until(100), Some(500));
        assert_eq!(entry.hidden_until(500), None);
        assert_eq!(entry.eos_status(), Some(FinalStatus::EndOfStream));
        assert_eq!(entry.media_time_us(), None);
    }
}
