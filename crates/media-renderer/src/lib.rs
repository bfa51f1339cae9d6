//! Playback pacing core: releases decoded audio and video buffers to their
//! outputs at the right wall-clock time.

pub mod anchor;
pub mod clock;
pub mod config;
pub mod entry;
pub mod flush;
pub mod renderer;
pub mod sink;

mod audio_drain;
mod delay;
mod dispatcher;
mod engine;
mod reporter;
mod stream;
mod sync;
mod video_drain;

#[cfg(test)]
mod testing;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::RendererConfig;
pub use entry::{ConsumeAck, MediaBuffer};
pub use renderer::{Renderer, RendererHandle, RendererOptions, spawn_renderer};
pub use renderer_types;
pub use renderer_types::{AckStatus, FinalStatus, RendererEvent, StatsEvent, StreamKind};
pub use sink::{AudioSink, SinkError, SinkParams, StatsCollector, VideoOutput};
