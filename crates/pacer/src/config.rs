//! Configuration loading and resolution.
//!
//! A TOML file supplies defaults; command-line flags override it.

use std::path::Path;

use anyhow::{Context, Result};
use media_renderer::RendererConfig;
use serde::Deserialize;

use crate::cli::PlayArgs;

/// Top-level config file schema.
#[derive(Debug, Default, Deserialize)]
pub struct FileConfig {
    /// Renderer pacing parameters.
    pub renderer: Option<RendererSection>,
    /// Output device settings.
    pub output: Option<OutputSection>,
    /// Synthetic source settings.
    pub source: Option<SourceSection>,
}

#[derive(Debug, Default, Deserialize)]
pub struct RendererSection {
    pub position_interval_ms: Option<u64>,
    pub late_tolerance_ms: Option<u64>,
    pub late_report_interval_ms: Option<u64>,
    pub audio_poll_interval_ms: Option<u64>,
    pub audio_min_reschedule_ms: Option<u64>,
    pub sync_max_audio_lead_ms: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct OutputSection {
    /// Device name substring.
    pub device: Option<String>,
    /// Device-side buffer target in milliseconds.
    pub buffer_ms: Option<u64>,
    pub null_sink: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
pub struct SourceSection {
    pub duration_ms: Option<u64>,
    pub tone_hz: Option<f32>,
    pub fps: Option<u32>,
    pub chunk_ms: Option<u64>,
    /// Buffers a producer may have queued but not yet released.
    pub max_in_flight: Option<usize>,
}

impl FileConfig {
    /// Load configuration from disk.
    pub fn load(path: &Path) -> Result<Self> {
        let raw =
            std::fs::read_to_string(path).with_context(|| format!("read config {:?}", path))?;
        let cfg =
            toml::from_str::<FileConfig>(&raw).with_context(|| format!("parse config {:?}", path))?;
        Ok(cfg)
    }
}

/// Synthetic source parameters.
#[derive(Clone, Debug, PartialEq)]
pub struct SourceConfig {
    pub duration_ms: u64,
    pub tone_hz: f32,
    pub fps: u32,
    pub chunk_ms: u64,
    pub max_in_flight: usize,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            duration_ms: 5_000,
            tone_hz: 440.0,
            fps: 30,
            chunk_ms: 20,
            max_in_flight: 8,
        }
    }
}

/// Scripted control actions, in wall-clock milliseconds from start.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ScriptConfig {
    pub pause_at_ms: Option<u64>,
    pub pause_for_ms: u64,
    /// `(at, to)`: when to seek and which media time to land on.
    pub seek: Option<(u64, u64)>,
    pub inject_delay_ms: Option<u64>,
}

/// Fully resolved `play` configuration.
#[derive(Clone, Debug)]
pub struct PlayConfig {
    pub device: Option<String>,
    pub null_sink: bool,
    pub no_audio: bool,
    pub buffer_ms: u64,
    pub renderer: RendererConfig,
    pub source: SourceConfig,
    pub script: ScriptConfig,
}

const DEFAULT_BUFFER_MS: u64 = 200;

pub fn ms_to_us(ms: u64) -> i64 {
    i64::try_from(ms.saturating_mul(1_000)).unwrap_or(i64::MAX)
}

fn renderer_config(section: Option<&RendererSection>, args: &PlayArgs) -> RendererConfig {
    let mut cfg = RendererConfig::default();
    let empty = RendererSection::default();
    let section = section.unwrap_or(&empty);
    let set = |slot: &mut i64, file: Option<u64>, flag: Option<u64>| {
        if let Some(ms) = flag.or(file) {
            *slot = ms_to_us(ms);
        }
    };
    set(
        &mut cfg.min_position_update_interval_us,
        section.position_interval_ms,
        args.position_interval_ms,
    );
    set(
        &mut cfg.video_late_tolerance_us,
        section.late_tolerance_ms,
        args.late_tolerance_ms,
    );
    set(&mut cfg.late_report_interval_us, section.late_report_interval_ms, None);
    set(&mut cfg.audio_poll_interval_us, section.audio_poll_interval_ms, None);
    set(&mut cfg.audio_min_reschedule_us, section.audio_min_reschedule_ms, None);
    set(&mut cfg.sync_max_audio_lead_us, section.sync_max_audio_lead_ms, None);
    cfg
}

/// Merge file values and flags into a [`PlayConfig`].
pub fn resolve_play(file: &FileConfig, args: &PlayArgs) -> PlayConfig {
    let output = file.output.as_ref();
    let source = file.source.as_ref();
    let defaults = SourceConfig::default();

    let device = args
        .device
        .clone()
        .or_else(|| output.and_then(|o| o.device.clone()))
        .and_then(|name| {
            let trimmed = name.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        });

    PlayConfig {
        device,
        null_sink: args.null_sink || output.and_then(|o| o.null_sink).unwrap_or(false),
        no_audio: args.no_audio,
        buffer_ms: args
            .buffer_ms
            .or(output.and_then(|o| o.buffer_ms))
            .unwrap_or(DEFAULT_BUFFER_MS)
            .max(10),
        renderer: renderer_config(file.renderer.as_ref(), args),
        source: SourceConfig {
            duration_ms: args
                .duration_ms
                .or(source.and_then(|s| s.duration_ms))
                .unwrap_or(defaults.duration_ms),
            tone_hz: args
                .tone_hz
                .or(source.and_then(|s| s.tone_hz))
                .unwrap_or(defaults.tone_hz),
            fps: args
                .fps
                .or(source.and_then(|s| s.fps))
                .unwrap_or(defaults.fps)
                .max(1),
            chunk_ms: args
                .chunk_ms
                .or(source.and_then(|s| s.chunk_ms))
                .unwrap_or(defaults.chunk_ms)
                .max(1),
            max_in_flight: source
                .and_then(|s| s.max_in_flight)
                .unwrap_or(defaults.max_in_flight)
                .max(1),
        },
        script: ScriptConfig {
            pause_at_ms: args.pause_at_ms,
            pause_for_ms: args.pause_for_ms,
            seek: args.seek_at_ms.zip(args.seek_to_ms),
            inject_delay_ms: args.inject_delay_ms,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
[renderer]
position_interval_ms = 250
late_tolerance_ms = 20

[output]
device = "  USB DAC "
buffer_ms = 400

[source]
duration_ms = 1000
fps = 25
"#;

    #[test]
    fn parses_sections() {
        let cfg: FileConfig = toml::from_str(SAMPLE).unwrap();
        let renderer = cfg.renderer.unwrap();
        assert_eq!(renderer.position_interval_ms, Some(250));
        assert_eq!(renderer.late_tolerance_ms, Some(20));
        assert_eq!(cfg.output.unwrap().buffer_ms, Some(400));
        assert_eq!(cfg.source.unwrap().fps, Some(25));
    }

    #[test]
    fn file_values_fill_defaults() {
        let cfg: FileConfig = toml::from_str(SAMPLE).unwrap();
        let play = resolve_play(&cfg, &PlayArgs::default());
        assert_eq!(play.device.as_deref(), Some("USB DAC"));
        assert_eq!(play.buffer_ms, 400);
        assert_eq!(play.renderer.min_position_update_interval_us, 250_000);
        assert_eq!(play.renderer.video_late_tolerance_us, 20_000);
        assert_eq!(play.renderer.audio_poll_interval_us, 10_000);
        assert_eq!(play.source.duration_ms, 1_000);
        assert_eq!(play.source.fps, 25);
        assert_eq!(play.source.chunk_ms, 20);
    }

    #[test]
    fn flags_override_file() {
        let cfg: FileConfig = toml::from_str(SAMPLE).unwrap();
        let args = PlayArgs {
            device: Some("Speakers".to_string()),
            late_tolerance_ms: Some(60),
            fps: Some(60),
            ..PlayArgs::default()
        };
        let play = resolve_play(&cfg, &args);
        assert_eq!(play.device.as_deref(), Some("Speakers"));
        assert_eq!(play.renderer.video_late_tolerance_us, 60_000);
        assert_eq!(play.source.fps, 60);
    }

    #[test]
    fn empty_config_uses_library_defaults() {
        let play = resolve_play(&FileConfig::default(), &PlayArgs::default());
        assert_eq!(play.device, None);
        assert!(!play.null_sink);
        assert_eq!(play.buffer_ms, DEFAULT_BUFFER_MS);
        assert_eq!(play.renderer.min_position_update_interval_us, 100_000);
        assert_eq!(play.source, SourceConfig::default());
        assert_eq!(play.script.seek, None);
    }

    #[test]
    fn seek_needs_both_times() {
        let args = PlayArgs {
            seek_at_ms: Some(1_000),
            seek_to_ms: Some(3_000),
            ..PlayArgs::default()
        };
        let play = resolve_play(&FileConfig::default(), &args);
        assert_eq!(play.script.seek, Some((1_000, 3_000)));
    }
}
