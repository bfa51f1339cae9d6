//! Output device discovery and stream configuration.

use anyhow::{Context, Result, anyhow};
use cpal::traits::{DeviceTrait, HostTrait};

/// Preferred output rate when the device supports a range.
pub const PREFERRED_RATE_HZ: u32 = 48_000;

/// Pick the first output device matching `needle` (case-insensitive), or the default device.
pub fn pick_device(host: &cpal::Host, needle: Option<&str>) -> Result<cpal::Device> {
    if let Some(needle) = needle {
        let mut devices = host.output_devices().context("No output devices")?;
        return devices
            .find(|d| {
                d.description()
                    .ok()
                    .is_some_and(|desc| matches_device_name(&desc.name(), needle))
            })
            .ok_or_else(|| anyhow!("No output device matched: {needle}"));
    }

    host.default_output_device()
        .ok_or_else(|| anyhow!("No default output device"))
}

/// Print available output devices to stdout.
pub fn list_devices(host: &cpal::Host) -> Result<()> {
    let devices = host.output_devices().context("No output devices")?;
    for (i, d) in devices.enumerate() {
        println!("#{i}: {}", d.description()?);
    }
    Ok(())
}

/// Stream parameters chosen for a device.
pub struct OutputChoice {
    pub sample_format: cpal::SampleFormat,
    pub stream: cpal::StreamConfig,
    /// Device callback size when the device lets us fix it.
    pub callback_frames: Option<u32>,
}

/// Choose a stream config near [`PREFERRED_RATE_HZ`], preferring float output, and a
/// callback size close to `callback_target_frames`.
pub fn pick_output(device: &cpal::Device, callback_target_frames: u32) -> Result<OutputChoice> {
    let mut best: Option<(u32, u8, cpal::SupportedStreamConfig)> = None;
    for range in device.supported_output_configs()? {
        let rate = pick_rate_for_range(
            range.min_sample_rate(),
            range.max_sample_rate(),
            PREFERRED_RATE_HZ,
        );
        let distance = rate.abs_diff(PREFERRED_RATE_HZ);
        let rank = sample_format_rank(range.sample_format());
        let better = best
            .as_ref()
            .is_none_or(|(d, r, _)| (distance, rank) < (*d, *r));
        if better {
            best = Some((distance, rank, range.with_sample_rate(rate)));
        }
    }
    let (_, _, supported) = best.ok_or_else(|| anyhow!("No supported output configs"))?;

    let mut stream: cpal::StreamConfig = supported.config();
    let callback_frames = match supported.buffer_size() {
        cpal::SupportedBufferSize::Range { min, max } => {
            Some(clamp_buffer_frames(callback_target_frames, *min, *max))
        }
        cpal::SupportedBufferSize::Unknown => None,
    };
    if let Some(frames) = callback_frames {
        stream.buffer_size = cpal::BufferSize::Fixed(frames);
    }
    Ok(OutputChoice {
        sample_format: supported.sample_format(),
        stream,
        callback_frames,
    })
}

fn pick_rate_for_range(min: u32, max: u32, target: u32) -> u32 {
    target.clamp(min, max.max(min))
}

fn clamp_buffer_frames(target: u32, min: u32, max: u32) -> u32 {
    target.clamp(min, max.max(min))
}

fn sample_format_rank(format: cpal::SampleFormat) -> u8 {
    match format {
        cpal::SampleFormat::F32 => 0,
        cpal::SampleFormat::I32 => 1,
        cpal::SampleFormat::I16 => 2,
        cpal::SampleFormat::U16 => 3,
        _ => 10,
    }
}

fn matches_device_name(name: &str, needle: &str) -> bool {
    let needle = needle.trim();
    !needle.is_empty() && name.to_lowercase().contains(&needle.to_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn device_match_is_case_insensitive() {
        assert!(matches_device_name("USB DAC", "dac"));
        assert!(matches_device_name("usb dac", " USB "));
        assert!(!matches_device_name("USB DAC", "speaker"));
        assert!(!matches_device_name("USB DAC", "  "));
    }

    #[test]
    fn rate_is_clamped_into_range() {
        assert_eq!(pick_rate_for_range(44_100, 96_000, 48_000), 48_000);
        assert_eq!(pick_rate_for_range(88_200, 192_000, 48_000), 88_200);
        assert_eq!(pick_rate_for_range(8_000, 44_100, 48_000), 44_100);
    }

    #[test]
    fn buffer_target_is_clamped() {
        assert_eq!(clamp_buffer_frames(512, 64, 4_096), 512);
        assert_eq!(clamp_buffer_frames(16, 64, 4_096), 64);
        assert_eq!(clamp_buffer_frames(10_000, 64, 4_096), 4_096);
    }

    #[test]
    fn float_output_ranks_first() {
        assert!(sample_format_rank(cpal::SampleFormat::F32) < sample_format_rank(cpal::SampleFormat::I16));
    }
}
