//! Output device abstraction and CPAL device selection.
//!
//! The session drives output through [`AudioBackend`] / [`OutputDevice`]. The CPAL helpers
//! here handle:
//! - counting and listing available output devices
//! - selecting either the default device or a device by substring match
//! - picking a sample format and buffer size for an exact decoder format

use anyhow::{Context, anyhow};
use cpal::traits::{DeviceTrait, HostTrait};

use crate::callback::StreamCallback;
use crate::decode::StreamFormat;
use crate::error::Result;

/// Platform audio backend: enumerates devices and opens output streams.
pub trait AudioBackend {
    /// Number of playback devices the backend can see.
    fn playback_device_count(&self) -> Result<usize>;

    /// Open a stopped output stream bound to `format`, fed by `callback`.
    ///
    /// No format negotiation happens here: if the device cannot run at exactly
    /// `format`, this fails with [`crate::SessionError::DeviceOpen`].
    fn open(&self, format: StreamFormat, callback: StreamCallback)
    -> Result<Box<dyn OutputDevice>>;
}

/// A live output stream. Dropping it closes the device.
///
/// After `stop` (or drop) returns, the backend must not be inside the data callback.
pub trait OutputDevice {
    fn start(&mut self) -> Result<()>;
    fn stop(&mut self) -> Result<()>;
    fn set_master_volume(&mut self, volume: f32) -> Result<()>;
    fn master_volume(&self) -> Result<f32>;

    /// Human-readable device name, if known.
    fn name(&self) -> Option<String> {
        None
    }
}

/// Pick the first output device matching `needle` (case-insensitive), or the default device.
///
/// Returns an error if no suitable device is found.
pub fn pick_device(host: &cpal::Host, needle: Option<&str>) -> anyhow::Result<cpal::Device> {
    let mut devices: Vec<cpal::Device> = host
        .output_devices()
        .context("No output devices")?
        .collect();

    if let Some(needle) = needle {
        if let Some(d) = devices.drain(..).find(|d| {
            d.description()
                .ok()
                .map(|n| matches_device_name(&n.name(), needle))
                .unwrap_or(false)
        }) {
            return Ok(d);
        }
        return Err(anyhow!("No output device matched: {needle}"));
    }

    host.default_output_device()
        .ok_or_else(|| anyhow!("No default output device"))
}

/// Count output devices on `host`.
pub fn count_output_devices(host: &cpal::Host) -> anyhow::Result<usize> {
    Ok(host
        .output_devices()
        .context("enumerate output devices")?
        .count())
}

/// Pick the sample format to run `format` on `device`.
///
/// Only configs with exactly the requested channel count and a sample-rate range containing
/// the requested rate are considered; among those the best-ranked sample format wins.
pub fn pick_sample_format(
    device: &cpal::Device,
    format: StreamFormat,
) -> anyhow::Result<cpal::SupportedStreamConfig> {
    let ranges: Vec<cpal::SupportedStreamConfigRange> = device
        .supported_output_configs()
        .context("query supported output configs")?
        .collect();

    ranges
        .into_iter()
        .filter(|r| {
            r.channels() == format.channels
                && r.min_sample_rate() <= format.sample_rate
                && format.sample_rate <= r.max_sample_rate()
        })
        .min_by_key(|r| sample_format_rank(r.sample_format()))
        .map(|r| r.with_sample_rate(format.sample_rate))
        .ok_or_else(|| {
            anyhow!(
                "device does not support {} Hz with {} channel(s)",
                format.sample_rate,
                format.channels
            )
        })
}

/// Pick a stream buffer size, preferring larger values to reduce underruns.
///
/// `requested` wins when set (clamped into the device range). Otherwise, if the device
/// reports a range, choose the max (capped). Returns `None` when the device only supports
/// the default buffer size.
pub fn pick_buffer_size(
    config: &cpal::SupportedStreamConfig,
    requested: Option<u32>,
) -> Option<cpal::BufferSize> {
    match config.buffer_size() {
        cpal::SupportedBufferSize::Range { min, max } => {
            Some(cpal::BufferSize::Fixed(buffer_frames_in_range(*min, *max, requested)))
        }
        cpal::SupportedBufferSize::Unknown => requested.map(cpal::BufferSize::Fixed),
    }
}

pub(crate) const MAX_BUFFER_FRAMES: u32 = 16_384;

fn buffer_frames_in_range(min: u32, max: u32, requested: Option<u32>) -> u32 {
    if let Some(frames) = requested {
        return frames.clamp(min, max.max(min));
    }
    if max > MAX_BUFFER_FRAMES {
        if min > MAX_BUFFER_FRAMES { min } else { MAX_BUFFER_FRAMES }
    } else {
        max
    }
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

/// Print available output devices to stdout.
///
/// This is intended for CLI UX (`--list-devices`) rather than structured output.
pub fn list_devices(host: &cpal::Host) -> anyhow::Result<()> {
    let devices = host.output_devices().context("No output devices")?;
    for (i, d) in devices.enumerate() {
        println!("#{i}: {}", d.description()?);
    }
    Ok(())
}

fn matches_device_name(name: &str, needle: &str) -> bool {
    let needle = needle.trim();
    if needle.is_empty() {
        return false;
    }
    name.to_lowercase().contains(&needle.to_lowercase())
}
