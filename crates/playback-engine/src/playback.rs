//! Playback stage (CPAL output stream).
//!
//! Implements [`AudioBackend`] on top of CPAL. The output callback:
//! - asks the [`StreamCallback`] to render interleaved `f32` into a preallocated scratch buffer
//! - applies the master volume
//! - converts `f32` samples to the device sample format

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use anyhow::anyhow;
use cpal::traits::{DeviceTrait, StreamTrait};

use crate::callback::StreamCallback;
use crate::config::EngineConfig;
use crate::decode::StreamFormat;
use crate::device::{self, AudioBackend, MAX_BUFFER_FRAMES, OutputDevice};
use crate::error::{Result, SessionError};

/// CPAL-backed [`AudioBackend`] using the default host.
#[derive(Clone, Debug, Default)]
pub struct CpalBackend {
    /// Substring of the output device name; `None` selects the default device.
    pub device: Option<String>,
    /// Requested fixed buffer size in frames.
    pub buffer_frames: Option<u32>,
}

impl CpalBackend {
    pub fn from_config(config: &EngineConfig) -> Self {
        Self {
            device: config.device.clone(),
            buffer_frames: config.buffer_frames,
        }
    }
}

impl AudioBackend for CpalBackend {
    fn playback_device_count(&self) -> Result<usize> {
        let host = cpal::default_host();
        device::count_output_devices(&host).map_err(|e| SessionError::BackendInit(format!("{e:#}")))
    }

    fn open(
        &self,
        format: StreamFormat,
        callback: StreamCallback,
    ) -> Result<Box<dyn OutputDevice>> {
        let host = cpal::default_host();
        let open_err = |e: anyhow::Error| SessionError::DeviceOpen(format!("{e:#}"));

        let device = device::pick_device(&host, self.device.as_deref()).map_err(open_err)?;
        let name = device.description().ok().map(|d| d.to_string());
        let supported = device::pick_sample_format(&device, format).map_err(open_err)?;

        let mut stream_config: cpal::StreamConfig = supported.clone().into();
        if let Some(buf) = device::pick_buffer_size(&supported, self.buffer_frames) {
            stream_config.buffer_size = buf;
        }
        tracing::info!(
            device = name.as_deref().unwrap_or("unknown"),
            rate_hz = stream_config.sample_rate,
            channels = stream_config.channels,
            sample_format = ?supported.sample_format(),
            buffer_size = ?stream_config.buffer_size,
            "device output config"
        );

        let volume = Arc::new(AtomicU32::new(1.0f32.to_bits()));
        let stream = build_output_stream(
            &device,
            &stream_config,
            supported.sample_format(),
            callback,
            volume.clone(),
        )
        .map_err(open_err)?;

        Ok(Box::new(CpalOutputDevice {
            stream,
            volume,
            name,
        }))
    }
}

/// Open CPAL stream plus the gain it applies.
pub struct CpalOutputDevice {
    stream: cpal::Stream,
    volume: Arc<AtomicU32>,
    name: Option<String>,
}

impl OutputDevice for CpalOutputDevice {
    fn start(&mut self) -> Result<()> {
        self.stream
            .play()
            .map_err(|e| SessionError::device_control("start", e))
    }

    fn stop(&mut self) -> Result<()> {
        self.stream
            .pause()
            .map_err(|e| SessionError::device_control("stop", e))
    }

    fn set_master_volume(&mut self, volume: f32) -> Result<()> {
        if !volume.is_finite() {
            return Err(SessionError::device_control(
                "set volume",
                format!("invalid gain {volume}"),
            ));
        }
        self.volume.store(volume.to_bits(), Ordering::Relaxed);
        Ok(())
    }

    fn master_volume(&self) -> Result<f32> {
        Ok(f32::from_bits(self.volume.load(Ordering::Relaxed)))
    }

    fn name(&self) -> Option<String> {
        self.name.clone()
    }
}

/// Build a stopped CPAL output stream that pulls audio from `callback`.
pub fn build_output_stream(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    sample_format: cpal::SampleFormat,
    callback: StreamCallback,
    volume: Arc<AtomicU32>,
) -> anyhow::Result<cpal::Stream> {
    let stream = match sample_format {
        cpal::SampleFormat::F32 => build_stream::<f32>(device, config, callback, volume),
        cpal::SampleFormat::I16 => build_stream::<i16>(device, config, callback, volume),
        cpal::SampleFormat::I32 => build_stream::<i32>(device, config, callback, volume),
        cpal::SampleFormat::U16 => build_stream::<u16>(device, config, callback, volume),
        other => Err(anyhow!("Unsupported sample format: {other:?}")),
    }?;
    // CPAL may auto-start some backends; the session decides when to play.
    if let Err(e) = stream.pause() {
        tracing::debug!("initial pause not supported: {e}");
    }
    Ok(stream)
}

/// Type-specialized stream builder for CPAL sample formats.
fn build_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    callback: StreamCallback,
    volume: Arc<AtomicU32>,
) -> anyhow::Result<cpal::Stream>
where
    T: cpal::Sample + cpal::SizedSample + cpal::FromSample<f32>,
{
    let channels = config.channels.max(1) as usize;
    let frames = match config.buffer_size {
        cpal::BufferSize::Fixed(frames) => frames.max(1) as usize,
        cpal::BufferSize::Default => MAX_BUFFER_FRAMES as usize,
    };
    let mut scratch = vec![0.0f32; frames * channels];

    let err_fn = |err| tracing::warn!("stream error: {err}");

    let stream = device.build_output_stream(
        config,
        move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
            if scratch.len() < data.len() {
                // Backend handed us more than it advertised.
                scratch.resize(data.len(), 0.0);
            }
            let buf = &mut scratch[..data.len()];
            callback.render(buf);
            let gain = f32::from_bits(volume.load(Ordering::Relaxed));
            for (dst, src) in data.iter_mut().zip(buf.iter()) {
                *dst = <T as cpal::Sample>::from_sample::<f32>(*src * gain);
            }
        },
        err_fn,
        None,
    )?;

    Ok(stream)
}
