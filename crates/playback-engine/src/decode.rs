//! Pull-based audio decode stage.
//!
//! The session only talks to the [`Decoder`] trait. The real implementation uses Symphonia to:
//! - probe the input container/codec
//! - decode packets into interleaved `f32` frames on demand
//! - seek to an exact PCM frame (coarse container seek, then discard up to the target)

use std::fs::File;
use std::path::Path;
use std::sync::{Arc, Mutex};

use anyhow::{Context, anyhow};
use serde::Serialize;
use symphonia::core::audio::{SampleBuffer, SignalSpec};
use symphonia::core::codecs::{CodecParameters, Decoder as CodecDecoder, DecoderOptions};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{FormatOptions, FormatReader, SeekMode, SeekTo};
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use symphonia::core::units::{Time, TimeBase};

use crate::error::{Result, SessionError};

/// Native PCM layout produced by a decoder. Samples are always interleaved `f32`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct StreamFormat {
    /// Sample rate in Hz.
    pub sample_rate: u32,
    /// Interleaved channel count.
    pub channels: u16,
}

/// Metadata captured while probing the source.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct SourceInfo {
    /// Codec name (best-effort).
    pub codec: Option<String>,
    /// Source bit depth (best-effort).
    pub bit_depth: Option<u16>,
    /// Container/extension hint (best-effort).
    pub container: Option<String>,
}

/// A decoder for one open file.
///
/// `read_frames` and `seek` are called from the device callback and must not block beyond
/// the decoder's own buffered reads. Dropping the decoder closes the file.
pub trait Decoder: Send {
    fn format(&self) -> StreamFormat;

    /// Total length in PCM frames, when the container reports it.
    fn duration_frames(&self) -> Option<u64>;

    fn source_info(&self) -> SourceInfo {
        SourceInfo::default()
    }

    /// Write up to `frames` interleaved frames into `out` and return how many were written.
    /// Fewer than requested means end-of-stream (or an unrecoverable decode error).
    fn read_frames(&mut self, out: &mut [f32], frames: usize) -> usize;

    /// Reposition so the next read starts at `frame`.
    ///
    /// On failure [`Self::position`] must still report where the next read starts.
    fn seek(&mut self, frame: u64) -> Result<()>;

    /// Frame index the next `read_frames` call starts at.
    fn position(&self) -> u64;
}

/// Opens decoders for paths. Lets tests swap in an in-memory source.
pub trait DecoderFactory {
    fn open(&self, path: &Path) -> Result<Box<dyn Decoder>>;
}

/// Decoder ownership shared between the session and the device callback.
///
/// The session replaces or clears the slot; the callback only ever `try_lock`s it.
pub type DecoderSlot = Arc<Mutex<Option<Box<dyn Decoder>>>>;

/// Factory for [`SymphoniaDecoder`].
#[derive(Clone, Copy, Debug, Default)]
pub struct SymphoniaDecoderFactory;

impl DecoderFactory for SymphoniaDecoderFactory {
    fn open(&self, path: &Path) -> Result<Box<dyn Decoder>> {
        let decoder =
            SymphoniaDecoder::open(path).map_err(|e| SessionError::Decode(format!("{e:#}")))?;
        Ok(Box::new(decoder))
    }
}

/// Symphonia-backed [`Decoder`].
pub struct SymphoniaDecoder {
    reader: Box<dyn FormatReader>,
    codec: Box<dyn CodecDecoder>,
    track_id: u32,
    format: StreamFormat,
    time_base: Option<TimeBase>,
    n_frames: Option<u64>,
    info: SourceInfo,
    buffer: Option<SampleBuffer<f32>>,
    /// Read position (in samples) inside `buffer`.
    pos: usize,
    /// Frames still to discard after an accurate seek landed early.
    skip_frames: u64,
    /// Frames handed out since the last successful seek target.
    position: u64,
}

impl SymphoniaDecoder {
    /// Probe `path` and prepare a decoder for its default track.
    pub fn open(path: &Path) -> anyhow::Result<Self> {
        let file = File::open(path).with_context(|| format!("open {:?}", path))?;

        let mut hint = Hint::new();
        let container = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase());
        if let Some(ext) = container.as_deref() {
            hint.with_extension(ext);
        }

        let mss = MediaSourceStream::new(Box::new(file), Default::default());
        let probed = symphonia::default::get_probe()
            .format(
                &hint,
                mss,
                &FormatOptions::default(),
                &MetadataOptions::default(),
            )
            .with_context(|| format!("probe {:?}", path))?;
        let reader = probed.format;

        let track = reader
            .default_track()
            .ok_or_else(|| anyhow!("No default audio track"))?;
        let track_id = track.id;
        let codec_params: CodecParameters = track.codec_params.clone();

        let channels = codec_params
            .channels
            .ok_or_else(|| anyhow!("Unknown channels"))?;
        let sample_rate = codec_params
            .sample_rate
            .ok_or_else(|| anyhow!("Unknown sample rate"))?;
        if sample_rate == 0 {
            return Err(anyhow!("Invalid sample rate 0"));
        }
        let channel_count =
            u16::try_from(channels.count()).map_err(|_| anyhow!("Too many channels"))?;

        let codec = symphonia::default::get_codecs()
            .make(&codec_params, &DecoderOptions::default())
            .context("unsupported codec")?;

        let buffer = codec_params.max_frames_per_packet.map(|frames| {
            SampleBuffer::<f32>::new(frames, SignalSpec::new(sample_rate, channels))
        });

        let info = SourceInfo {
            codec: codec_name_from_params(&codec_params),
            bit_depth: codec_params
                .bits_per_sample
                .or(codec_params.bits_per_coded_sample)
                .and_then(|v| u16::try_from(v).ok()),
            container,
        };

        tracing::debug!(
            path = ?path,
            rate_hz = sample_rate,
            channels = channel_count,
            frames = ?codec_params.n_frames,
            codec = info.codec.as_deref().unwrap_or("unknown"),
            "decoder opened"
        );

        Ok(Self {
            reader,
            codec,
            track_id,
            format: StreamFormat {
                sample_rate,
                channels: channel_count,
            },
            time_base: codec_params.time_base,
            n_frames: codec_params.n_frames,
            info,
            buffer,
            pos: 0,
            skip_frames: 0,
            position: 0,
        })
    }

    /// Samples decoded but not yet handed out.
    fn buffered_samples(&self) -> usize {
        self.buffer
            .as_ref()
            .map(|b| b.len().saturating_sub(self.pos))
            .unwrap_or(0)
    }

    /// Decode the next packet of our track into `buffer`. Returns `false` at end-of-stream.
    fn decode_next(&mut self) -> bool {
        loop {
            let packet = match self.reader.next_packet() {
                Ok(p) => p,
                Err(SymphoniaError::ResetRequired) => {
                    self.codec.reset();
                    continue;
                }
                Err(_) => return false, // EOF
            };
            if packet.track_id() != self.track_id {
                continue;
            }

            let decoded = match self.codec.decode(&packet) {
                Ok(d) => d,
                Err(SymphoniaError::DecodeError(_)) => continue,
                Err(_) => return false,
            };
            if decoded.frames() == 0 {
                continue;
            }

            let needed = decoded.capacity() * decoded.spec().channels.count();
            let too_small = self
                .buffer
                .as_ref()
                .map(|b| b.capacity() < needed)
                .unwrap_or(true);
            if too_small {
                self.buffer = Some(SampleBuffer::new(
                    decoded.capacity() as u64,
                    *decoded.spec(),
                ));
            }
            if let Some(buf) = self.buffer.as_mut() {
                buf.copy_interleaved_ref(decoded);
            }
            self.pos = 0;
            return true;
        }
    }

    fn frame_to_ts(&self, frame: u64) -> u64 {
        match self.time_base {
            Some(tb) if !is_frame_time_base(tb, self.format.sample_rate) => {
                let secs = frame as f64 / self.format.sample_rate as f64;
                tb.calc_timestamp(Time::from(secs))
            }
            _ => frame,
        }
    }

    fn ts_to_frames(&self, ts: u64) -> u64 {
        match self.time_base {
            Some(tb) if !is_frame_time_base(tb, self.format.sample_rate) => {
                let time = tb.calc_time(ts);
                let secs = time.seconds as f64 + time.frac;
                (secs * self.format.sample_rate as f64).round() as u64
            }
            _ => ts,
        }
    }
}

impl Decoder for SymphoniaDecoder {
    fn format(&self) -> StreamFormat {
        self.format
    }

    fn duration_frames(&self) -> Option<u64> {
        self.n_frames
    }

    fn source_info(&self) -> SourceInfo {
        self.info.clone()
    }

    fn read_frames(&mut self, out: &mut [f32], frames: usize) -> usize {
        let channels = self.format.channels.max(1) as usize;
        let frames = frames.min(out.len() / channels);
        let mut filled = 0usize;

        while filled < frames {
            if self.buffered_samples() < channels && !self.decode_next() {
                break;
            }
            let Some(buf) = self.buffer.as_ref() else {
                break;
            };
            let available = &buf.samples()[self.pos..];
            let available_frames = available.len() / channels;
            if available_frames == 0 {
                continue;
            }

            if self.skip_frames > 0 {
                let skip = available_frames.min(self.skip_frames as usize);
                self.pos += skip * channels;
                self.skip_frames -= skip as u64;
                continue;
            }

            let take = available_frames.min(frames - filled);
            let dst = &mut out[filled * channels..(filled + take) * channels];
            dst.copy_from_slice(&available[..take * channels]);
            self.pos += take * channels;
            filled += take;
        }

        self.position += filled as u64;
        filled
    }

    fn seek(&mut self, frame: u64) -> Result<()> {
        let ts = self.frame_to_ts(frame);
        let seeked = self
            .reader
            .seek(
                SeekMode::Accurate,
                SeekTo::TimeStamp {
                    ts,
                    track_id: self.track_id,
                },
            )
            .map_err(|e| SessionError::Decode(format!("seek to frame {frame}: {e}")))?;

        self.codec.reset();
        self.pos = self.buffer.as_ref().map(|b| b.len()).unwrap_or(0);
        self.skip_frames = self.ts_to_frames(seeked.required_ts.saturating_sub(seeked.actual_ts));
        self.position = frame;
        Ok(())
    }

    fn position(&self) -> u64 {
        self.position
    }
}

/// `true` when timestamps are already counted in PCM frames.
fn is_frame_time_base(tb: TimeBase, sample_rate: u32) -> bool {
    tb.numer == 1 && tb.denom == sample_rate
}

/// Best-effort codec label used for status payloads.
fn codec_name_from_params(params: &CodecParameters) -> Option<String> {
    use symphonia::core::codecs::*;
    let name = match params.codec {
        CODEC_TYPE_FLAC => "FLAC",
        CODEC_TYPE_MP3 => "MP3",
        CODEC_TYPE_AAC => "AAC",
        CODEC_TYPE_ALAC => "ALAC",
        CODEC_TYPE_VORBIS => "VORBIS",
        CODEC_TYPE_OPUS => "OPUS",
        CODEC_TYPE_PCM_S16LE | CODEC_TYPE_PCM_S16BE => "PCM_S16",
        CODEC_TYPE_PCM_S24LE | CODEC_TYPE_PCM_S24BE => "PCM_S24",
        CODEC_TYPE_PCM_S32LE | CODEC_TYPE_PCM_S32BE => "PCM_S32",
        CODEC_TYPE_PCM_F32LE | CODEC_TYPE_PCM_F32BE => "PCM_F32",
        _ => return None,
    };
    Some(name.to_string())
}
