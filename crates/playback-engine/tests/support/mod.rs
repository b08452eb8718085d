//! In-memory decoder and device used to drive the session without audio hardware.

#![allow(dead_code)]

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use playback_engine::callback::StreamCallback;
use playback_engine::decode::{Decoder, DecoderFactory, StreamFormat};
use playback_engine::device::{AudioBackend, OutputDevice};
use playback_engine::{PersistentSettings, PlaybackSession, Result, SessionError};

/// Source whose frame `i` carries sample value `i` on every channel.
pub struct RampDecoder {
    format: StreamFormat,
    len: u64,
    pos: u64,
    seeks: Arc<AtomicUsize>,
}

impl Decoder for RampDecoder {
    fn format(&self) -> StreamFormat {
        self.format
    }

    fn duration_frames(&self) -> Option<u64> {
        Some(self.len)
    }

    fn read_frames(&mut self, out: &mut [f32], frames: usize) -> usize {
        let channels = self.format.channels as usize;
        let n = (self.len - self.pos).min(frames as u64) as usize;
        for frame in 0..n {
            let value = (self.pos + frame as u64) as f32;
            out[frame * channels..(frame + 1) * channels].fill(value);
        }
        self.pos += n as u64;
        n
    }

    fn seek(&mut self, frame: u64) -> Result<()> {
        self.seeks.fetch_add(1, Ordering::SeqCst);
        self.pos = frame.min(self.len);
        Ok(())
    }

    fn position(&self) -> u64 {
        self.pos
    }
}

/// Factory serving registered fake files.
#[derive(Clone, Default)]
pub struct FakeDecoders {
    files: Arc<Mutex<HashMap<PathBuf, (StreamFormat, u64)>>>,
    pub seeks: Arc<AtomicUsize>,
    pub opens: Arc<AtomicUsize>,
}

impl FakeDecoders {
    pub fn add(&self, path: impl Into<PathBuf>, sample_rate: u32, channels: u16, frames: u64) {
        self.files.lock().unwrap().insert(
            path.into(),
            (
                StreamFormat {
                    sample_rate,
                    channels,
                },
                frames,
            ),
        );
    }

    pub fn seek_count(&self) -> usize {
        self.seeks.load(Ordering::SeqCst)
    }
}

impl DecoderFactory for FakeDecoders {
    fn open(&self, path: &Path) -> Result<Box<dyn Decoder>> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        let files = self.files.lock().unwrap();
        let (format, len) = files
            .get(path)
            .copied()
            .ok_or_else(|| SessionError::Decode(format!("unsupported file {path:?}")))?;
        Ok(Box::new(RampDecoder {
            format,
            len,
            pos: 0,
            seeks: self.seeks.clone(),
        }))
    }
}

#[derive(Default)]
pub struct DeviceLog {
    pub device_count: usize,
    pub fail_open: bool,
    pub fail_start: bool,
    pub fail_stop: bool,
    pub fail_volume: bool,
    pub opened_formats: Vec<StreamFormat>,
    pub starts: usize,
    pub stops: usize,
    pub closes: usize,
    pub volume: f32,
    pub callback: Option<StreamCallback>,
}

/// Backend whose devices record calls and echo volume back.
#[derive(Clone)]
pub struct FakeBackend {
    pub log: Arc<Mutex<DeviceLog>>,
}

impl FakeBackend {
    pub fn with_devices(count: usize) -> Self {
        Self {
            log: Arc::new(Mutex::new(DeviceLog {
                device_count: count,
                volume: 1.0,
                ..Default::default()
            })),
        }
    }

    /// Invoke the device callback for `frames` frames, like the audio thread would.
    pub fn pull(&self, frames: usize) -> (usize, Vec<f32>) {
        self.try_pull(frames).expect("stream not open")
    }

    /// Like [`Self::pull`], but `None` once the device has been closed.
    pub fn try_pull(&self, frames: usize) -> Option<(usize, Vec<f32>)> {
        let log = self.log.lock().unwrap();
        let callback = log.callback.as_ref()?;
        let mut out = vec![f32::NAN; frames * callback.channels()];
        let produced = callback.render(&mut out);
        Some((produced, out))
    }
}

impl AudioBackend for FakeBackend {
    fn playback_device_count(&self) -> Result<usize> {
        Ok(self.log.lock().unwrap().device_count)
    }

    fn open(&self, format: StreamFormat, callback: StreamCallback) -> Result<Box<dyn OutputDevice>> {
        let mut log = self.log.lock().unwrap();
        if log.fail_open {
            return Err(SessionError::DeviceOpen(format!("{format:?} rejected")));
        }
        log.opened_formats.push(format);
        log.callback = Some(callback);
        Ok(Box::new(FakeDevice {
            log: self.log.clone(),
        }))
    }
}

pub struct FakeDevice {
    log: Arc<Mutex<DeviceLog>>,
}

impl OutputDevice for FakeDevice {
    fn start(&mut self) -> Result<()> {
        let mut log = self.log.lock().unwrap();
        if log.fail_start {
            return Err(SessionError::DeviceControl {
                op: "start",
                reason: "device removed".to_string(),
            });
        }
        log.starts += 1;
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        let mut log = self.log.lock().unwrap();
        if log.fail_stop {
            return Err(SessionError::DeviceControl {
                op: "stop",
                reason: "device unplugged".to_string(),
            });
        }
        log.stops += 1;
        Ok(())
    }

    fn set_master_volume(&mut self, volume: f32) -> Result<()> {
        let mut log = self.log.lock().unwrap();
        if log.fail_volume {
            return Err(SessionError::DeviceControl {
                op: "set volume",
                reason: "rejected".to_string(),
            });
        }
        log.volume = volume;
        Ok(())
    }

    fn master_volume(&self) -> Result<f32> {
        Ok(self.log.lock().unwrap().volume)
    }

    fn name(&self) -> Option<String> {
        Some("fake output".to_string())
    }
}

impl Drop for FakeDevice {
    fn drop(&mut self) {
        let mut log = self.log.lock().unwrap();
        log.closes += 1;
        log.callback = None;
    }
}

pub fn session(backend: &FakeBackend, decoders: &FakeDecoders) -> PlaybackSession {
    PlaybackSession::new(
        backend.clone(),
        decoders.clone(),
        PersistentSettings {
            volume: 1.0,
            looping: false,
        },
    )
}
