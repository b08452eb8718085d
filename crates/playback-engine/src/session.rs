//! Foreground control surface for one open file.
//!
//! [`PlaybackSession`] owns the decoder and the output device and is the only writer of
//! intentional state changes. The device callback ([`StreamCallback`]) shares the atomics in
//! [`SharedState`] with it and reports natural end-of-stream back through them.
//!
//! ## Polling contract
//! The callback cannot stop the device. After `start`, the foreground must either poll
//! [`PlaybackSession::poll_ended_naturally`] or wait on [`PlaybackSession::ended_events`],
//! then `stop`/`terminate_stream` (or seek + `start` to replay).

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use crossbeam_channel::{Receiver, Sender};

use crate::callback::StreamCallback;
use crate::config::EngineConfig;
use crate::decode::{Decoder, DecoderFactory, DecoderSlot, SourceInfo, StreamFormat, SymphoniaDecoderFactory};
use crate::device::{AudioBackend, OutputDevice};
use crate::error::{Result, SessionError};
use crate::playback::CpalBackend;
use crate::state::{SharedState, StreamState, clamp_volume};
use crate::status::{PlaybackStatus, TrackView};

/// Settings that survive `terminate_stream` and the next `load_file`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PersistentSettings {
    pub volume: f32,
    pub looping: bool,
}

/// Snapshot of the loaded file. Reset on every load/terminate.
#[derive(Clone, Debug)]
struct LoadedTrack {
    path: PathBuf,
    format: StreamFormat,
    duration_frames: Option<u64>,
    info: SourceInfo,
}

/// Playback state machine for a single audio file.
pub struct PlaybackSession {
    backend: Box<dyn AudioBackend>,
    decoders: Box<dyn DecoderFactory>,
    shared: Arc<SharedState>,
    decoder: DecoderSlot,
    device: Option<Box<dyn OutputDevice>>,
    track: Option<LoadedTrack>,
    ended_tx: Sender<()>,
    ended_rx: Receiver<()>,
}

impl PlaybackSession {
    /// Create a session over explicit collaborators.
    pub fn new(
        backend: impl AudioBackend + 'static,
        decoders: impl DecoderFactory + 'static,
        settings: PersistentSettings,
    ) -> Self {
        let (ended_tx, ended_rx) = crossbeam_channel::bounded(1);
        Self {
            backend: Box::new(backend),
            decoders: Box::new(decoders),
            shared: Arc::new(SharedState::new(settings.volume, settings.looping)),
            decoder: Arc::new(Mutex::new(None)),
            device: None,
            track: None,
            ended_tx,
            ended_rx,
        }
    }

    /// CPAL output + Symphonia decoding, configured from `config`.
    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(
            CpalBackend::from_config(config),
            SymphoniaDecoderFactory,
            PersistentSettings {
                volume: config.initial_volume,
                looping: config.looping,
            },
        )
    }

    /// Number of playback devices the backend can see.
    ///
    /// Fails with `BackendInit` if enumeration fails and `NoDevice` if there are none.
    pub fn probe_device_availability(&self) -> Result<usize> {
        let count = self.backend.playback_device_count()?;
        if count == 0 {
            return Err(SessionError::NoDevice);
        }
        tracing::debug!(count, "playback devices available");
        Ok(count)
    }

    /// Open `path` and record its native format.
    ///
    /// Only legal without an open stream; call [`Self::terminate_stream`] first. On failure
    /// the previously loaded file (if any) stays loaded.
    pub fn load_file(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let state = self.shared.state();
        if state.is_stream_ready() {
            return Err(SessionError::InvalidState {
                op: "load file",
                state,
            });
        }

        let decoder = self.decoders.open(path)?;
        let track = LoadedTrack {
            path: path.to_path_buf(),
            format: decoder.format(),
            duration_frames: decoder.duration_frames(),
            info: decoder.source_info(),
        };
        tracing::info!(
            path = ?path,
            rate_hz = track.format.sample_rate,
            channels = track.format.channels,
            frames = ?track.duration_frames,
            "file loaded"
        );

        self.replace_decoder(Some(decoder));
        self.track = Some(track);
        self.shared.reset_cursor();
        self.shared.set_state(StreamState::Loaded);
        Ok(())
    }

    /// Open the output device for the loaded file's format.
    pub fn init_stream(&mut self) -> Result<()> {
        let state = self.shared.state();
        let format = match (&self.track, state) {
            (Some(track), StreamState::Loaded) => track.format,
            _ => {
                return Err(SessionError::InvalidState {
                    op: "init stream",
                    state,
                });
            }
        };

        let callback = StreamCallback::new(
            self.shared.clone(),
            self.decoder.clone(),
            format.channels,
            self.ended_tx.clone(),
        );
        let mut device = self.backend.open(format, callback)?;

        let volume = self.shared.volume();
        if let Err(e) = device.set_master_volume(volume) {
            tracing::warn!(volume, "could not apply volume to new stream: {e}");
        }

        self.device = Some(device);
        self.shared.counters.reset();
        self.shared.reset_cursor();
        self.shared.set_state(StreamState::StreamReady);
        tracing::debug!(
            rate_hz = format.sample_rate,
            channels = format.channels,
            "stream ready"
        );
        Ok(())
    }

    /// Ask the device to start pulling frames.
    pub fn start(&mut self) -> Result<()> {
        let state = self.shared.state();
        let device = match self.device.as_mut() {
            Some(device) if state.is_stream_ready() => device,
            _ => return Err(SessionError::InvalidState { op: "start", state }),
        };

        while self.ended_rx.try_recv().is_ok() {}
        self.shared.set_state(StreamState::Active);
        if let Err(e) = device.start() {
            self.shared.set_state(state);
            return Err(e);
        }
        tracing::debug!(frame = self.shared.cursor().frame, "stream started");
        Ok(())
    }

    /// Ask the device to stop pulling frames. Stopping a stopped stream is not an error.
    pub fn stop(&mut self) -> Result<()> {
        let state = self.shared.state();
        let Some(device) = self.device.as_mut() else {
            return Ok(());
        };
        if !matches!(state, StreamState::Active | StreamState::Ended) {
            return Ok(());
        }

        device.stop()?;
        self.shared.set_state(StreamState::StreamReady);
        tracing::debug!(frame = self.shared.cursor().frame, "stream stopped");
        Ok(())
    }

    /// Tear down the device, then the decoder, and reset file-specific state.
    ///
    /// Safe to call at any time. State is always cleared; the first device error (if any)
    /// is returned afterwards.
    pub fn terminate_stream(&mut self) -> Result<()> {
        let mut first_err = None;

        if let Some(mut device) = self.device.take() {
            if matches!(
                self.shared.state(),
                StreamState::Active | StreamState::Ended
            ) {
                if let Err(e) = device.stop() {
                    tracing::warn!("device stop during teardown failed: {e}");
                    first_err = Some(e);
                }
            }
            self.shared.set_state(StreamState::Idle);
            drop(device);
        }

        // Blocks until an in-flight callback releases the decoder.
        self.replace_decoder(None);
        if let Some(track) = self.track.take() {
            tracing::debug!(path = ?track.path, "stream terminated");
        }
        self.shared.reset_cursor();
        self.shared.set_state(StreamState::Idle);
        while self.ended_rx.try_recv().is_ok() {}

        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Request playback to continue from `frame`.
    ///
    /// The decoder is not touched here; the next callback performs the seek. The position is
    /// clamped to the file length when known. Does nothing when no file is loaded.
    pub fn seek(&self, frame: u64) {
        let Some(track) = self.track.as_ref() else {
            tracing::debug!(frame, "seek ignored: no file loaded");
            return;
        };
        let frame = track.duration_frames.map_or(frame, |len| frame.min(len));
        self.shared.request_seek(frame);
    }

    /// Set the master volume (clamped to `0.0..=1.0`).
    ///
    /// With an open stream the device is updated first; without one the value is applied
    /// when the next stream opens.
    pub fn set_volume(&mut self, volume: f32) -> Result<()> {
        let volume = clamp_volume(volume);
        if let Some(device) = self.device.as_mut() {
            device.set_master_volume(volume)?;
        }
        self.shared.set_volume(volume);
        Ok(())
    }

    /// Current master volume, read back from the device when a stream is open.
    pub fn volume(&self) -> Result<f32> {
        if let Some(device) = self.device.as_ref() {
            let volume = device.master_volume()?;
            self.shared.set_volume(volume);
        }
        Ok(self.shared.volume())
    }

    /// Enable or disable looping. Takes effect at the next natural end-of-stream.
    pub fn set_looping(&self, looping: bool) {
        self.shared.set_looping(looping);
    }

    pub fn is_looping(&self) -> bool {
        self.shared.looping()
    }

    pub fn settings(&self) -> PersistentSettings {
        PersistentSettings {
            volume: self.shared.volume(),
            looping: self.shared.looping(),
        }
    }

    /// `true` once the decoder ran out of frames with looping disabled, until the foreground
    /// stops, restarts, or terminates the stream.
    pub fn poll_ended_naturally(&self) -> bool {
        self.shared.state() == StreamState::Ended
    }

    /// One-shot notification sent by the callback at natural end-of-stream.
    ///
    /// Events are advisory; confirm with [`Self::poll_ended_naturally`].
    pub fn ended_events(&self) -> Receiver<()> {
        self.ended_rx.clone()
    }

    pub fn state(&self) -> StreamState {
        self.shared.state()
    }

    pub fn is_stream_ready(&self) -> bool {
        self.shared.state().is_stream_ready()
    }

    pub fn is_stream_active(&self) -> bool {
        self.shared.state() == StreamState::Active
    }

    pub fn format(&self) -> Option<StreamFormat> {
        self.track.as_ref().map(|t| t.format)
    }

    /// Sample rate of the loaded file, `0` when nothing is loaded.
    pub fn sample_rate(&self) -> u32 {
        self.format().map(|f| f.sample_rate).unwrap_or(0)
    }

    /// Channel count of the loaded file, `0` when nothing is loaded.
    pub fn num_channels(&self) -> u16 {
        self.format().map(|f| f.channels).unwrap_or(0)
    }

    pub fn duration_frames(&self) -> Option<u64> {
        self.track.as_ref().and_then(|t| t.duration_frames)
    }

    pub fn duration(&self) -> Option<Duration> {
        let track = self.track.as_ref()?;
        let frames = track.duration_frames?;
        Some(frames_to_duration(frames, track.format.sample_rate))
    }

    /// Current read position in PCM frames (the last requested seek target if one is pending).
    pub fn frame_offset(&self) -> u64 {
        self.shared.cursor().frame
    }

    pub fn position(&self) -> Duration {
        frames_to_duration(self.frame_offset(), self.sample_rate())
    }

    pub fn source_info(&self) -> Option<&SourceInfo> {
        self.track.as_ref().map(|t| &t.info)
    }

    pub fn path(&self) -> Option<&Path> {
        self.track.as_ref().map(|t| t.path.as_path())
    }

    pub fn status(&self) -> PlaybackStatus {
        let path = self
            .track
            .as_ref()
            .map(|t| t.path.display().to_string());
        let track = self.track.as_ref().zip(path.as_deref()).map(|(t, path)| TrackView {
            path,
            format: t.format,
            duration_frames: t.duration_frames,
            info: &t.info,
        });
        let device = self.device.as_ref().and_then(|d| d.name());
        PlaybackStatus::capture(&self.shared, track, device)
    }

    fn lock_decoder(&self) -> MutexGuard<'_, Option<Box<dyn Decoder>>> {
        self.decoder.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn replace_decoder(&self, decoder: Option<Box<dyn Decoder>>) {
        let previous = std::mem::replace(&mut *self.lock_decoder(), decoder);
        drop(previous);
    }
}

impl Drop for PlaybackSession {
    fn drop(&mut self) {
        if let Err(e) = self.terminate_stream() {
            tracing::warn!("teardown on drop failed: {e}");
        }
    }
}

fn frames_to_duration(frames: u64, sample_rate: u32) -> Duration {
    if sample_rate == 0 {
        return Duration::ZERO;
    }
    Duration::from_secs_f64(frames as f64 / sample_rate as f64)
}
