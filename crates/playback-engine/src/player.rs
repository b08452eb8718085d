//! High-level player over a [`PlaybackSession`].
//!
//! Adds the usual transport semantics on top of the raw state machine:
//! play-from-start, pause/resume that keep position, stop that rewinds, seeking in seconds,
//! and [`Player::tick`] which fulfils the session's polling contract.

use std::path::Path;

use crate::config::EngineConfig;
use crate::error::{Result, SessionError};
use crate::session::PlaybackSession;
use crate::state::{StreamState, clamp_volume};

/// Transport-level controller for one file at a time.
pub struct Player {
    session: PlaybackSession,
    device_available: bool,
    paused: bool,
}

impl Player {
    /// Player over CPAL + Symphonia.
    pub fn new(config: &EngineConfig) -> Self {
        Self::with_session(PlaybackSession::from_config(config))
    }

    /// Wrap an existing session. Probes for a playback device once.
    pub fn with_session(session: PlaybackSession) -> Self {
        let device_available = match session.probe_device_availability() {
            Ok(_) => true,
            Err(e) => {
                tracing::error!("no device is available for playback: {e}");
                false
            }
        };
        Self {
            session,
            device_available,
            paused: false,
        }
    }

    /// Load `path`, replacing any current playback, and open a stopped stream for it.
    ///
    /// A missing file is rejected before the current stream is touched.
    pub fn load(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if !self.device_available {
            return Err(SessionError::NoDevice);
        }
        if !path.exists() {
            return Err(SessionError::Decode(format!("audio file not found: {path:?}")));
        }

        if let Err(e) = self.session.terminate_stream() {
            tracing::warn!("previous stream teardown: {e}");
        }
        self.paused = false;
        self.session.load_file(path)?;
        self.session.init_stream()
    }

    /// Play the loaded file from the beginning, even if currently paused.
    pub fn play(&mut self) -> Result<()> {
        self.play_from(0.0)
    }

    /// Play the loaded file from `secs`, clamped to `[0, duration]`.
    ///
    /// The start position is published before the device starts, so the first callback
    /// already renders from it.
    pub fn play_from(&mut self, secs: f64) -> Result<()> {
        let state = self.session.state();
        if !state.is_stream_ready() {
            return Err(SessionError::InvalidState { op: "play", state });
        }
        self.session.stop()?;
        self.session.seek(self.secs_to_frame(secs));
        self.paused = false;
        self.session.start()
    }

    /// Stop and rewind to the start. No effect when inactive.
    pub fn stop(&mut self) -> Result<()> {
        if !self.active() {
            return Ok(());
        }
        if !self.paused {
            self.session.stop()?;
        }
        self.session.seek(0);
        self.paused = false;
        Ok(())
    }

    /// Pause, keeping position. No effect when inactive or already paused.
    pub fn pause(&mut self) -> Result<()> {
        if self.active() && !self.paused {
            self.session.stop()?;
            self.paused = true;
        }
        Ok(())
    }

    /// Resume after [`Self::pause`]. No effect when inactive or not paused.
    pub fn resume(&mut self) -> Result<()> {
        if self.active() && self.paused {
            self.session.start()?;
            self.paused = false;
        }
        Ok(())
    }

    /// Jump to `secs`, clamped to `[0, duration]`. No effect when inactive.
    pub fn seek_secs(&mut self, secs: f64) {
        if !self.active() {
            return;
        }
        self.session.seek(self.secs_to_frame(secs));
    }

    /// Set the volume (clamped to `0.0..=1.0`). Remembered across loads.
    pub fn set_volume(&mut self, volume: f32) -> Result<()> {
        self.session.set_volume(clamp_volume(volume))
    }

    /// Current volume; falls back to the last known value if the device read fails.
    pub fn volume(&self) -> f32 {
        match self.session.volume() {
            Ok(v) => v,
            Err(e) => {
                tracing::debug!("volume read failed: {e}");
                self.session.settings().volume
            }
        }
    }

    pub fn set_looping(&mut self, looping: bool) {
        self.session.set_looping(looping);
    }

    pub fn looping(&self) -> bool {
        self.session.is_looping()
    }

    /// `true` while playing or paused.
    pub fn active(&self) -> bool {
        match self.session.state() {
            StreamState::Active => true,
            state if state.is_stream_ready() => self.paused,
            _ => false,
        }
    }

    pub fn paused(&self) -> bool {
        self.paused
    }

    /// Position in seconds; `0.0` when inactive.
    pub fn position_secs(&self) -> f64 {
        if !self.active() {
            return 0.0;
        }
        self.session.position().as_secs_f64()
    }

    pub fn duration_secs(&self) -> Option<f64> {
        self.session.duration().map(|d| d.as_secs_f64())
    }

    /// Handle a natural end-of-stream if one happened. Returns `true` when it did.
    ///
    /// Call this regularly (or after [`PlaybackSession::ended_events`] fires) while playing.
    pub fn tick(&mut self) -> Result<bool> {
        if !self.session.poll_ended_naturally() {
            return Ok(false);
        }
        tracing::info!("playback reached end of file");
        self.session.stop()?;
        self.paused = false;
        Ok(true)
    }

    pub fn session(&self) -> &PlaybackSession {
        &self.session
    }

    fn secs_to_frame(&self, secs: f64) -> u64 {
        let rate = self.session.sample_rate() as f64;
        let max = self.duration_secs().unwrap_or(f64::INFINITY);
        let secs = if secs.is_nan() { 0.0 } else { secs.clamp(0.0, max) };
        (secs * rate).floor() as u64
    }
}
