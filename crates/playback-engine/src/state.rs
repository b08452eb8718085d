//! State shared between the foreground control API and the device callback.
//!
//! Every field that crosses the real-time boundary lives here and is atomic:
//! - the lifecycle [`StreamState`]
//! - the seek cursor (frame offset + pending flag, published as one word)
//! - the loop flag and master volume, which persist across file loads
//! - a few counters for status reporting
//!
//! No locks are taken on any of these paths.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU8, AtomicU32, AtomicU64, Ordering};

use serde::Serialize;

/// Lifecycle of a playback session.
///
/// Legal transitions:
/// `Idle -> Loaded -> StreamReady <-> Active -> Ended -> (StreamReady | Active)`, and any
/// state back to `Idle` on terminate.
#[repr(u8)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamState {
    /// No file loaded.
    Idle = 0,
    /// A decoder is open but no device exists yet.
    Loaded = 1,
    /// The device is open and stopped (or paused).
    StreamReady = 2,
    /// The device is pulling frames.
    Active = 3,
    /// The decoder ran out of frames with looping disabled. The device may still be
    /// running until the foreground stops it.
    Ended = 4,
}

impl StreamState {
    fn from_u8(raw: u8) -> Self {
        match raw {
            1 => StreamState::Loaded,
            2 => StreamState::StreamReady,
            3 => StreamState::Active,
            4 => StreamState::Ended,
            _ => StreamState::Idle,
        }
    }

    /// `true` once the device is open and until it is torn down.
    pub fn is_stream_ready(self) -> bool {
        matches!(
            self,
            StreamState::StreamReady | StreamState::Active | StreamState::Ended
        )
    }
}

impl fmt::Display for StreamState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StreamState::Idle => "idle",
            StreamState::Loaded => "loaded",
            StreamState::StreamReady => "ready",
            StreamState::Active => "active",
            StreamState::Ended => "ended",
        };
        f.write_str(name)
    }
}

const SEEK_PENDING: u64 = 1 << 63;
const FRAME_MASK: u64 = SEEK_PENDING - 1;

/// Decoded view of the packed seek word.
///
/// The frame offset and the "decoder must seek before the next read" flag are stored in a
/// single `AtomicU64` (flag in bit 63) so the callback can never observe one without the
/// other.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SeekCursor {
    pub frame: u64,
    pub pending: bool,
}

impl SeekCursor {
    pub(crate) fn settled(frame: u64) -> Self {
        Self {
            frame: frame & FRAME_MASK,
            pending: false,
        }
    }

    pub(crate) fn requested(frame: u64) -> Self {
        Self {
            frame: frame & FRAME_MASK,
            pending: true,
        }
    }

    pub(crate) fn pack(self) -> u64 {
        let flag = if self.pending { SEEK_PENDING } else { 0 };
        (self.frame & FRAME_MASK) | flag
    }

    pub(crate) fn unpack(word: u64) -> Self {
        Self {
            frame: word & FRAME_MASK,
            pending: word & SEEK_PENDING != 0,
        }
    }
}

/// Counters bumped from the device callback.
#[derive(Debug, Default)]
pub struct StreamCounters {
    /// Number of callback invocations.
    pub callbacks: AtomicU64,
    /// Frames written as silence (paused, ended, decoder busy, or end-of-stream tail).
    pub silent_frames: AtomicU64,
    /// Deferred decoder seeks that failed.
    pub seek_failures: AtomicU64,
}

impl StreamCounters {
    pub(crate) fn reset(&self) {
        self.callbacks.store(0, Ordering::Relaxed);
        self.silent_frames.store(0, Ordering::Relaxed);
        self.seek_failures.store(0, Ordering::Relaxed);
    }
}

/// Atomically published playback state.
#[derive(Debug)]
pub struct SharedState {
    state: AtomicU8,
    cursor: AtomicU64,
    looping: AtomicBool,
    volume: AtomicU32,
    pub counters: StreamCounters,
}

impl Default for SharedState {
    fn default() -> Self {
        Self::new(1.0, false)
    }
}

impl SharedState {
    pub fn new(volume: f32, looping: bool) -> Self {
        Self {
            state: AtomicU8::new(StreamState::Idle as u8),
            cursor: AtomicU64::new(0),
            looping: AtomicBool::new(looping),
            volume: AtomicU32::new(clamp_volume(volume).to_bits()),
            counters: StreamCounters::default(),
        }
    }

    pub fn state(&self) -> StreamState {
        StreamState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub(crate) fn set_state(&self, state: StreamState) {
        self.state.store(state as u8, Ordering::Release);
    }

    /// Move from `from` to `to` only if the current state is still `from`.
    pub(crate) fn transition(&self, from: StreamState, to: StreamState) -> bool {
        self.state
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub fn cursor(&self) -> SeekCursor {
        SeekCursor::unpack(self.cursor.load(Ordering::Acquire))
    }

    /// Publish a seek request from the foreground.
    pub(crate) fn request_seek(&self, frame: u64) {
        self.cursor
            .store(SeekCursor::requested(frame).pack(), Ordering::Release);
    }

    /// Clear position and any pending request.
    pub(crate) fn reset_cursor(&self) {
        self.cursor.store(0, Ordering::Release);
    }

    /// Replace `current` with `next` unless the foreground published something in between.
    pub(crate) fn swap_cursor(&self, current: SeekCursor, next: SeekCursor) -> bool {
        self.cursor
            .compare_exchange(
                current.pack(),
                next.pack(),
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }

    pub fn looping(&self) -> bool {
        self.looping.load(Ordering::Acquire)
    }

    pub(crate) fn set_looping(&self, looping: bool) {
        self.looping.store(looping, Ordering::Release);
    }

    pub fn volume(&self) -> f32 {
        f32::from_bits(self.volume.load(Ordering::Relaxed))
    }

    pub(crate) fn set_volume(&self, volume: f32) {
        self.volume
            .store(clamp_volume(volume).to_bits(), Ordering::Relaxed);
    }
}

/// Clamp a requested volume into `[0.0, 1.0]`; NaN maps to silence.
pub fn clamp_volume(volume: f32) -> f32 {
    if volume.is_nan() {
        0.0
    } else {
        volume.clamp(0.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cursor_pack_keeps_frame_and_flag_together() {
        let word = SeekCursor::requested(48_000).pack();
        assert_eq!(SeekCursor::unpack(word), SeekCursor::requested(48_000));

        let word = SeekCursor::settled(12).pack();
        let cursor = SeekCursor::unpack(word);
        assert_eq!(cursor.frame, 12);
        assert!(!cursor.pending);
    }

    #[test]
    fn swap_cursor_fails_after_foreground_request() {
        let shared = SharedState::default();
        let observed = shared.cursor();
        shared.request_seek(500);

        assert!(!shared.swap_cursor(observed, SeekCursor::settled(16)));
        assert_eq!(shared.cursor(), SeekCursor::requested(500));
    }

    #[test]
    fn transition_only_from_expected_state() {
        let shared = SharedState::default();
        shared.set_state(StreamState::StreamReady);
        assert!(!shared.transition(StreamState::Active, StreamState::Ended));
        assert_eq!(shared.state(), StreamState::StreamReady);

        shared.set_state(StreamState::Active);
        assert!(shared.transition(StreamState::Active, StreamState::Ended));
        assert_eq!(shared.state(), StreamState::Ended);
    }

    #[test]
    fn stream_ready_covers_open_device_states() {
        assert!(!StreamState::Idle.is_stream_ready());
        assert!(!StreamState::Loaded.is_stream_ready());
        assert!(StreamState::StreamReady.is_stream_ready());
        assert!(StreamState::Active.is_stream_ready());
        assert!(StreamState::Ended.is_stream_ready());
    }

    #[test]
    fn volume_is_clamped() {
        let shared = SharedState::new(3.0, false);
        assert_eq!(shared.volume(), 1.0);
        shared.set_volume(-0.5);
        assert_eq!(shared.volume(), 0.0);
        shared.set_volume(f32::NAN);
        assert_eq!(shared.volume(), 0.0);
        shared.set_volume(0.25);
        assert_eq!(shared.volume(), 0.25);
    }
}
