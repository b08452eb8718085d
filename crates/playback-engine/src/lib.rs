//! Single-file audio playback engine.
//!
//! A [`PlaybackSession`] decodes one file on demand and feeds an output device from a
//! real-time callback:
//! 1. **Decode**: [`decode::Decoder`] turns the file into interleaved `f32` frames (Symphonia).
//! 2. **Render**: [`callback::StreamCallback`] runs on the device thread, applies deferred
//!    seeks, reads frames, and tracks position / end-of-stream through atomics.
//! 3. **Output**: [`device::AudioBackend`] owns the hardware stream (CPAL).
//!
//! [`Player`] layers play/pause/resume/stop semantics on top of the session.

pub mod callback;
pub mod config;
pub mod decode;
pub mod device;
pub mod error;
pub mod playback;
pub mod player;
pub mod session;
pub mod state;
pub mod status;

pub use config::EngineConfig;
pub use decode::{SourceInfo, StreamFormat};
pub use error::{Result, SessionError};
pub use player::Player;
pub use session::{PersistentSettings, PlaybackSession};
pub use state::StreamState;
pub use status::PlaybackStatus;
