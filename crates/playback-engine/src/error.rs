//! Error types returned by the playback control surface.
//!
//! Every error is reported synchronously by the foreground call that triggered it.
//! The real-time callback has no error channel and never produces one of these.

use thiserror::Error;

use crate::state::StreamState;

/// Errors that can occur while driving a [`crate::session::PlaybackSession`].
#[derive(Error, Debug)]
pub enum SessionError {
    /// The platform audio subsystem could not be initialized or enumerated.
    #[error("audio backend unavailable: {0}")]
    BackendInit(String),

    /// The backend reports zero playback devices.
    #[error("no playback device available")]
    NoDevice,

    /// The file is missing, unreadable, or in an unsupported/corrupt format.
    #[error("decode error: {0}")]
    Decode(String),

    /// The backend could not open a device with the requested format.
    #[error("failed to open output device: {0}")]
    DeviceOpen(String),

    /// A start/stop/volume call was rejected by the backend.
    #[error("device {op} failed: {reason}")]
    DeviceControl { op: &'static str, reason: String },

    /// The operation is not legal in the session's current state.
    #[error("cannot {op} while stream is {state}")]
    InvalidState { op: &'static str, state: StreamState },
}

impl SessionError {
    pub(crate) fn device_control(op: &'static str, err: impl std::fmt::Display) -> Self {
        SessionError::DeviceControl {
            op,
            reason: err.to_string(),
        }
    }
}

/// Result type for playback operations.
pub type Result<T> = std::result::Result<T, SessionError>;
