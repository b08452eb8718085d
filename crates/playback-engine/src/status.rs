use std::sync::atomic::Ordering;

use serde::Serialize;

use crate::decode::{SourceInfo, StreamFormat};
use crate::state::{SharedState, StreamState};

/// Point-in-time view of a session, suitable for logs and JSON output.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct PlaybackStatus {
    /// Lifecycle state; `None` only for the default value.
    pub state: Option<StreamState>,
    /// Path of the loaded file.
    pub now_playing: Option<String>,
    /// Output device name, if a stream is open.
    pub device: Option<String>,
    /// Sample rate of the loaded file in Hz.
    pub sample_rate: Option<u32>,
    /// Channel count of the loaded file.
    pub channels: Option<u16>,
    /// Current frame offset.
    pub position_frames: u64,
    /// Elapsed playback time in milliseconds.
    pub position_ms: Option<u64>,
    /// Total duration in milliseconds when known.
    pub duration_ms: Option<u64>,
    pub volume: f32,
    pub looping: bool,
    /// Source codec (for example `FLAC`, `MP3`).
    pub source_codec: Option<String>,
    pub source_bit_depth: Option<u16>,
    pub container: Option<String>,
    /// Callback invocations since the stream was opened.
    pub callbacks: u64,
    /// Frames rendered as silence since the stream was opened.
    pub silent_frames: u64,
    /// Deferred seeks the decoder rejected.
    pub seek_failures: u64,
}

/// File-specific part of a snapshot.
pub(crate) struct TrackView<'a> {
    pub path: &'a str,
    pub format: StreamFormat,
    pub duration_frames: Option<u64>,
    pub info: &'a SourceInfo,
}

impl PlaybackStatus {
    pub(crate) fn capture(
        shared: &SharedState,
        track: Option<TrackView<'_>>,
        device: Option<String>,
    ) -> Self {
        let position_frames = shared.cursor().frame;
        let mut status = PlaybackStatus {
            state: Some(shared.state()),
            device,
            position_frames,
            volume: shared.volume(),
            looping: shared.looping(),
            callbacks: shared.counters.callbacks.load(Ordering::Relaxed),
            silent_frames: shared.counters.silent_frames.load(Ordering::Relaxed),
            seek_failures: shared.counters.seek_failures.load(Ordering::Relaxed),
            ..Default::default()
        };
        if let Some(track) = track {
            let rate = track.format.sample_rate;
            status.now_playing = Some(track.path.to_string());
            status.sample_rate = Some(rate);
            status.channels = Some(track.format.channels);
            status.position_ms = frames_to_ms(position_frames, rate);
            status.duration_ms = track
                .duration_frames
                .and_then(|frames| frames_to_ms(frames, rate));
            status.source_codec = track.info.codec.clone();
            status.source_bit_depth = track.info.bit_depth;
            status.container = track.info.container.clone();
        }
        status
    }
}

/// Convert a frame count at `sample_rate` to milliseconds.
pub fn frames_to_ms(frames: u64, sample_rate: u32) -> Option<u64> {
    if sample_rate == 0 {
        return None;
    }
    Some(frames.saturating_mul(1000) / sample_rate as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frames_to_ms_handles_zero_rate() {
        assert!(frames_to_ms(100, 0).is_none());
        assert_eq!(frames_to_ms(96_000, 48_000), Some(2000));
    }

    #[test]
    fn capture_reports_elapsed_and_duration() {
        let shared = SharedState::new(0.5, true);
        shared.set_state(StreamState::Active);
        shared.request_seek(24_000);
        let info = SourceInfo {
            codec: Some("FLAC".to_string()),
            bit_depth: Some(24),
            container: Some("flac".to_string()),
        };

        let status = PlaybackStatus::capture(
            &shared,
            Some(TrackView {
                path: "song.flac",
                format: StreamFormat {
                    sample_rate: 48_000,
                    channels: 2,
                },
                duration_frames: Some(480_000),
                info: &info,
            }),
            Some("USB DAC".to_string()),
        );

        assert_eq!(status.state, Some(StreamState::Active));
        assert_eq!(status.position_ms, Some(500));
        assert_eq!(status.duration_ms, Some(10_000));
        assert_eq!(status.source_codec.as_deref(), Some("FLAC"));
        assert_eq!(status.volume, 0.5);
        assert!(status.looping);
    }

    #[test]
    fn capture_without_track_clears_file_fields() {
        let shared = SharedState::default();
        let status = PlaybackStatus::capture(&shared, None, None);
        assert_eq!(status.state, Some(StreamState::Idle));
        assert!(status.now_playing.is_none());
        assert!(status.sample_rate.is_none());
        assert!(status.position_ms.is_none());
    }
}
