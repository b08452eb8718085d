use std::time::Duration;

/// Engine tuning and defaults shared by the session, the player facade and the CLI.
#[derive(Clone, Debug)]
pub struct EngineConfig {
    /// Output device substring match; `None` uses the host default device.
    pub device: Option<String>,
    /// Fixed device buffer size in frames; `None` lets the device range decide.
    pub buffer_frames: Option<u32>,
    /// Master volume applied to the first stream (0.0..=1.0).
    pub initial_volume: f32,
    /// Restart from frame 0 at natural end-of-stream.
    pub looping: bool,
    /// How often a foreground loop should check for natural end-of-stream.
    pub poll_interval: Duration,
}

impl Default for EngineConfig {
    /// Defaults tuned for low-risk playback across common devices.
    fn default() -> Self {
        Self {
            device: None,
            buffer_frames: None,
            initial_volume: 1.0,
            looping: false,
            poll_interval: Duration::from_millis(50),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_plays_once_at_full_volume() {
        let cfg = EngineConfig::default();
        assert_eq!(cfg.initial_volume, 1.0);
        assert!(!cfg.looping);
        assert!(cfg.device.is_none());
        assert!(cfg.poll_interval > Duration::ZERO);
    }
}
