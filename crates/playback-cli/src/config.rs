use std::path::PathBuf;
use std::time::Duration;

use playback_engine::EngineConfig;

use crate::cli::PlayArgs;

#[derive(Clone, Debug)]
pub struct PlayConfig {
    pub path: PathBuf,
    pub engine: EngineConfig,
    pub start_secs: Option<f64>,
    pub status_json: bool,
}

impl PlayConfig {
    pub fn from_args(path: PathBuf, device: Option<String>, opts: PlayArgs) -> Self {
        let defaults = EngineConfig::default();
        Self {
            path,
            engine: EngineConfig {
                device,
                buffer_frames: opts.buffer_frames,
                initial_volume: opts.volume,
                looping: opts.looping,
                poll_interval: match opts.poll_ms {
                    0 => defaults.poll_interval,
                    ms => Duration::from_millis(ms),
                },
            },
            start_secs: opts.start_secs,
            status_json: opts.status_json,
        }
    }
}
