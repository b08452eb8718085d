//! CLI runtime helpers.
//!
//! Provides device enumeration and local file playback driven by [`Player`].

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use anyhow::{Context, Result};
use crossbeam_channel::RecvTimeoutError;
use playback_engine::{Player, PlaybackStatus, device};

use crate::config::PlayConfig;

/// List output devices and print them to stdout.
pub fn list_devices() -> Result<()> {
    let host = cpal::default_host();
    device::list_devices(&host)
}

/// Play a local file until it ends, or until Ctrl-C when `install_ctrlc` is set.
///
/// Returns the status captured just before playback was stopped.
pub fn run_play(mut config: PlayConfig, install_ctrlc: bool) -> Result<PlaybackStatus> {
    let stop = Arc::new(AtomicBool::new(false));
    if install_ctrlc {
        let flag = stop.clone();
        if let Err(e) = ctrlc::set_handler(move || flag.store(true, Ordering::SeqCst)) {
            tracing::warn!("could not install Ctrl-C handler: {e}");
        }
    }

    config.engine.device = normalize_device_name(config.engine.device.take());
    let mut player = Player::new(&config.engine);
    player
        .load(&config.path)
        .with_context(|| format!("load {:?}", config.path))?;
    player
        .play_from(config.start_secs.unwrap_or(0.0))
        .context("start playback")?;

    let status = player.session().status();
    tracing::info!(
        device = status.device.as_deref().unwrap_or("default"),
        rate_hz = ?status.sample_rate,
        channels = ?status.channels,
        codec = ?status.source_codec,
        duration_ms = ?status.duration_ms,
        looping = status.looping,
        "playing"
    );

    wait_until_done(&mut player, &stop, config.engine.poll_interval)?;

    let status = player.session().status();
    player.stop()?;
    tracing::info!(
        position_ms = ?status.position_ms,
        silent_frames = status.silent_frames,
        "playback finished"
    );
    Ok(status)
}

/// Block until the file ends naturally or `stop` is raised.
fn wait_until_done(player: &mut Player, stop: &AtomicBool, poll: Duration) -> Result<()> {
    let ended = player.session().ended_events();
    loop {
        if stop.load(Ordering::SeqCst) {
            tracing::info!("stop requested");
            return Ok(());
        }
        match ended.recv_timeout(poll) {
            Ok(()) | Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => return Ok(()),
        }
        if player.tick()? {
            return Ok(());
        }
    }
}

fn normalize_device_name(device: Option<String>) -> Option<String> {
    device.and_then(|name| {
        let trimmed = name.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}
