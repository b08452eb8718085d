//! `playback`: play one local audio file through the default (or a chosen) output device.
//!
//! The file is decoded at its native sample rate and channel count; the device stream is
//! opened to match. Playback ends at end of file, or on Ctrl-C when `--loop` is set.

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use playback_cli::{cli, config::PlayConfig, runtime};

fn main() -> Result<()> {
    let args = cli::Args::parse();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new("info,playback_engine=info,playback_cli=info")
        }))
        .init();

    if args.list_devices {
        return runtime::list_devices();
    }

    match args.cmd {
        Some(cli::Command::Play { path, opts }) => {
            let config = PlayConfig::from_args(path, args.device, opts);
            let status_json = config.status_json;
            let status = runtime::run_play(config, true)?;
            if status_json {
                println!("{}", serde_json::to_string_pretty(&status)?);
            }
        }
        None => anyhow::bail!("nothing to do; try `playback play <PATH>` or `--list-devices`"),
    }

    Ok(())
}
