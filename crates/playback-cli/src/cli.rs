use std::path::PathBuf;

use clap::{Args as ClapArgs, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "playback", version)]
pub struct Args {
    #[command(subcommand)]
    pub cmd: Option<Command>,

    /// List output devices and exit
    #[arg(long)]
    pub list_devices: bool,

    /// Use a specific output device by substring match
    #[arg(long, global = true)]
    pub device: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Play a local file until it ends (or Ctrl-C)
    Play {
        /// Path to audio file
        path: PathBuf,

        #[command(flatten)]
        opts: PlayArgs,
    },
}

#[derive(ClapArgs, Debug, Clone)]
pub struct PlayArgs {
    /// Master volume, 0.0..=1.0
    #[arg(long, default_value_t = 1.0)]
    pub volume: f32,

    /// Restart from the beginning at end of file instead of exiting
    #[arg(long = "loop")]
    pub looping: bool,

    /// Start position in seconds
    #[arg(long)]
    pub start_secs: Option<f64>,

    /// Fixed device buffer size in frames (device default when omitted)
    #[arg(long)]
    pub buffer_frames: Option<u32>,

    /// End-of-file polling interval in milliseconds
    #[arg(long, default_value_t = 50)]
    pub poll_ms: u64,

    /// Print the final playback status as JSON on exit
    #[arg(long)]
    pub status_json: bool,
}
