use std::path::PathBuf;

use clap::{Args as ClapArgs, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "pacer", version = env!("CARGO_PKG_VERSION"))]
pub struct Args {
    #[command(subcommand)]
    pub cmd: Command,

    /// Optional TOML config; explicit flags take precedence
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// List output devices and exit
    ListDevices,

    /// Render a synthetic tone and test pattern through the renderer
    Play(PlayArgs),
}

#[derive(ClapArgs, Debug, Default)]
pub struct PlayArgs {
    /// Use a specific output device by substring match
    #[arg(long)]
    pub device: Option<String>,

    /// Discard audio into a wall-clock paced sink instead of a device
    #[arg(long)]
    pub null_sink: bool,

    /// Render video only (wall-clock pacing)
    #[arg(long)]
    pub no_audio: bool,

    /// Stream length in milliseconds
    #[arg(long)]
    pub duration_ms: Option<u64>,

    /// Tone frequency in Hz
    #[arg(long)]
    pub tone_hz: Option<f32>,

    /// Test-pattern frame rate
    #[arg(long)]
    pub fps: Option<u32>,

    /// Audio buffer length in milliseconds
    #[arg(long)]
    pub chunk_ms: Option<u64>,

    /// Device-side buffer target in milliseconds
    #[arg(long)]
    pub buffer_ms: Option<u64>,

    /// Pause after this many milliseconds of wall time
    #[arg(long)]
    pub pause_at_ms: Option<u64>,

    /// How long a scripted pause lasts
    #[arg(long, default_value_t = 500)]
    pub pause_for_ms: u64,

    /// Seek after this many milliseconds of wall time
    #[arg(long, requires = "seek_to_ms")]
    pub seek_at_ms: Option<u64>,

    /// Media time to seek to
    #[arg(long)]
    pub seek_to_ms: Option<u64>,

    /// Delay the first queued buffer by this many milliseconds
    #[arg(long)]
    pub inject_delay_ms: Option<u64>,

    /// Drop video frames later than this
    #[arg(long)]
    pub late_tolerance_ms: Option<u64>,

    /// Minimum spacing of position reports
    #[arg(long)]
    pub position_interval_ms: Option<u64>,
}
