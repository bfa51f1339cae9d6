//! Pacer: drives the media renderer with a synthetic tone and test pattern.
//!
//! ## Pipeline
//! 1. **Produce**: one thread per stream queues decoded-looking buffers, bounded by their acks.
//! 2. **Pace**: the renderer worker writes audio to the sink and releases video frames on time.
//! 3. **Play**: the CPAL callback pulls queued samples without blocking and writes to the device.
//!
//! ## Modes
//! - `list-devices`: print output devices.
//! - `play`: render the synthetic streams, optionally pausing, seeking or delaying on a script.

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use pacer::{cli, config, runtime};

fn main() -> Result<()> {
    let args = cli::Args::parse();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new("info,pacer=info,media_renderer=info")
        }))
        .init();

    let file = match &args.config {
        Some(path) => config::FileConfig::load(path)?,
        None => config::FileConfig::default(),
    };

    match &args.cmd {
        cli::Command::ListDevices => runtime::list_devices(),
        cli::Command::Play(play) => {
            let play = config::resolve_play(&file, play);
            let summary = runtime::run_play(play)?;
            summary.log();
            Ok(())
        }
    }
}
