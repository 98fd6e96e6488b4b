//! Player binary: parses the command line, installs logging and opens the
//! player window.

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use eframe::egui;
use tracing_subscriber::EnvFilter;

use aotplay::core::config::{PlaybackSettings, DEFAULT_WATERMARK};
use aotplay::ui::{LaunchOptions, PlayerApp};

#[derive(Parser, Debug)]
#[command(name = "aotplay")]
#[command(about = "Play a video with ahead-of-time decoding and wall-clock sync")]
struct Args {
    /// Video file to play
    path: PathBuf,

    /// Volume, 0 to 128
    #[arg(short, long, default_value_t = 12)]
    volume: i32,

    /// Output width in pixels
    #[arg(long, default_value_t = 640)]
    width: u32,

    /// Output height in pixels
    #[arg(long, default_value_t = 480)]
    height: u32,

    /// Minimum number of decoded units kept ahead, per stream
    #[arg(short, long, default_value_t = DEFAULT_WATERMARK)]
    watermark: usize,

    /// Polling interval of the worker waits, in milliseconds
    #[arg(long, default_value_t = 1)]
    poll_ms: u64,

    /// Wait for the Play button instead of starting immediately
    #[arg(long)]
    paused: bool,
}

fn main() -> eframe::Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("aotplay=info")),
        )
        .init();

    let options = LaunchOptions {
        path: args.path,
        volume: args.volume,
        width: args.width.max(1),
        height: args.height.max(1),
        settings: PlaybackSettings::default()
            .with_watermark(args.watermark)
            .with_poll_interval(Duration::from_millis(args.poll_ms.max(1))),
        autoplay: !args.paused,
    };

    let native_options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_title("aotplay")
            .with_inner_size([options.width as f32, options.height as f32 + 80.0]),
        ..Default::default()
    };

    eframe::run_native(
        "aotplay",
        native_options,
        Box::new(move |cc| Box::new(PlayerApp::new(cc, options))),
    )
}
