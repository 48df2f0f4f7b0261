//! features - keypoint detection on a live stereo device
//!
//! Detects keypoints on both images of every stereo pair and, unless
//! `--no-3d` is given, matches them along rows and triangulates 3D points.
//! Inertial samples are not consumed.

use clap::Parser;
use std::path::PathBuf;

use vio_stream::app::{self, LaunchOptions};
use vio_stream::{
    FeatureOptions, FeaturePipeline, SessionReport, StartupError, StopToken, StreamConfig,
};

#[derive(Parser, Debug)]
#[command(author, version, about = "Stereo keypoint detection on a live device")]
struct Args {
    /// Camera calibration (JSON).
    calibration: PathBuf,

    /// Device URI (stub://<name> or replay://<sequence dir>).
    #[arg(long)]
    device: Option<String>,

    /// Skip stereo matching and triangulation.
    #[arg(long)]
    no_3d: bool,

    /// Grid cell size in pixels (one keypoint per cell at most).
    #[arg(long, default_value_t = 16)]
    cell_size: u32,

    /// Stop after this many stereo updates.
    #[arg(long)]
    frames: Option<u64>,

    /// Disable the console presenter.
    #[arg(long)]
    no_display: bool,
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args: Args = app::parse_args();

    match run(args) {
        Ok(report) => {
            app::print_report(&report);
            std::process::exit(report.exit.exit_code());
        }
        Err(err) => app::exit_startup(&err),
    }
}

fn run(args: Args) -> Result<SessionReport, StartupError> {
    let mut config = StreamConfig::load().map_err(StartupError::configuration)?;
    if let Some(uri) = args.device {
        config.device.uri = uri;
    }
    if args.no_display {
        config.present.enabled = false;
    }

    let options = FeatureOptions {
        get_3d: !args.no_3d,
        cell_size: args.cell_size,
        ..FeatureOptions::default()
    };
    let pipeline = FeaturePipeline::init(&args.calibration, options)
        .map_err(StartupError::configuration)?;

    let token = StopToken::new();
    let _commands = app::install_stop_sources(&token)?;
    let launch = LaunchOptions {
        log_poses: false,
        stop_after_updates: args.frames,
    };
    app::run_session(&config, &launch, token, Box::new(pipeline))
}
