//! slam - visual-inertial tracking on a stereo + IMU device
//!
//! Streams stereo and inertial samples into the odometry pipeline, appends
//! every tracked pose to the pose log, and summarises the trajectory on the
//! console. Stops on `q`, Ctrl-C, or when tracking is lost.

use clap::Parser;
use std::path::PathBuf;

use vio_stream::app::{self, LaunchOptions};
use vio_stream::{InertialOdometry, OdometryOptions, StartupError, StopToken, StreamConfig};

#[derive(Parser, Debug)]
#[command(author, version, about = "Stereo-inertial tracking on a live device")]
struct Args {
    /// Camera calibration (JSON).
    calibration: PathBuf,

    /// Place-recognition vocabulary file.
    vocabulary: PathBuf,

    /// Device URI (stub://<name> or replay://<sequence dir>).
    #[arg(long)]
    device: Option<String>,

    /// Pose log path; records are appended.
    #[arg(long)]
    pose_log: Option<PathBuf>,

    /// Minimum keypoints per frame before tracking counts as lost.
    #[arg(long, default_value_t = 20)]
    min_features: usize,

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

fn run(args: Args) -> Result<vio_stream::SessionReport, StartupError> {
    let mut config = StreamConfig::load().map_err(StartupError::configuration)?;
    if let Some(uri) = args.device {
        config.device.uri = uri;
    }
    if let Some(path) = args.pose_log {
        config.pose_log = path;
    }
    if args.no_display {
        config.present.enabled = false;
    }

    let options = OdometryOptions {
        min_features: args.min_features,
        ..OdometryOptions::default()
    };
    let pipeline = InertialOdometry::init(&args.calibration, &args.vocabulary, options)
        .map_err(StartupError::configuration)?;

    let token = StopToken::new();
    let _commands = app::install_stop_sources(&token)?;
    let launch = LaunchOptions {
        log_poses: true,
        stop_after_updates: args.frames,
    };
    app::run_session(&config, &launch, token, Box::new(pipeline))
}
