//! viewer - stream a stereo + IMU device and optionally record it
//!
//! Type `r` then Enter to start or stop recording; each recording lands in
//! its own folder under the record directory and can be streamed back with
//! `--device replay://<folder>`.

use clap::Parser;
use std::path::PathBuf;

use vio_stream::app::{self, LaunchOptions};
use vio_stream::{DeviceMode, StartupError, StopToken, StreamConfig, ViewerPipeline};

const DEFAULT_RECORD_DIR: &str = "/tmp/vio_device_recordings/";

#[derive(Parser, Debug)]
#[command(author, version, about = "Stream and record a stereo + IMU device")]
struct Args {
    /// raw_mode or depth_mode.
    mode: DeviceMode,

    /// Device URI (stub://<name> or replay://<sequence dir>).
    #[arg(long)]
    device: Option<String>,

    /// Directory that recordings are written under.
    #[arg(long, env = "VIO_RECORD_DIR", default_value = DEFAULT_RECORD_DIR)]
    record_dir: PathBuf,

    /// Start recording immediately.
    #[arg(long)]
    record: bool,

    /// Stop after this many stereo frames.
    #[arg(long)]
    frames: Option<u64>,
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args: Args = app::parse_args();

    match run(args) {
        Ok(code) => std::process::exit(code),
        Err(err) => app::exit_startup(&err),
    }
}

fn run(args: Args) -> Result<i32, StartupError> {
    let mut config = StreamConfig::load().map_err(StartupError::configuration)?;
    config.device.mode = args.mode;
    if let Some(uri) = args.device {
        config.device.uri = uri;
    }

    let token = StopToken::new();
    let commands = app::install_stop_sources(&token)?;
    println!("Type r then Enter to start/stop recording.");
    let viewer = ViewerPipeline::new(&args.record_dir, args.record)
        .map_err(StartupError::configuration)?
        .with_commands(commands);
    let recordings = viewer.recordings();

    let launch = LaunchOptions {
        log_poses: false,
        stop_after_updates: args.frames,
    };
    let report = app::run_session(&config, &launch, token, Box::new(viewer))?;
    app::print_report(&report);

    let recordings = recordings.lock().map(|list| list.clone()).unwrap_or_default();
    for summary in &recordings {
        println!("Recorded sequence: {}", summary.dir.display());
        println!("  IMU samples: {}", summary.num_imu);
        println!("  stereo samples: {}", summary.num_stereo);
    }
    Ok(report.exit.exit_code())
}
