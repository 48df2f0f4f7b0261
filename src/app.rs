//! Shared launch path for the binaries.
//!
//! Each binary parses its own arguments and builds its pipeline; everything
//! from opening the device to printing the session report goes through here.

use clap::error::ErrorKind;
use clap::Parser;
use std::ffi::OsString;
use std::sync::mpsc::Receiver;

use crate::config::StreamConfig;
use crate::error::{StartupError, EXIT_STARTUP_FAILURE};
use crate::ingest::open_device;
use crate::pipeline::Pipeline;
use crate::pose_log::PoseLog;
use crate::present::{ConsolePresenter, RenderWorker};
use crate::session::{SessionBuilder, SessionReport};
use crate::shutdown::{install_interrupt_handler, spawn_key_watcher, StopToken};

/// Parse arguments; a usage error prints usage on stdout and exits with the startup status.
pub fn parse_args<T: Parser>() -> T {
    match parse_args_from(std::env::args_os()) {
        Ok(args) => args,
        Err(usage) => {
            println!("{}", usage);
            std::process::exit(EXIT_STARTUP_FAILURE);
        }
    }
}

/// Help and version requests exit as usual. Any other error returns the usage text.
pub fn parse_args_from<T, I, A>(args: I) -> Result<T, String>
where
    T: Parser,
    I: IntoIterator<Item = A>,
    A: Into<OsString> + Clone,
{
    match T::try_parse_from(args) {
        Ok(args) => Ok(args),
        Err(err) if matches!(err.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) => {
            err.exit()
        }
        Err(err) => Err(err.render().to_string()),
    }
}

#[derive(Clone, Debug, Default)]
pub struct LaunchOptions {
    /// Append each stereo-triggered pose to the configured pose log.
    pub log_poses: bool,
    /// Stop after this many stereo updates.
    pub stop_after_updates: Option<u64>,
}

/// Wire Ctrl-C and the stdin stop key into `token`.
///
/// Returns the non-stop lines typed on stdin.
pub fn install_stop_sources(token: &StopToken) -> Result<Receiver<String>, StartupError> {
    install_interrupt_handler(token.clone()).map_err(StartupError::configuration)?;
    let commands = spawn_key_watcher(token.clone()).map_err(StartupError::configuration)?;
    println!("Press q then Enter to stop (Ctrl-C interrupts).");
    Ok(commands)
}

/// Open the device, attach the sinks, and stream until stopped.
pub fn run_session(
    config: &StreamConfig,
    launch: &LaunchOptions,
    token: StopToken,
    pipeline: Box<dyn Pipeline>,
) -> Result<SessionReport, StartupError> {
    let device = open_device(&config.device).map_err(StartupError::device)?;
    log::info!(
        "device {} opened in {} ({} Hz stereo, {} Hz imu)",
        config.device.uri,
        device.mode(),
        config.device.stereo_hz,
        config.device.imu_hz
    );

    let mut builder = SessionBuilder::new(device, pipeline)
        .stop_token(token)
        .options(crate::session::SessionOptions {
            stop_after_updates: launch.stop_after_updates,
            ..config.session_options()
        });
    if launch.log_poses {
        match PoseLog::open(&config.pose_log) {
            Ok(log) => {
                log::info!("logging poses to {}", config.pose_log.display());
                builder = builder.pose_log(log);
            }
            // Streaming goes on without the log.
            Err(err) => log::error!("{:#}; poses will not be logged", err),
        }
    }
    if config.present.enabled {
        let worker = RenderWorker::spawn(Box::new(ConsolePresenter::new(config.present.every)))
            .map_err(StartupError::configuration)?;
        builder = builder.presenter(worker);
    }

    let session = builder.start()?;
    Ok(session.run())
}

pub fn print_report(report: &SessionReport) {
    let s = &report.stats;
    println!("session summary:");
    println!("  exit: {:?}", report.exit);
    println!("  polls: {} (not ready: {})", s.polls, s.not_ready);
    println!(
        "  samples: {} inertial, {} stereo",
        s.inertial_samples, s.stereo_samples
    );
    println!("  skipped: {} unused, {} corrupt", s.discarded, s.corrupt);
    println!(
        "  updates: {} stereo, {} inertial",
        s.stereo_updates, s.inertial_updates
    );
    println!(
        "  poses logged: {} ({} failed)",
        s.poses_logged, s.pose_log_failures
    );
    println!(
        "  frames presented: {} (dropped {})",
        s.frames_presented, s.frames_dropped
    );
}

/// Print a startup diagnostic and exit with the startup failure status.
pub fn exit_startup(err: &StartupError) -> ! {
    println!("{}", err);
    std::process::exit(EXIT_STARTUP_FAILURE);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PresentSettings;
    use crate::ingest::DeviceConfig;
    use crate::pipeline::{FeatureSet, PipelineMode};
    use crate::pose::Pose;
    use crate::sample::StereoSample;
    use crate::session::ExitReason;
    use anyhow::Result;
    use std::path::PathBuf;
    use std::time::Duration;

    #[derive(Parser, Debug)]
    struct Args {
        #[arg(long)]
        frames: Option<u64>,
    }

    struct PosePipeline {
        pose: Option<Pose>,
    }

    impl Pipeline for PosePipeline {
        fn name(&self) -> &'static str {
            "pose"
        }

        fn mode(&self) -> PipelineMode {
            PipelineMode::Features
        }

        fn update_stereo(&mut self, stereo: &StereoSample) -> Result<()> {
            self.pose = Some(Pose::identity(stereo.timestamp));
            Ok(())
        }

        fn pose(&self) -> Option<Pose> {
            self.pose
        }

        fn features(&self) -> Option<&FeatureSet> {
            None
        }
    }

    fn headless_config(pose_log: &str) -> StreamConfig {
        StreamConfig {
            device: DeviceConfig {
                uri: "stub://app".to_string(),
                imu_hz: 200,
                stereo_hz: 20,
                width: 64,
                height: 48,
                realtime: false,
                ..DeviceConfig::default()
            },
            pose_log: PathBuf::from(pose_log),
            present: PresentSettings {
                enabled: false,
                every: 1,
            },
            idle_spins: 4,
            health_interval: Duration::from_secs(5),
        }
    }

    #[test]
    fn usage_error_returns_usage_text() {
        let usage = parse_args_from::<Args, _, _>(["viewer", "--frames", "many"])
            .err()
            .expect("invalid value");
        assert!(usage.contains("--frames"));
        assert!(usage.contains("Usage:"));

        let args = parse_args_from::<Args, _, _>(["viewer", "--frames", "3"]).expect("parses");
        assert_eq!(args.frames, Some(3));
    }

    #[test]
    fn unwritable_pose_log_does_not_stop_the_session() -> Result<()> {
        let config = headless_config("/nonexistent_dir/poses.txt");
        let launch = LaunchOptions {
            log_poses: true,
            stop_after_updates: Some(3),
        };
        let report = run_session(
            &config,
            &launch,
            StopToken::new(),
            Box::new(PosePipeline { pose: None }),
        )?;
        assert_eq!(report.exit, ExitReason::UserStop);
        assert_eq!(report.stats.stereo_updates, 3);
        assert_eq!(report.stats.poses_logged, 0);
        Ok(())
    }

    #[test]
    fn writable_pose_log_records_every_update() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("poses.txt");
        let config = headless_config(&path.display().to_string());
        let launch = LaunchOptions {
            log_poses: true,
            stop_after_updates: Some(2),
        };
        let report = run_session(
            &config,
            &launch,
            StopToken::new(),
            Box::new(PosePipeline { pose: None }),
        )?;
        assert_eq!(report.stats.poses_logged, 2);
        assert_eq!(std::fs::read_to_string(&path)?.lines().count(), 2);
        Ok(())
    }
}
