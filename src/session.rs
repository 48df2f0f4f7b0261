//! Consumption loop.
//!
//! A `Session` owns the device and the pipeline for one streaming run and
//! drives `Initializing -> Streaming -> Stopping -> Stopped`:
//!
//! 1. Poll the device (a `NotReady` read spins briefly and retries)
//! 2. Dispatch the sample by variant
//! 3. Feed consumed samples to the pipeline; an update error ends the session
//! 4. After a stereo update, publish the snapshot, log the pose and hand the
//!    frame to the render worker without blocking
//! 5. Check the stop token
//!
//! Stopping stops the device once, flushes the pose log and releases the
//! presenter. A stopped session cannot be restarted.

use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::dispatch::{Discard, Dispatcher, Route};
use crate::error::StartupError;
use crate::ingest::{DeviceHandle, Polled};
use crate::pipeline::{Pipeline, SnapshotHandle, StateSnapshot};
use crate::pose_log::PoseLog;
use crate::present::{PresentFrame, RenderWorker};
use crate::sample::{SampleKind, StereoSample};
use crate::shutdown::{StopReason, StopToken, EXIT_INTERRUPTED};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    Initializing,
    Streaming,
    Stopping,
    Stopped,
}

/// Result of one loop iteration.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StepOutcome {
    Continue,
    StopRequested(StopReason),
    PipelineFailed(String),
}

/// Why the session ended.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ExitReason {
    UserStop,
    Interrupted,
    PipelineFailed(String),
}

impl ExitReason {
    pub fn exit_code(&self) -> i32 {
        match self {
            ExitReason::UserStop => 0,
            ExitReason::Interrupted => EXIT_INTERRUPTED,
            ExitReason::PipelineFailed(_) => 1,
        }
    }
}

impl From<StopReason> for ExitReason {
    fn from(reason: StopReason) -> Self {
        match reason {
            StopReason::User => ExitReason::UserStop,
            StopReason::Interrupt => ExitReason::Interrupted,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SessionStats {
    pub polls: u64,
    pub not_ready: u64,
    pub inertial_samples: u64,
    pub stereo_samples: u64,
    /// Valid samples the pipeline does not consume.
    pub discarded: u64,
    pub corrupt: u64,
    pub stereo_updates: u64,
    pub inertial_updates: u64,
    pub poses_logged: u64,
    pub pose_log_failures: u64,
    pub frames_presented: u64,
    pub frames_dropped: u64,
    /// Periodic health lines emitted.
    pub health_reports: u64,
}

#[derive(Clone, Debug)]
pub struct SessionReport {
    pub exit: ExitReason,
    pub stats: SessionStats,
    /// True when this session performed the device stop.
    pub device_stopped: bool,
}

#[derive(Clone, Debug)]
pub struct SessionOptions {
    /// Consecutive empty polls spun before yielding the thread.
    pub idle_spins: u32,
    pub health_interval: Duration,
    /// Request a user stop after this many stereo updates (headless runs).
    pub stop_after_updates: Option<u64>,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            idle_spins: 64,
            health_interval: Duration::from_secs(5),
            stop_after_updates: None,
        }
    }
}

pub struct SessionBuilder {
    device: DeviceHandle,
    pipeline: Box<dyn Pipeline>,
    token: StopToken,
    pose_log: Option<PoseLog>,
    presenter: Option<RenderWorker>,
    snapshot: SnapshotHandle,
    options: SessionOptions,
}

impl SessionBuilder {
    pub fn new(device: DeviceHandle, pipeline: Box<dyn Pipeline>) -> Self {
        Self {
            device,
            pipeline,
            token: StopToken::new(),
            pose_log: None,
            presenter: None,
            snapshot: SnapshotHandle::new(),
            options: SessionOptions::default(),
        }
    }

    pub fn stop_token(mut self, token: StopToken) -> Self {
        self.token = token;
        self
    }

    pub fn pose_log(mut self, log: PoseLog) -> Self {
        self.pose_log = Some(log);
        self
    }

    pub fn presenter(mut self, worker: RenderWorker) -> Self {
        self.presenter = Some(worker);
        self
    }

    pub fn snapshot(mut self, handle: SnapshotHandle) -> Self {
        self.snapshot = handle;
        self
    }

    pub fn options(mut self, options: SessionOptions) -> Self {
        self.options = options;
        self
    }

    /// Start the device and enter `Streaming`.
    pub fn start(self) -> Result<Session, StartupError> {
        let mut session = Session {
            state: SessionState::Initializing,
            dispatcher: Dispatcher::new(self.pipeline.mode()),
            device: self.device,
            pipeline: self.pipeline,
            token: self.token,
            pose_log: self.pose_log,
            presenter: self.presenter,
            snapshot: self.snapshot,
            options: self.options,
            stats: SessionStats::default(),
            miss_streak: 0,
            last_health: Instant::now(),
        };
        session.device.start().map_err(StartupError::device)?;
        log::info!(
            "session streaming: device={} pipeline={} mode={:?}",
            session.device.name(),
            session.pipeline.name(),
            session.dispatcher.mode()
        );
        session.state = SessionState::Streaming;
        Ok(session)
    }
}

pub struct Session {
    state: SessionState,
    device: DeviceHandle,
    pipeline: Box<dyn Pipeline>,
    dispatcher: Dispatcher,
    token: StopToken,
    pose_log: Option<PoseLog>,
    presenter: Option<RenderWorker>,
    snapshot: SnapshotHandle,
    options: SessionOptions,
    stats: SessionStats,
    miss_streak: u32,
    last_health: Instant,
}

impl Session {
    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn stats(&self) -> &SessionStats {
        &self.stats
    }

    /// Handle for reading results from other threads.
    pub fn snapshot(&self) -> SnapshotHandle {
        self.snapshot.clone()
    }

    pub fn stop_token(&self) -> StopToken {
        self.token.clone()
    }

    /// Stream until a stop request or a pipeline failure, then stop.
    pub fn run(mut self) -> SessionReport {
        let exit = loop {
            match self.step() {
                StepOutcome::Continue => continue,
                StepOutcome::StopRequested(reason) => break ExitReason::from(reason),
                StepOutcome::PipelineFailed(err) => break ExitReason::PipelineFailed(err),
            }
        };
        match &exit {
            ExitReason::UserStop => log::info!("stopped."),
            ExitReason::Interrupted => log::warn!("interrupted."),
            ExitReason::PipelineFailed(err) => log::error!("pipeline failed: {}", err),
        }
        let device_stopped = self.stop();
        SessionReport {
            exit,
            stats: self.stats.clone(),
            device_stopped,
        }
    }

    /// One pass of the loop body.
    pub fn step(&mut self) -> StepOutcome {
        if self.state != SessionState::Streaming {
            return StepOutcome::StopRequested(self.token.reason().unwrap_or(StopReason::User));
        }
        if let Some(reason) = self.token.reason() {
            return StepOutcome::StopRequested(reason);
        }

        self.stats.polls += 1;
        let sample = match self.device.poll() {
            Polled::Ready(sample) => {
                self.miss_streak = 0;
                sample
            }
            Polled::NotReady => {
                self.stats.not_ready += 1;
                self.idle();
                self.log_health();
                return StepOutcome::Continue;
            }
        };

        match sample.kind() {
            SampleKind::Inertial => self.stats.inertial_samples += 1,
            SampleKind::Stereo => self.stats.stereo_samples += 1,
        }

        match self.dispatcher.dispatch(sample) {
            Route::Stereo(stereo) => {
                if let Err(err) = self.pipeline.update_stereo(&stereo) {
                    return StepOutcome::PipelineFailed(format!("{err:#}"));
                }
                self.after_stereo_update(stereo);
            }
            Route::Inertial(imu) => {
                if let Err(err) = self.pipeline.update_inertial(&imu) {
                    return StepOutcome::PipelineFailed(format!("{err:#}"));
                }
                self.stats.inertial_updates += 1;
            }
            Route::Discard(Discard::NotConsumed(_)) => self.stats.discarded += 1,
            Route::Discard(Discard::Corrupt(reason)) => {
                self.stats.corrupt += 1;
                log::debug!("skipping corrupt sample: {}", reason);
            }
        }

        self.log_health();

        if let Some(limit) = self.options.stop_after_updates {
            if self.stats.stereo_updates >= limit && self.token.request(StopReason::User) {
                log::info!("reached {} updates, stopping", limit);
            }
        }
        match self.token.reason() {
            Some(reason) => StepOutcome::StopRequested(reason),
            None => StepOutcome::Continue,
        }
    }

    fn after_stereo_update(&mut self, stereo: StereoSample) {
        self.stats.stereo_updates += 1;
        let pose = self.pipeline.pose();
        let snapshot = StateSnapshot {
            update_count: self.stats.stereo_updates,
            timestamp: Some(stereo.timestamp),
            pose,
            features: self.pipeline.features().cloned().map(Arc::new),
        };
        self.snapshot.publish(snapshot.clone());

        // Logged at update time so render latency never delays or skips a record.
        if let (Some(log), Some(pose)) = (self.pose_log.as_mut(), pose) {
            if log.append(&pose) {
                self.stats.poses_logged += 1;
            } else {
                self.stats.pose_log_failures += 1;
            }
        }

        if let Some(worker) = self.presenter.as_mut() {
            if worker.submit(PresentFrame { stereo, snapshot }) {
                self.stats.frames_presented += 1;
            } else {
                self.stats.frames_dropped += 1;
            }
        }
    }

    fn idle(&mut self) {
        self.miss_streak = self.miss_streak.wrapping_add(1);
        if self.options.idle_spins == 0 || self.miss_streak % self.options.idle_spins == 0 {
            std::thread::yield_now();
        } else {
            std::hint::spin_loop();
        }
    }

    fn log_health(&mut self) {
        if self.last_health.elapsed() < self.options.health_interval {
            return;
        }
        let s = &self.stats;
        log::info!(
            "stream health={} polls={} imu={} stereo={} updates={} discarded={} corrupt={} frames_dropped={}",
            self.device.is_healthy(),
            s.polls,
            s.inertial_samples,
            s.stereo_samples,
            s.stereo_updates,
            s.discarded,
            s.corrupt,
            s.frames_dropped
        );
        self.stats.health_reports += 1;
        self.last_health = Instant::now();
    }

    /// Stopping: device stop, pose log flush, presenter release. Idempotent.
    fn stop(&mut self) -> bool {
        if self.state == SessionState::Stopped {
            return false;
        }
        self.state = SessionState::Stopping;
        let stopped = self.device.stop();
        if let Some(log) = self.pose_log.as_mut() {
            log.flush();
            log::info!(
                "pose log {}: {} records written",
                log.label(),
                log.records_written()
            );
        }
        if let Some(mut worker) = self.presenter.take() {
            worker.shutdown();
        }
        self.state = SessionState::Stopped;
        stopped
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.stop();
    }
}
