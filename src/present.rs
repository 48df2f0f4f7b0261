//! Presentation sink.
//!
//! Rendering runs on its own thread behind a one-slot channel. The session
//! hands frames over with `RenderWorker::submit`, which never blocks: if the
//! presenter is still busy with an earlier frame the new one is dropped.
//! A failed render is reported once and not retried.

use anyhow::{anyhow, Result};
use std::sync::mpsc::{self, SyncSender, TrySendError};
use std::thread::JoinHandle;

use crate::pipeline::StateSnapshot;
use crate::sample::StereoSample;

/// What a presenter receives after a stereo-triggered update.
#[derive(Clone, Debug)]
pub struct PresentFrame {
    pub stereo: StereoSample,
    pub snapshot: StateSnapshot,
}

pub trait Presenter: Send {
    fn name(&self) -> &'static str;

    fn present(&mut self, frame: &PresentFrame) -> Result<()>;

    /// Release presentation resources. Called once when the worker exits.
    fn close(&mut self) {}
}

pub struct RenderWorker {
    name: &'static str,
    tx: Option<SyncSender<PresentFrame>>,
    join: Option<JoinHandle<()>>,
    submitted: u64,
    dropped: u64,
}

impl RenderWorker {
    pub fn spawn(mut presenter: Box<dyn Presenter>) -> Result<Self> {
        let name = presenter.name();
        let (tx, rx) = mpsc::sync_channel::<PresentFrame>(1);
        let join = std::thread::Builder::new()
            .name(format!("render-{name}"))
            .spawn(move || {
                let mut failures = 0u64;
                for frame in rx {
                    if let Err(err) = presenter.present(&frame) {
                        failures += 1;
                        if failures == 1 {
                            log::warn!("presenter {} failed: {:#}", presenter.name(), err);
                        }
                    }
                }
                if failures > 1 {
                    log::warn!("presenter {} failed {} times", presenter.name(), failures);
                }
                presenter.close();
            })
            .map_err(|e| anyhow!("failed to spawn render thread: {}", e))?;
        Ok(Self {
            name,
            tx: Some(tx),
            join: Some(join),
            submitted: 0,
            dropped: 0,
        })
    }

    /// Hand a frame to the presenter without waiting. Returns false if dropped.
    pub fn submit(&mut self, frame: PresentFrame) -> bool {
        let Some(tx) = &self.tx else {
            self.dropped += 1;
            return false;
        };
        match tx.try_send(frame) {
            Ok(()) => {
                self.submitted += 1;
                true
            }
            Err(TrySendError::Full(_)) => {
                self.dropped += 1;
                false
            }
            Err(TrySendError::Disconnected(_)) => {
                log::warn!("presenter {} exited; presentation disabled", self.name);
                self.tx = None;
                self.dropped += 1;
                false
            }
        }
    }

    pub fn submitted(&self) -> u64 {
        self.submitted
    }

    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    /// Close the channel and wait for the presenter to release its resources.
    pub fn shutdown(&mut self) {
        self.tx = None;
        if let Some(join) = self.join.take() {
            if join.join().is_err() {
                log::error!("presenter {} panicked", self.name);
            }
        }
    }
}

impl Drop for RenderWorker {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Headless presenter: summarises features and trajectory in the log.
pub struct ConsolePresenter {
    every: u64,
    frames: u64,
    path_length: f64,
    last_position: Option<crate::sample::Vec3>,
}

impl ConsolePresenter {
    /// Log one summary line every `every` frames.
    pub fn new(every: u64) -> Self {
        Self {
            every: every.max(1),
            frames: 0,
            path_length: 0.0,
            last_position: None,
        }
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }

    pub fn path_length(&self) -> f64 {
        self.path_length
    }
}

impl Presenter for ConsolePresenter {
    fn name(&self) -> &'static str {
        "console"
    }

    fn present(&mut self, frame: &PresentFrame) -> Result<()> {
        self.frames += 1;
        if let Some(pose) = frame.snapshot.pose {
            if let Some(last) = self.last_position {
                self.path_length += (pose.translation - last).norm();
            }
            self.last_position = Some(pose.translation);
        }
        if self.frames % self.every != 0 {
            return Ok(());
        }

        let features = frame.snapshot.features.as_deref();
        let left = features.map_or(0, |f| f.left.len());
        let right = features.map_or(0, |f| f.right.len());
        match features.and_then(|f| f.stereo.as_ref()) {
            Some(stereo) => log::info!(
                "frame {} ts={} {}x{}: features l={} r={} 3d={}",
                self.frames,
                frame.stereo.timestamp,
                frame.stereo.left.width,
                frame.stereo.left.height,
                left,
                right,
                stereo.len()
            ),
            None => log::info!(
                "frame {} ts={} {}x{}: features l={} r={}",
                self.frames,
                frame.stereo.timestamp,
                frame.stereo.left.width,
                frame.stereo.left.height,
                left,
                right
            ),
        }
        if let Some(pose) = frame.snapshot.pose {
            let t = pose.translation;
            log::info!(
                "pose t=({:.3}, {:.3}, {:.3}) path={:.3}m",
                t.x,
                t.y,
                t.z,
                self.path_length
            );
        }
        Ok(())
    }

    fn close(&mut self) {
        log::info!(
            "console presenter closed after {} frames (path {:.3}m)",
            self.frames,
            self.path_length
        );
    }
}
