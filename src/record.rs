//! Sequence recording.
//!
//! A `Recorder` writes the samples it is handed into a sequence folder under
//! its root directory. The folder is named after the timestamp of the first
//! recorded sample and contains:
//!
//! - `imu.txt`: `timestamp ax ay az gx gy gz`, one reading per line
//! - `stereo.txt`: `timestamp left.png right.png [depth.png]`, one pair per line
//! - the PNG images referenced by `stereo.txt` (8-bit, depth as 16-bit gray)
//!
//! Sequences are read back by `ingest::ReplaySource`.
//!
//! PNG encoding is slow next to the sample rate, so the viewer hands samples
//! to a `RecordWorker` thread through a bounded queue and never waits on disk.

use anyhow::{anyhow, Context, Result};
use image::{ImageBuffer, Luma};
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, SyncSender, TrySendError};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

use crate::sample::{DepthImage, Image, InertialSample, Sample, StereoSample};

pub const IMU_FILE: &str = "imu.txt";
pub const STEREO_FILE: &str = "stereo.txt";

/// Where a finished recording went and what it holds.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RecordingSummary {
    pub dir: PathBuf,
    pub num_imu: usize,
    pub num_stereo: usize,
}

/// Recordings closed so far, shared with whoever reports them.
pub type RecordingList = Arc<Mutex<Vec<RecordingSummary>>>;

/// Destination for recorded samples.
pub trait RecordSink: Send {
    fn record(&mut self, sample: &Sample) -> Result<()>;

    /// Close the current sequence. Returns `None` when nothing was recorded.
    fn finish(&mut self) -> Result<Option<RecordingSummary>>;
}

struct Recording {
    dir: PathBuf,
    imu: BufWriter<File>,
    stereo: BufWriter<File>,
    num_imu: usize,
    num_stereo: usize,
}

pub struct Recorder {
    root: PathBuf,
    active: Option<Recording>,
}

impl Recorder {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            active: None,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn is_recording(&self) -> bool {
        self.active.is_some()
    }

    /// Append a sample, opening the sequence folder on the first call.
    pub fn record(&mut self, sample: &Sample) -> Result<()> {
        if self.active.is_none() {
            self.active = Some(Recording::create(&self.root, sample.timestamp())?);
        }
        let recording = self
            .active
            .as_mut()
            .ok_or_else(|| anyhow!("recording not open"))?;
        match sample {
            Sample::Inertial(imu) => recording.write_imu(imu),
            Sample::Stereo(stereo) => recording.write_stereo(stereo),
        }
    }

    /// Close the current sequence. Returns `None` when nothing was recorded.
    pub fn finish(&mut self) -> Result<Option<RecordingSummary>> {
        let Some(mut recording) = self.active.take() else {
            return Ok(None);
        };
        recording.imu.flush()?;
        recording.stereo.flush()?;
        let summary = RecordingSummary {
            dir: recording.dir,
            num_imu: recording.num_imu,
            num_stereo: recording.num_stereo,
        };
        log::info!(
            "recording closed: {} ({} imu, {} stereo)",
            summary.dir.display(),
            summary.num_imu,
            summary.num_stereo
        );
        Ok(Some(summary))
    }
}

impl RecordSink for Recorder {
    fn record(&mut self, sample: &Sample) -> Result<()> {
        Recorder::record(self, sample)
    }

    fn finish(&mut self) -> Result<Option<RecordingSummary>> {
        Recorder::finish(self)
    }
}

enum RecordCommand {
    Sample(Sample),
    Finish,
}

/// Runs a `RecordSink` on its own thread behind a bounded queue.
///
/// `submit` never blocks; a sample that finds the queue full is dropped and
/// counted. After a write error the worker closes the sequence and ignores
/// samples until the next `finish`.
pub struct RecordWorker {
    tx: Option<SyncSender<RecordCommand>>,
    join: Option<JoinHandle<()>>,
    finish_pending: bool,
    queued: u64,
    dropped: u64,
}

impl RecordWorker {
    pub fn spawn(
        mut sink: Box<dyn RecordSink>,
        depth: usize,
        finished: RecordingList,
    ) -> Result<Self> {
        let (tx, rx) = mpsc::sync_channel::<RecordCommand>(depth.max(1));
        let join = std::thread::Builder::new()
            .name("recorder".to_string())
            .spawn(move || {
                let mut failed = false;
                for cmd in rx {
                    match cmd {
                        RecordCommand::Sample(sample) => {
                            if failed {
                                continue;
                            }
                            if let Err(err) = sink.record(&sample) {
                                log::error!("recording failed, disabling: {:#}", err);
                                failed = true;
                                close_sequence(sink.as_mut(), &finished);
                            }
                        }
                        RecordCommand::Finish => {
                            failed = false;
                            close_sequence(sink.as_mut(), &finished);
                        }
                    }
                }
                close_sequence(sink.as_mut(), &finished);
            })
            .map_err(|e| anyhow!("failed to spawn recorder thread: {}", e))?;
        Ok(Self {
            tx: Some(tx),
            join: Some(join),
            finish_pending: false,
            queued: 0,
            dropped: 0,
        })
    }

    /// Queue a sample without waiting. Returns false if it was dropped.
    pub fn submit(&mut self, sample: Sample) -> bool {
        if !self.send_pending_finish() {
            self.dropped += 1;
            return false;
        }
        let Some(tx) = &self.tx else {
            self.dropped += 1;
            return false;
        };
        match tx.try_send(RecordCommand::Sample(sample)) {
            Ok(()) => {
                self.queued += 1;
                true
            }
            Err(TrySendError::Full(_)) => {
                if self.dropped == 0 {
                    log::warn!("recorder busy; dropping samples");
                }
                self.dropped += 1;
                false
            }
            Err(TrySendError::Disconnected(_)) => {
                log::error!("recorder thread exited; recording disabled");
                self.tx = None;
                self.dropped += 1;
                false
            }
        }
    }

    /// Close the current sequence once the samples queued ahead of it are written.
    pub fn finish(&mut self) {
        self.finish_pending = true;
        self.send_pending_finish();
    }

    /// Retry a finish that found the queue full.
    pub fn tick(&mut self) {
        self.send_pending_finish();
    }

    fn send_pending_finish(&mut self) -> bool {
        if !self.finish_pending {
            return true;
        }
        let Some(tx) = &self.tx else {
            self.finish_pending = false;
            return true;
        };
        match tx.try_send(RecordCommand::Finish) {
            Ok(()) => {
                self.finish_pending = false;
                true
            }
            Err(TrySendError::Full(_)) => false,
            Err(TrySendError::Disconnected(_)) => {
                self.tx = None;
                self.finish_pending = false;
                true
            }
        }
    }

    pub fn queued(&self) -> u64 {
        self.queued
    }

    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    /// Drain the queue, close any open sequence, and wait for the thread.
    pub fn shutdown(&mut self) {
        self.tx = None;
        if let Some(join) = self.join.take() {
            if join.join().is_err() {
                log::error!("recorder thread panicked");
            }
            if self.dropped > 0 {
                log::warn!(
                    "recorder dropped {} of {} samples",
                    self.dropped,
                    self.dropped + self.queued
                );
            }
        }
    }
}

impl Drop for RecordWorker {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn close_sequence(sink: &mut dyn RecordSink, finished: &RecordingList) {
    match sink.finish() {
        Ok(Some(summary)) => {
            if let Ok(mut list) = finished.lock() {
                list.push(summary);
            }
        }
        Ok(None) => {}
        Err(err) => log::error!("failed to close recording: {:#}", err),
    }
}

impl Recording {
    fn create(root: &Path, first_timestamp: u64) -> Result<Self> {
        let dir = root.join(first_timestamp.to_string());
        fs::create_dir_all(&dir)
            .with_context(|| format!("failed to create recording folder {}", dir.display()))?;
        let open = |name: &str| -> Result<BufWriter<File>> {
            let path = dir.join(name);
            let file = File::create(&path)
                .with_context(|| format!("failed to create {}", path.display()))?;
            Ok(BufWriter::new(file))
        };
        let imu = open(IMU_FILE)?;
        let stereo = open(STEREO_FILE)?;
        log::info!("recording to {}", dir.display());
        Ok(Self {
            dir,
            imu,
            stereo,
            num_imu: 0,
            num_stereo: 0,
        })
    }

    fn write_imu(&mut self, imu: &InertialSample) -> Result<()> {
        let a = imu.linear_accel;
        let g = imu.angular_velocity;
        writeln!(
            self.imu,
            "{} {} {} {} {} {} {}",
            imu.timestamp, a.x, a.y, a.z, g.x, g.y, g.z
        )?;
        self.num_imu += 1;
        Ok(())
    }

    fn write_stereo(&mut self, stereo: &StereoSample) -> Result<()> {
        let ts = stereo.timestamp;
        let left = format!("left_{ts}.png");
        let right = format!("right_{ts}.png");
        save_image(&self.dir.join(&left), &stereo.left)?;
        save_image(&self.dir.join(&right), &stereo.right)?;
        match &stereo.depth {
            Some(depth) => {
                let name = format!("depth_{ts}.png");
                save_depth(&self.dir.join(&name), depth)?;
                writeln!(self.stereo, "{ts} {left} {right} {name}")?;
            }
            None => writeln!(self.stereo, "{ts} {left} {right}")?,
        }
        self.num_stereo += 1;
        Ok(())
    }
}

fn save_image(path: &Path, img: &Image) -> Result<()> {
    if !img.is_well_formed() {
        return Err(anyhow!("refusing to record malformed image {}", path.display()));
    }
    let color = match img.channels {
        1 => image::ExtendedColorType::L8,
        3 => image::ExtendedColorType::Rgb8,
        n => return Err(anyhow!("unsupported channel count {n}")),
    };
    image::save_buffer(path, img.data(), img.width, img.height, color)
        .with_context(|| format!("failed to write {}", path.display()))
}

fn save_depth(path: &Path, depth: &DepthImage) -> Result<()> {
    let buffer: ImageBuffer<Luma<u16>, Vec<u16>> =
        ImageBuffer::from_raw(depth.width, depth.height, depth.data().to_vec())
            .ok_or_else(|| anyhow!("depth buffer does not match {}x{}", depth.width, depth.height))?;
    buffer
        .save(path)
        .with_context(|| format!("failed to write {}", path.display()))
}
