//! Pass-through pipeline for the device viewer.
//!
//! Consumes both sample kinds without estimating anything. When recording is
//! on, every sample is queued to a `RecordWorker`; the `r` command toggles it.
//! The loop thread never writes to disk. Finished recordings are pushed to a
//! shared list so the caller can report them after the session ends.

use anyhow::Result;
use std::path::PathBuf;
use std::sync::mpsc::{Receiver, TryRecvError};

use super::{FeatureSet, Pipeline, PipelineMode};
use crate::pose::Pose;
pub use crate::record::RecordingList;
use crate::record::{RecordSink, RecordWorker, Recorder};
use crate::sample::{InertialSample, Sample, StereoSample};

pub const TOGGLE_RECORDING: &str = "r";

/// Samples that may wait for the recorder before new ones are dropped.
pub const RECORD_QUEUE_DEPTH: usize = 256;

pub struct ViewerPipeline {
    label: String,
    worker: RecordWorker,
    recording: bool,
    commands: Option<Receiver<String>>,
    finished: RecordingList,
}

impl ViewerPipeline {
    pub fn new(record_root: impl Into<PathBuf>, record_on_start: bool) -> Result<Self> {
        let root = record_root.into();
        let label = root.display().to_string();
        Self::with_sink(
            label,
            Box::new(Recorder::new(root)),
            RECORD_QUEUE_DEPTH,
            record_on_start,
        )
    }

    /// Record into `sink` through a queue of `depth` samples.
    pub fn with_sink(
        label: impl Into<String>,
        sink: Box<dyn RecordSink>,
        depth: usize,
        record_on_start: bool,
    ) -> Result<Self> {
        let finished = RecordingList::default();
        let worker = RecordWorker::spawn(sink, depth, finished.clone())?;
        Ok(Self {
            label: label.into(),
            worker,
            recording: record_on_start,
            commands: None,
            finished,
        })
    }

    /// Read toggle commands from this channel (usually the stdin watcher).
    pub fn with_commands(mut self, commands: Receiver<String>) -> Self {
        self.commands = Some(commands);
        self
    }

    /// Shared list of recordings closed so far.
    pub fn recordings(&self) -> RecordingList {
        self.finished.clone()
    }

    pub fn is_recording(&self) -> bool {
        self.recording
    }

    /// Samples dropped because the recorder was behind.
    pub fn dropped_samples(&self) -> u64 {
        self.worker.dropped()
    }

    pub fn toggle_recording(&mut self) {
        if self.recording {
            self.worker.finish();
            self.recording = false;
        } else {
            log::info!("recording enabled under {}", self.label);
            self.recording = true;
        }
    }

    fn drain_commands(&mut self) {
        self.worker.tick();
        let Some(rx) = &self.commands else { return };
        let mut toggles = 0;
        let mut disconnected = false;
        loop {
            match rx.try_recv() {
                Ok(cmd) if cmd.eq_ignore_ascii_case(TOGGLE_RECORDING) => toggles += 1,
                Ok(cmd) => log::debug!("viewer: ignoring command {:?}", cmd),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    disconnected = true;
                    break;
                }
            }
        }
        if disconnected {
            self.commands = None;
        }
        for _ in 0..toggles {
            self.toggle_recording();
        }
    }

    fn record(&mut self, sample: Sample) {
        if self.recording {
            self.worker.submit(sample);
        }
    }
}

impl Pipeline for ViewerPipeline {
    fn name(&self) -> &'static str {
        "viewer"
    }

    fn mode(&self) -> PipelineMode {
        PipelineMode::Slam
    }

    fn update_stereo(&mut self, stereo: &StereoSample) -> Result<()> {
        self.drain_commands();
        self.record(Sample::Stereo(stereo.clone()));
        Ok(())
    }

    fn update_inertial(&mut self, imu: &InertialSample) -> Result<()> {
        self.drain_commands();
        self.record(Sample::Inertial(imu.clone()));
        Ok(())
    }

    fn pose(&self) -> Option<Pose> {
        None
    }

    fn features(&self) -> Option<&FeatureSet> {
        None
    }
}

impl Drop for ViewerPipeline {
    fn drop(&mut self) {
        self.worker.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::RecordingSummary;
    use crate::sample::{Image, Vec3};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{mpsc, Arc};

    fn imu(ts: u64) -> InertialSample {
        InertialSample {
            timestamp: ts,
            linear_accel: Vec3::new(0.0, 0.0, 9.81),
            angular_velocity: Vec3::zeros(),
        }
    }

    fn stereo(ts: u64) -> StereoSample {
        StereoSample::new(
            ts,
            Image::gray(4, 2, vec![7; 8]),
            Image::gray(4, 2, vec![9; 8]),
        )
    }

    /// Sink that blocks every write until the gate's sender is dropped.
    struct GatedSink {
        gate: mpsc::Receiver<()>,
        written: Arc<AtomicUsize>,
    }

    impl RecordSink for GatedSink {
        fn record(&mut self, _sample: &Sample) -> Result<()> {
            let _ = self.gate.recv();
            self.written.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn finish(&mut self) -> Result<Option<RecordingSummary>> {
            Ok(None)
        }
    }

    #[test]
    fn records_only_while_enabled() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let (tx, rx) = mpsc::channel();
        let mut viewer = ViewerPipeline::new(dir.path(), false)?.with_commands(rx);
        let recordings = viewer.recordings();

        viewer.update_inertial(&imu(1))?;
        tx.send("r".to_string())?;
        viewer.update_inertial(&imu(2))?;
        viewer.update_stereo(&stereo(3))?;
        viewer.update_inertial(&imu(4))?;
        tx.send("R".to_string())?;
        viewer.update_stereo(&stereo(5))?;
        assert!(!viewer.is_recording());
        drop(viewer);

        let list = recordings.lock().unwrap().clone();
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].num_imu, 2);
        assert_eq!(list[0].num_stereo, 1);
        assert_eq!(list[0].dir, dir.path().join("2"));
        Ok(())
    }

    #[test]
    fn drop_closes_active_recording() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let mut viewer = ViewerPipeline::new(dir.path(), true)?;
        let recordings = viewer.recordings();
        viewer.update_stereo(&stereo(10))?;
        drop(viewer);
        let list = recordings.lock().unwrap().clone();
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].num_stereo, 1);
        Ok(())
    }

    #[test]
    fn stalled_recorder_does_not_block_updates() -> Result<()> {
        let (release, gate) = mpsc::channel::<()>();
        let written = Arc::new(AtomicUsize::new(0));
        let sink = GatedSink {
            gate,
            written: written.clone(),
        };
        let mut viewer = ViewerPipeline::with_sink("gated", Box::new(sink), 2, true)?;

        // The sink is stuck on its first sample; every update still returns.
        for ts in 0..20 {
            viewer.update_stereo(&stereo(ts))?;
            viewer.update_inertial(&imu(ts))?;
        }
        let dropped = viewer.dropped_samples();
        // At most one sample in the sink and two queued.
        assert!(dropped >= 37, "dropped={dropped}");

        drop(release);
        drop(viewer);
        assert_eq!(written.load(Ordering::SeqCst) as u64, 40 - dropped);
        Ok(())
    }
}
