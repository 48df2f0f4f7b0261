//! Perception pipeline contract.
//!
//! A `Pipeline` owns the mutable perception state for one device. The session
//! is its only mutator: it feeds accepted samples through `update_stereo` /
//! `update_inertial` and queries results afterwards. An update error means the
//! state can no longer be updated incrementally (e.g. tracking lost); the
//! session stops rather than re-initialising.
//!
//! Two reference pipelines ship with the crate:
//! - `FeaturePipeline`: 2D keypoints on both images + optional stereo 3D points
//! - `InertialOdometry`: visual-inertial pose tracking stand-in
//!
//! `ViewerPipeline` estimates nothing; it records what the device produces.

pub mod calibration;
pub mod features;
pub mod odometry;
pub mod snapshot;
pub mod viewer;

use anyhow::Result;

use crate::pose::Pose;
use crate::sample::{InertialSample, StereoSample, Vec3};

pub use calibration::Calibration;
pub use features::{FeatureOptions, FeaturePipeline};
pub use odometry::{InertialOdometry, OdometryOptions};
pub use snapshot::{SnapshotHandle, StateSnapshot};
pub use viewer::{RecordingList, ViewerPipeline};

/// Which samples a pipeline consumes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PipelineMode {
    /// Stereo samples only; inertial samples are discarded.
    Features,
    /// Stereo and inertial samples; only stereo updates are presented.
    Slam,
}

impl PipelineMode {
    pub fn consumes_inertial(self) -> bool {
        matches!(self, PipelineMode::Slam)
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Point2 {
    pub x: f64,
    pub y: f64,
}

/// A keypoint matched across the stereo pair and triangulated.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct StereoFeature {
    pub left: Point2,
    pub right: Point2,
    /// Point in the left camera frame, metres.
    pub point: Vec3,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct FeatureSet {
    pub left: Vec<Point2>,
    pub right: Vec<Point2>,
    /// `None` when 3D features were not requested.
    pub stereo: Option<Vec<StereoFeature>>,
}

pub trait Pipeline: Send {
    /// Pipeline identifier (used in logs).
    fn name(&self) -> &'static str;

    fn mode(&self) -> PipelineMode;

    fn update_stereo(&mut self, stereo: &StereoSample) -> Result<()>;

    /// Only called in `PipelineMode::Slam`.
    fn update_inertial(&mut self, _imu: &InertialSample) -> Result<()> {
        Ok(())
    }

    fn pose(&self) -> Option<Pose>;

    fn features(&self) -> Option<&FeatureSet>;
}
