//! Visual-inertial pose tracking stand-in.
//!
//! Orientation and position are propagated from IMU readings (gyro
//! integration, gravity-compensated double integration of acceleration).
//! Stereo frames anchor the pose timestamp and act as the tracking check: a
//! frame with too few keypoints means tracking is lost, which fails the
//! update. Inertial readings that arrive before the first stereo frame are
//! ignored, since there is no visual anchor to integrate from.

use anyhow::{anyhow, Context, Result};
use std::path::Path;

use super::features::{check_geometry, detect_keypoints};
use super::{Calibration, FeatureOptions, FeatureSet, Pipeline, PipelineMode};
use nalgebra::UnitQuaternion;

use crate::pose::Pose;
use crate::sample::{InertialSample, StereoSample, Timestamp, Vec3};

const GRAVITY_MPS2: f64 = 9.81;

fn gravity() -> Vec3 {
    Vec3::new(0.0, 0.0, GRAVITY_MPS2)
}

#[derive(Clone, Debug)]
pub struct OdometryOptions {
    /// Fewer keypoints than this on the left image means tracking is lost.
    pub min_features: usize,
    pub detection: FeatureOptions,
}

impl Default for OdometryOptions {
    fn default() -> Self {
        Self {
            min_features: 20,
            detection: FeatureOptions {
                get_3d: false,
                ..FeatureOptions::default()
            },
        }
    }
}

pub struct InertialOdometry {
    calibration: Calibration,
    options: OdometryOptions,
    anchored: bool,
    last_imu: Option<Timestamp>,
    orientation: UnitQuaternion<f64>,
    velocity: Vec3,
    position: Vec3,
    pose: Option<Pose>,
    features: Option<FeatureSet>,
    frames_tracked: u64,
}

impl InertialOdometry {
    /// Build the initial state and (empty) map from calibration + vocabulary.
    pub fn init(
        calibration_path: &Path,
        vocabulary_path: &Path,
        options: OdometryOptions,
    ) -> Result<Self> {
        let calibration = Calibration::load(calibration_path)?;
        let meta = std::fs::metadata(vocabulary_path)
            .with_context(|| format!("failed to read vocabulary {}", vocabulary_path.display()))?;
        if !meta.is_file() || meta.len() == 0 {
            return Err(anyhow!(
                "vocabulary {} is empty or not a file",
                vocabulary_path.display()
            ));
        }
        log::info!("odometry map initialised (vocabulary {} bytes)", meta.len());
        Ok(Self::with_calibration(calibration, options))
    }

    pub fn with_calibration(calibration: Calibration, options: OdometryOptions) -> Self {
        Self {
            calibration,
            options,
            anchored: false,
            last_imu: None,
            orientation: UnitQuaternion::identity(),
            velocity: Vec3::zeros(),
            position: Vec3::zeros(),
            pose: None,
            features: None,
            frames_tracked: 0,
        }
    }

    pub fn frames_tracked(&self) -> u64 {
        self.frames_tracked
    }
}

impl Pipeline for InertialOdometry {
    fn name(&self) -> &'static str {
        "odometry"
    }

    fn mode(&self) -> PipelineMode {
        PipelineMode::Slam
    }

    fn update_inertial(&mut self, imu: &InertialSample) -> Result<()> {
        if !self.anchored {
            return Ok(());
        }
        let Some(last) = self.last_imu else {
            self.last_imu = Some(imu.timestamp);
            return Ok(());
        };
        if imu.timestamp < last {
            log::debug!("odometry: dropping out-of-order imu reading at {}", imu.timestamp);
            return Ok(());
        }
        let dt = (imu.timestamp - last) as f64 * 1e-6;
        self.last_imu = Some(imu.timestamp);

        self.orientation *= UnitQuaternion::from_scaled_axis(imu.angular_velocity * dt);
        self.orientation.renormalize();
        let accel_world = self.orientation.transform_vector(&imu.linear_accel) - gravity();
        self.velocity += accel_world * dt;
        self.position += self.velocity * dt;
        Ok(())
    }

    fn update_stereo(&mut self, stereo: &StereoSample) -> Result<()> {
        check_geometry(&self.calibration, &stereo.left)?;
        let left = detect_keypoints(&stereo.left, &self.options.detection);
        if left.len() < self.options.min_features {
            return Err(anyhow!(
                "tracking lost at {}: {} keypoints (< {})",
                stereo.timestamp,
                left.len(),
                self.options.min_features
            ));
        }
        if !self.anchored {
            self.anchored = true;
            self.last_imu = Some(stereo.timestamp);
        }
        self.frames_tracked += 1;
        self.pose = Some(Pose {
            timestamp: stereo.timestamp,
            translation: self.position,
            orientation: self.orientation,
        });
        self.features = Some(FeatureSet {
            left,
            right: Vec::new(),
            stereo: None,
        });
        Ok(())
    }

    fn pose(&self) -> Option<Pose> {
        self.pose
    }

    fn features(&self) -> Option<&FeatureSet> {
        self.features.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sample::Image;

    fn calibration() -> Calibration {
        Calibration {
            fx: 100.0,
            fy: 100.0,
            cx: 32.0,
            cy: 24.0,
            baseline: 0.1,
            width: 64,
            height: 48,
        }
    }

    fn checker(ts: u64) -> StereoSample {
        let mut pixels = Vec::with_capacity(64 * 48);
        for y in 0..48u32 {
            for x in 0..64u32 {
                pixels.push(if ((x / 4) + (y / 4)) % 2 == 0 { 20 } else { 220 });
            }
        }
        StereoSample::new(
            ts,
            Image::gray(64, 48, pixels.clone()),
            Image::gray(64, 48, pixels),
        )
    }

    fn options() -> OdometryOptions {
        OdometryOptions {
            min_features: 4,
            ..OdometryOptions::default()
        }
    }

    fn imu(ts: u64, yaw_rate: f64) -> InertialSample {
        InertialSample {
            timestamp: ts,
            linear_accel: gravity(),
            angular_velocity: Vec3::new(0.0, 0.0, yaw_rate),
        }
    }

    #[test]
    fn no_pose_before_first_stereo_and_imu_ignored() -> Result<()> {
        let mut odo = InertialOdometry::with_calibration(calibration(), options());
        odo.update_inertial(&imu(0, 1.0))?;
        odo.update_inertial(&imu(1_000_000, 1.0))?;
        assert!(odo.pose().is_none());

        odo.update_stereo(&checker(2_000_000))?;
        let pose = odo.pose().expect("pose");
        assert_eq!(pose.orientation, UnitQuaternion::identity());
        assert_eq!(pose.timestamp, 2_000_000);
        Ok(())
    }

    #[test]
    fn gyro_integration_rotates_pose() -> Result<()> {
        let mut odo = InertialOdometry::with_calibration(calibration(), options());
        odo.update_stereo(&checker(0))?;
        // 0.5 rad/s for one second in 100 steps.
        for i in 1..=100u64 {
            odo.update_inertial(&imu(i * 10_000, 0.5))?;
        }
        odo.update_stereo(&checker(1_000_000))?;
        let pose = odo.pose().expect("pose");
        let (_, _, yaw) = pose.orientation.euler_angles();
        assert!((yaw - 0.5).abs() < 1e-6, "yaw={yaw}");
        // Gravity-only acceleration keeps the device in place.
        assert!(pose.translation.norm() < 1e-9);
        assert_eq!(odo.frames_tracked(), 2);
        Ok(())
    }

    #[test]
    fn textureless_frame_loses_tracking() -> Result<()> {
        let mut odo = InertialOdometry::with_calibration(calibration(), options());
        odo.update_stereo(&checker(0))?;
        let flat = StereoSample::new(
            1,
            Image::gray(64, 48, vec![90; 64 * 48]),
            Image::gray(64, 48, vec![90; 64 * 48]),
        );
        let err = odo.update_stereo(&flat).unwrap_err();
        assert!(err.to_string().contains("tracking lost"));
        Ok(())
    }

    #[test]
    fn init_requires_non_empty_vocabulary() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let calib_path = dir.path().join("calib.json");
        std::fs::write(
            &calib_path,
            r#"{"fx":100,"fy":100,"cx":32,"cy":24,"baseline":0.1,"width":64,"height":48}"#,
        )?;
        let vocab_path = dir.path().join("voc.json");
        std::fs::write(&vocab_path, "")?;
        assert!(InertialOdometry::init(&calib_path, &vocab_path, options()).is_err());

        std::fs::write(&vocab_path, "{\"words\": []}")?;
        assert!(InertialOdometry::init(&calib_path, &vocab_path, options()).is_ok());
        Ok(())
    }
}
