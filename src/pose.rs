//! Rigid-body pose estimates.

use nalgebra::UnitQuaternion;

use crate::sample::{Timestamp, Vec3};

/// Device pose in the global frame at a timestamp.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Pose {
    pub timestamp: Timestamp,
    pub translation: Vec3,
    pub orientation: UnitQuaternion<f64>,
}

impl Pose {
    pub fn identity(timestamp: Timestamp) -> Self {
        Self {
            timestamp,
            translation: Vec3::zeros(),
            orientation: UnitQuaternion::identity(),
        }
    }

    /// Orientation as `[qx, qy, qz, qw]`.
    pub fn quaternion_xyzw(&self) -> [f64; 4] {
        // nalgebra stores the imaginary part first.
        let c = &self.orientation.quaternion().coords;
        [c[0], c[1], c[2], c[3]]
    }
}
