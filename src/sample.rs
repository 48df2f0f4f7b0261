//! Sensor samples produced by a frame source.
//!
//! - `Sample`: the two-way union the consumption loop matches on.
//! - `InertialSample`: one accelerometer + gyroscope reading.
//! - `StereoSample`: a left/right image pair, with a depth image in DEPTH mode.
//!
//! Samples are immutable once built. Image buffers are reference counted so a
//! sample can be handed to the presentation worker without copying pixels.

use nalgebra::Vector3;
use std::sync::Arc;

/// Device timestamp in microseconds.
pub type Timestamp = u64;

/// Three-component vector used for inertial readings and 3D points.
pub type Vec3 = Vector3<f64>;

/// 8-bit image, row-major, `channels` interleaved bytes per pixel.
#[derive(Clone, Debug)]
pub struct Image {
    pub width: u32,
    pub height: u32,
    pub channels: u8,
    data: Arc<[u8]>,
}

impl Image {
    pub fn new(width: u32, height: u32, channels: u8, data: Vec<u8>) -> Self {
        Self {
            width,
            height,
            channels,
            data: data.into(),
        }
    }

    pub fn gray(width: u32, height: u32, data: Vec<u8>) -> Self {
        Self::new(width, height, 1, data)
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn expected_len(&self) -> usize {
        self.width as usize * self.height as usize * self.channels as usize
    }

    /// True when the buffer matches the declared geometry.
    pub fn is_well_formed(&self) -> bool {
        self.width > 0
            && self.height > 0
            && self.channels > 0
            && self.data.len() == self.expected_len()
    }

    /// Intensity at (x, y). Multi-channel images use the first channel.
    pub fn at(&self, x: u32, y: u32) -> u8 {
        let idx = (y as usize * self.width as usize + x as usize) * self.channels as usize;
        self.data[idx]
    }
}

/// 16-bit depth image in millimetres (DEPTH mode only).
#[derive(Clone, Debug)]
pub struct DepthImage {
    pub width: u32,
    pub height: u32,
    data: Arc<[u16]>,
}

impl DepthImage {
    pub fn new(width: u32, height: u32, data: Vec<u16>) -> Self {
        Self {
            width,
            height,
            data: data.into(),
        }
    }

    pub fn data(&self) -> &[u16] {
        &self.data
    }

    pub fn is_well_formed(&self) -> bool {
        self.width > 0
            && self.height > 0
            && self.data.len() == self.width as usize * self.height as usize
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct InertialSample {
    pub timestamp: Timestamp,
    /// Linear acceleration in m/s^2.
    pub linear_accel: Vec3,
    /// Angular velocity in rad/s.
    pub angular_velocity: Vec3,
}

#[derive(Clone, Debug)]
pub struct StereoSample {
    pub timestamp: Timestamp,
    pub left: Image,
    pub right: Image,
    pub depth: Option<DepthImage>,
}

impl StereoSample {
    pub fn new(timestamp: Timestamp, left: Image, right: Image) -> Self {
        Self {
            timestamp,
            left,
            right,
            depth: None,
        }
    }

    pub fn with_depth(mut self, depth: DepthImage) -> Self {
        self.depth = Some(depth);
        self
    }
}

/// One unit of sensor data.
#[derive(Clone, Debug)]
pub enum Sample {
    Inertial(InertialSample),
    Stereo(StereoSample),
}

impl Sample {
    pub fn timestamp(&self) -> Timestamp {
        match self {
            Sample::Inertial(imu) => imu.timestamp,
            Sample::Stereo(stereo) => stereo.timestamp,
        }
    }

    pub fn kind(&self) -> SampleKind {
        match self {
            Sample::Inertial(_) => SampleKind::Inertial,
            Sample::Stereo(_) => SampleKind::Stereo,
        }
    }
}

impl From<InertialSample> for Sample {
    fn from(sample: InertialSample) -> Self {
        Sample::Inertial(sample)
    }
}

impl From<StereoSample> for Sample {
    fn from(sample: StereoSample) -> Self {
        Sample::Stereo(sample)
    }
}

/// Variant tag without payload.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SampleKind {
    Inertial,
    Stereo,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn image_geometry_must_match_buffer() {
        assert!(Image::gray(4, 2, vec![0; 8]).is_well_formed());
        assert!(!Image::gray(4, 2, vec![0; 7]).is_well_formed());
        assert!(!Image::gray(0, 2, vec![]).is_well_formed());
        assert!(Image::new(2, 2, 3, vec![0; 12]).is_well_formed());
    }

    #[test]
    fn image_at_reads_first_channel() {
        let img = Image::new(2, 1, 3, vec![10, 11, 12, 20, 21, 22]);
        assert_eq!(img.at(0, 0), 10);
        assert_eq!(img.at(1, 0), 20);
    }

    #[test]
    fn sample_reports_timestamp_and_kind() {
        let imu: Sample = InertialSample {
            timestamp: 7,
            linear_accel: Vec3::zeros(),
            angular_velocity: Vec3::zeros(),
        }
        .into();
        assert_eq!(imu.timestamp(), 7);
        assert_eq!(imu.kind(), SampleKind::Inertial);

        let stereo: Sample =
            StereoSample::new(9, Image::gray(1, 1, vec![0]), Image::gray(1, 1, vec![0])).into();
        assert_eq!(stereo.timestamp(), 9);
        assert_eq!(stereo.kind(), SampleKind::Stereo);
    }
}
