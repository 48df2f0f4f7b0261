//! Synthetic device (`stub://<name>`).
//!
//! Produces interleaved IMU and stereo samples on a simulated device clock.
//! The scene is a block texture that pans horizontally while the device yaws
//! slowly; the right image is the left image shifted by a fixed disparity so
//! stereo matching has something to find. In realtime mode samples become
//! ready as the wall clock passes their timestamp, otherwise every poll is
//! ready.

use anyhow::{anyhow, Result};
use rand::Rng;
use std::time::Instant;

use super::{DeviceConfig, DeviceMode, FrameSource, Polled};
use crate::sample::{DepthImage, Image, InertialSample, Sample, StereoSample, Timestamp, Vec3};

/// Disparity between left and right images, in pixels.
pub const SYNTHETIC_DISPARITY: u32 = 8;
/// Depth reported for every pixel in DEPTH mode, in millimetres.
pub const SYNTHETIC_DEPTH_MM: u16 = 2000;

const GRAVITY: f64 = 9.81;
const YAW_RATE: f64 = 0.1;
const BLOCK: u32 = 8;
const BLANK_INTENSITY: u8 = 128;

pub struct SyntheticSource {
    config: DeviceConfig,
    started_at: Option<Instant>,
    imu_period_us: u64,
    stereo_period_us: u64,
    next_imu: Timestamp,
    next_stereo: Timestamp,
    imu_count: u64,
    stereo_count: u64,
}

impl SyntheticSource {
    pub fn new(config: DeviceConfig) -> Result<Self> {
        if config.imu_hz == 0 || config.stereo_hz == 0 {
            return Err(anyhow!("synthetic device rates must be >= 1 Hz"));
        }
        if config.width <= SYNTHETIC_DISPARITY || config.height == 0 {
            return Err(anyhow!(
                "synthetic image size {}x{} too small",
                config.width,
                config.height
            ));
        }
        Ok(Self {
            imu_period_us: 1_000_000 / config.imu_hz as u64,
            stereo_period_us: 1_000_000 / config.stereo_hz as u64,
            config,
            started_at: None,
            next_imu: 0,
            next_stereo: 0,
            imu_count: 0,
            stereo_count: 0,
        })
    }

    fn device_clock_us(&self) -> Option<u64> {
        if !self.config.realtime {
            return Some(u64::MAX);
        }
        self.started_at.map(|t| t.elapsed().as_micros() as u64)
    }

    fn next_inertial(&mut self) -> Sample {
        let timestamp = self.next_imu;
        self.next_imu += self.imu_period_us;
        self.imu_count += 1;

        let mut rng = rand::thread_rng();
        let mut noise = || rng.gen_range(-0.005..0.005);
        Sample::Inertial(InertialSample {
            timestamp,
            linear_accel: Vec3::new(noise(), noise(), GRAVITY + noise()),
            angular_velocity: Vec3::new(noise(), noise(), YAW_RATE + noise()),
        })
    }

    fn next_stereo_pair(&mut self) -> Sample {
        let timestamp = self.next_stereo;
        self.next_stereo += self.stereo_period_us;
        self.stereo_count += 1;

        let blank = self
            .config
            .blank_after
            .is_some_and(|limit| self.stereo_count > limit);
        let (width, height) = (self.config.width, self.config.height);
        let pan = (self.stereo_count as u32).wrapping_mul(2);

        let (left, right) = if blank {
            let pixels = vec![BLANK_INTENSITY; (width * height) as usize];
            (Image::gray(width, height, pixels.clone()), Image::gray(width, height, pixels))
        } else {
            (
                Image::gray(width, height, texture(width, height, pan)),
                Image::gray(
                    width,
                    height,
                    texture(width, height, pan.wrapping_add(SYNTHETIC_DISPARITY)),
                ),
            )
        };

        let mut stereo = StereoSample::new(timestamp, left, right);
        if self.config.mode == DeviceMode::Depth {
            let depth = vec![SYNTHETIC_DEPTH_MM; (width * height) as usize];
            stereo = stereo.with_depth(DepthImage::new(width, height, depth));
        }
        Sample::Stereo(stereo)
    }
}

impl FrameSource for SyntheticSource {
    fn name(&self) -> &str {
        &self.config.uri
    }

    fn start(&mut self) -> Result<()> {
        self.started_at = Some(Instant::now());
        log::info!(
            "SyntheticSource: streaming {} ({} Hz imu, {} Hz stereo, {}x{})",
            self.config.uri,
            self.config.imu_hz,
            self.config.stereo_hz,
            self.config.width,
            self.config.height
        );
        Ok(())
    }

    fn stop(&mut self) {
        log::debug!(
            "SyntheticSource: {} emitted {} imu / {} stereo samples",
            self.config.uri,
            self.imu_count,
            self.stereo_count
        );
        self.started_at = None;
    }

    fn is_healthy(&self) -> bool {
        self.started_at.is_some()
    }

    fn poll(&mut self) -> Polled {
        let Some(now) = self.device_clock_us() else {
            return Polled::NotReady;
        };
        let next = self.next_imu.min(self.next_stereo);
        if next > now {
            return Polled::NotReady;
        }
        // IMU wins ties so inertial data precedes the image it brackets.
        if self.next_imu <= self.next_stereo {
            Polled::Ready(self.next_inertial())
        } else {
            Polled::Ready(self.next_stereo_pair())
        }
    }
}

/// Blocky pseudo-random texture, panned horizontally by `offset` pixels.
fn texture(width: u32, height: u32, offset: u32) -> Vec<u8> {
    let mut pixels = Vec::with_capacity((width * height) as usize);
    for y in 0..height {
        for x in 0..width {
            let bx = x.wrapping_add(offset) / BLOCK;
            let by = y / BLOCK;
            pixels.push(block_intensity(bx, by));
        }
    }
    pixels
}

fn block_intensity(bx: u32, by: u32) -> u8 {
    let mut h = bx.wrapping_mul(0x9E37_79B9) ^ by.wrapping_mul(0x85EB_CA6B);
    h ^= h >> 15;
    h = h.wrapping_mul(0x2C1B_3C6D);
    h ^= h >> 12;
    (h & 0xFF) as u8
}
