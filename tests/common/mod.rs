#![allow(dead_code)]

use anyhow::{anyhow, Result};

use vio_stream::{
    FeatureSet, Image, InertialSample, Pipeline, PipelineMode, Pose, Sample, StereoSample, Vec3,
};

/// Pose at every stereo update; fails on the `fail_at`-th stereo update.
pub struct ScriptedPipeline {
    pub mode: PipelineMode,
    pub fail_at: Option<u64>,
    stereo: u64,
    pose: Option<Pose>,
}

impl ScriptedPipeline {
    pub fn new(mode: PipelineMode) -> Self {
        Self {
            mode,
            fail_at: None,
            stereo: 0,
            pose: None,
        }
    }

    pub fn failing_at(mut self, n: u64) -> Self {
        self.fail_at = Some(n);
        self
    }
}

impl Pipeline for ScriptedPipeline {
    fn name(&self) -> &'static str {
        "scripted"
    }

    fn mode(&self) -> PipelineMode {
        self.mode
    }

    fn update_stereo(&mut self, stereo: &StereoSample) -> Result<()> {
        if self.fail_at == Some(self.stereo + 1) {
            return Err(anyhow!("tracking lost at {}", stereo.timestamp));
        }
        self.stereo += 1;
        self.pose = Some(Pose {
            translation: Vec3::new(self.stereo as f64, 0.0, 0.0),
            ..Pose::identity(stereo.timestamp)
        });
        Ok(())
    }

    fn pose(&self) -> Option<Pose> {
        self.pose
    }

    fn features(&self) -> Option<&FeatureSet> {
        None
    }
}

/// Textured 32x24 stereo pair.
pub fn stereo(ts: u64) -> Sample {
    let pixels: Vec<u8> = (0..32 * 24)
        .map(|i| if (i % 32 / 4 + i / 32 / 4) % 2 == 0 { 30 } else { 200 })
        .collect();
    StereoSample::new(
        ts,
        Image::gray(32, 24, pixels.clone()),
        Image::gray(32, 24, pixels),
    )
    .into()
}

pub fn inertial(ts: u64) -> Sample {
    InertialSample {
        timestamp: ts,
        linear_accel: Vec3::new(0.0, 0.0, 9.81),
        angular_velocity: Vec3::zeros(),
    }
    .into()
}
