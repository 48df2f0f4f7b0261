use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use std::path::Path;

/// Minimal stereo calibration descriptor (rectified pinhole pair).
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct Calibration {
    pub fx: f64,
    pub fy: f64,
    pub cx: f64,
    pub cy: f64,
    /// Distance between the two cameras in metres.
    pub baseline: f64,
    pub width: u32,
    pub height: u32,
}

impl Calibration {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read calibration {}", path.display()))?;
        let calib: Calibration = serde_json::from_str(&raw)
            .with_context(|| format!("invalid calibration {}", path.display()))?;
        calib.validate()?;
        Ok(calib)
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.fx > 0.0 && self.fy > 0.0) {
            return Err(anyhow!("focal lengths must be positive"));
        }
        if !(self.baseline > 0.0) {
            return Err(anyhow!("baseline must be positive"));
        }
        if self.width == 0 || self.height == 0 {
            return Err(anyhow!("image size must be non-zero"));
        }
        Ok(())
    }

    /// Depth in metres for a disparity in pixels.
    pub fn depth_from_disparity(&self, disparity: f64) -> Option<f64> {
        (disparity > 0.0).then(|| self.fx * self.baseline / disparity)
    }
}
