//! Feature detection, stereo matching and triangulation.
//!
//! Keypoints are picked per grid cell as the pixel with the strongest central
//! difference gradient, provided it clears a threshold. With `get_3d` each
//! left keypoint is matched along the same row of the right image (rectified
//! pair) by patch SAD and triangulated with the calibration.

use anyhow::{anyhow, Result};
use std::path::Path;

use super::{Calibration, FeatureSet, Pipeline, PipelineMode, Point2, StereoFeature};
use crate::pose::Pose;
use crate::sample::{Image, StereoSample, Vec3};

const PATCH_RADIUS: u32 = 2;

#[derive(Clone, Debug)]
pub struct FeatureOptions {
    /// Match and triangulate features between the two images.
    pub get_3d: bool,
    /// Side of a detection cell in pixels; at most one keypoint per cell.
    pub cell_size: u32,
    /// Minimum |dx| + |dy| central-difference gradient for a keypoint.
    pub gradient_threshold: u32,
    /// Largest disparity searched, in pixels.
    pub max_disparity: u32,
    /// Mean absolute difference per patch pixel above which a match is rejected.
    pub max_patch_error: u32,
}

impl Default for FeatureOptions {
    fn default() -> Self {
        Self {
            get_3d: true,
            cell_size: 16,
            gradient_threshold: 40,
            max_disparity: 48,
            max_patch_error: 12,
        }
    }
}

pub struct FeaturePipeline {
    calibration: Calibration,
    options: FeatureOptions,
    latest: Option<FeatureSet>,
}

impl FeaturePipeline {
    /// Build the initial (empty) feature state from a calibration file.
    pub fn init(calibration_path: &Path, options: FeatureOptions) -> Result<Self> {
        let calibration = Calibration::load(calibration_path)?;
        Ok(Self::with_calibration(calibration, options))
    }

    pub fn with_calibration(calibration: Calibration, options: FeatureOptions) -> Self {
        Self {
            calibration,
            options,
            latest: None,
        }
    }

    pub fn options(&self) -> &FeatureOptions {
        &self.options
    }
}

impl Pipeline for FeaturePipeline {
    fn name(&self) -> &'static str {
        "features"
    }

    fn mode(&self) -> PipelineMode {
        PipelineMode::Features
    }

    fn update_stereo(&mut self, stereo: &StereoSample) -> Result<()> {
        check_geometry(&self.calibration, &stereo.left)?;
        let left = detect_keypoints(&stereo.left, &self.options);
        let right = detect_keypoints(&stereo.right, &self.options);
        let matched = self
            .options
            .get_3d
            .then(|| match_and_triangulate(stereo, &left, &self.calibration, &self.options));
        self.latest = Some(FeatureSet {
            left,
            right,
            stereo: matched,
        });
        Ok(())
    }

    fn pose(&self) -> Option<Pose> {
        None
    }

    fn features(&self) -> Option<&FeatureSet> {
        self.latest.as_ref()
    }
}

pub(crate) fn check_geometry(calibration: &Calibration, img: &Image) -> Result<()> {
    if img.width != calibration.width || img.height != calibration.height {
        return Err(anyhow!(
            "image size {}x{} does not match calibration {}x{}",
            img.width,
            img.height,
            calibration.width,
            calibration.height
        ));
    }
    Ok(())
}

fn gradient(img: &Image, x: u32, y: u32) -> u32 {
    let dx = (img.at(x + 1, y) as i32 - img.at(x - 1, y) as i32).unsigned_abs();
    let dy = (img.at(x, y + 1) as i32 - img.at(x, y - 1) as i32).unsigned_abs();
    dx + dy
}

/// Strongest-gradient keypoint per grid cell.
pub fn detect_keypoints(img: &Image, options: &FeatureOptions) -> Vec<Point2> {
    let border = PATCH_RADIUS + 1;
    if img.width <= 2 * border || img.height <= 2 * border {
        return Vec::new();
    }
    let cell = options.cell_size.max(1);
    let mut keypoints = Vec::new();
    let mut cy = 0;
    while cy < img.height {
        let mut cx = 0;
        while cx < img.width {
            let x_range = cx.max(border)..(cx + cell).min(img.width - border);
            let y_range = cy.max(border)..(cy + cell).min(img.height - border);
            let mut best: Option<(u32, u32, u32)> = None;
            for y in y_range {
                for x in x_range.clone() {
                    let g = gradient(img, x, y);
                    if g >= options.gradient_threshold && best.map_or(true, |(b, _, _)| g > b) {
                        best = Some((g, x, y));
                    }
                }
            }
            if let Some((_, x, y)) = best {
                keypoints.push(Point2 {
                    x: x as f64,
                    y: y as f64,
                });
            }
            cx += cell;
        }
        cy += cell;
    }
    keypoints
}

fn patch_sad(left: &Image, right: &Image, lx: u32, rx: u32, y: u32) -> u32 {
    let r = PATCH_RADIUS as i32;
    let mut sad = 0u32;
    for dy in -r..=r {
        for dx in -r..=r {
            let ly = (y as i32 + dy) as u32;
            let a = left.at((lx as i32 + dx) as u32, ly);
            let b = right.at((rx as i32 + dx) as u32, ly);
            sad += (a as i32 - b as i32).unsigned_abs();
        }
    }
    sad
}

fn match_and_triangulate(
    stereo: &StereoSample,
    keypoints: &[Point2],
    calibration: &Calibration,
    options: &FeatureOptions,
) -> Vec<StereoFeature> {
    let patch_pixels = (2 * PATCH_RADIUS + 1) * (2 * PATCH_RADIUS + 1);
    let max_sad = options.max_patch_error * patch_pixels;
    let mut matches = Vec::new();
    for kp in keypoints {
        let (lx, y) = (kp.x as u32, kp.y as u32);
        let mut best: Option<(u32, u32)> = None;
        for d in 1..=options.max_disparity {
            if lx < d + PATCH_RADIUS {
                break;
            }
            let sad = patch_sad(&stereo.left, &stereo.right, lx, lx - d, y);
            if best.map_or(true, |(b, _)| sad < b) {
                best = Some((sad, d));
            }
        }
        let Some((sad, d)) = best else { continue };
        if sad > max_sad {
            continue;
        }
        let Some(z) = calibration.depth_from_disparity(d as f64) else {
            continue;
        };
        let point = Vec3::new(
            (kp.x - calibration.cx) * z / calibration.fx,
            (kp.y - calibration.cy) * z / calibration.fy,
            z,
        );
        matches.push(StereoFeature {
            left: *kp,
            right: Point2 {
                x: kp.x - d as f64,
                y: kp.y,
            },
            point,
        });
    }
    matches
}
