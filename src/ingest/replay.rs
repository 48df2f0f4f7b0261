//! Recorded sequence source (`replay://<sequence dir>`).
//!
//! Reads the index files written by `record::Recorder`, merges IMU and stereo
//! entries by timestamp and streams them back one per poll. Images are decoded
//! lazily at poll time. A pair that fails to decode is still delivered, with an
//! empty image, so the dispatcher drops it like any other corrupt sample.
//! Once the sequence is exhausted every poll reports `NotReady`.

use anyhow::{anyhow, Context, Result};
use std::collections::VecDeque;
use std::fs;
use std::path::{Path, PathBuf};

use super::{DeviceMode, FrameSource, Polled};
use crate::record::{IMU_FILE, STEREO_FILE};
use crate::sample::{DepthImage, Image, InertialSample, Sample, StereoSample, Timestamp, Vec3};

enum Entry {
    Inertial(InertialSample),
    Stereo {
        timestamp: Timestamp,
        left: PathBuf,
        right: PathBuf,
        depth: Option<PathBuf>,
    },
}

impl Entry {
    fn timestamp(&self) -> Timestamp {
        match self {
            Entry::Inertial(imu) => imu.timestamp,
            Entry::Stereo { timestamp, .. } => *timestamp,
        }
    }
}

pub struct ReplaySource {
    name: String,
    mode: DeviceMode,
    entries: VecDeque<Entry>,
    total: usize,
    started: bool,
}

impl ReplaySource {
    pub fn open(dir: impl AsRef<Path>, mode: DeviceMode) -> Result<Self> {
        let dir = dir.as_ref();
        if !dir.is_dir() {
            return Err(anyhow!("replay sequence {} is not a directory", dir.display()));
        }
        let mut entries = read_imu_index(&dir.join(IMU_FILE))?;
        entries.extend(read_stereo_index(dir, &dir.join(STEREO_FILE))?);
        // Stable sort keeps IMU readings ahead of a pair with the same timestamp.
        entries.sort_by_key(Entry::timestamp);
        let total = entries.len();
        log::info!("ReplaySource: {} entries from {}", total, dir.display());
        Ok(Self {
            name: format!("replay://{}", dir.display()),
            mode,
            entries: entries.into(),
            total,
            started: false,
        })
    }

    pub fn remaining(&self) -> usize {
        self.entries.len()
    }

    fn load_stereo(
        &self,
        timestamp: Timestamp,
        left: &Path,
        right: &Path,
        depth: Option<&Path>,
    ) -> StereoSample {
        let mut stereo = StereoSample::new(timestamp, load_image(left), load_image(right));
        if self.mode == DeviceMode::Depth {
            if let Some(path) = depth {
                stereo = stereo.with_depth(load_depth(path));
            }
        }
        stereo
    }
}

impl FrameSource for ReplaySource {
    fn name(&self) -> &str {
        &self.name
    }

    fn start(&mut self) -> Result<()> {
        self.started = true;
        Ok(())
    }

    fn stop(&mut self) {
        self.started = false;
        log::debug!(
            "ReplaySource: stopped with {}/{} entries unplayed",
            self.entries.len(),
            self.total
        );
    }

    /// Healthy while started with entries left to play.
    fn is_healthy(&self) -> bool {
        self.started && !self.entries.is_empty()
    }

    fn poll(&mut self) -> Polled {
        match self.entries.pop_front() {
            None => Polled::NotReady,
            Some(Entry::Inertial(imu)) => Polled::Ready(Sample::Inertial(imu)),
            Some(Entry::Stereo {
                timestamp,
                left,
                right,
                depth,
            }) => Polled::Ready(Sample::Stereo(self.load_stereo(
                timestamp,
                &left,
                &right,
                depth.as_deref(),
            ))),
        }
    }
}

fn read_imu_index(path: &Path) -> Result<Vec<Entry>> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    raw.lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(n, line)| {
            parse_imu_line(line)
                .with_context(|| format!("{}:{}: bad imu record", path.display(), n + 1))
        })
        .collect()
}

fn parse_imu_line(line: &str) -> Result<Entry> {
    let fields: Vec<&str> = line.split_whitespace().collect();
    if fields.len() != 7 {
        return Err(anyhow!("expected 7 fields, found {}", fields.len()));
    }
    let timestamp: Timestamp = fields[0].parse()?;
    let mut values = [0.0f64; 6];
    for (slot, field) in values.iter_mut().zip(&fields[1..]) {
        *slot = field.parse()?;
    }
    Ok(Entry::Inertial(InertialSample {
        timestamp,
        linear_accel: Vec3::new(values[0], values[1], values[2]),
        angular_velocity: Vec3::new(values[3], values[4], values[5]),
    }))
}

fn read_stereo_index(dir: &Path, path: &Path) -> Result<Vec<Entry>> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let mut entries = Vec::new();
    for (n, line) in raw.lines().enumerate() {
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.is_empty() {
            continue;
        }
        if !(3..=4).contains(&fields.len()) {
            return Err(anyhow!(
                "{}:{}: expected 3 or 4 fields, found {}",
                path.display(),
                n + 1,
                fields.len()
            ));
        }
        let timestamp: Timestamp = fields[0]
            .parse()
            .with_context(|| format!("{}:{}: bad timestamp", path.display(), n + 1))?;
        entries.push(Entry::Stereo {
            timestamp,
            left: dir.join(fields[1]),
            right: dir.join(fields[2]),
            depth: fields.get(3).map(|name| dir.join(name)),
        });
    }
    Ok(entries)
}

fn load_image(path: &Path) -> Image {
    match image::open(path) {
        Ok(img) if img.color().channel_count() >= 3 => {
            let rgb = img.to_rgb8();
            let (w, h) = rgb.dimensions();
            Image::new(w, h, 3, rgb.into_raw())
        }
        Ok(img) => {
            let gray = img.to_luma8();
            let (w, h) = gray.dimensions();
            Image::gray(w, h, gray.into_raw())
        }
        Err(err) => {
            log::warn!("ReplaySource: failed to decode {}: {}", path.display(), err);
            Image::gray(0, 0, Vec::new())
        }
    }
}

fn load_depth(path: &Path) -> DepthImage {
    match image::open(path) {
        Ok(img) => {
            let depth = img.to_luma16();
            let (w, h) = depth.dimensions();
            DepthImage::new(w, h, depth.into_raw())
        }
        Err(err) => {
            log::warn!("ReplaySource: failed to decode {}: {}", path.display(), err);
            DepthImage::new(0, 0, Vec::new())
        }
    }
}
