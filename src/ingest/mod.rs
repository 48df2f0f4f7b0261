//! Frame sources and the owning device handle.
//!
//! This module provides the sources a session can stream from:
//! - Synthetic device (`stub://<name>`), paced IMU + stereo generator
//! - Recorded sequences (`replay://<dir>`), written by `record::Recorder`
//! - Scripted source (tests), a fixed list of poll results
//!
//! Every source is wrapped in a `DeviceHandle`, which owns the
//! init -> started -> stopped lifecycle. Sources never block in `poll`; an
//! empty read is reported as `Polled::NotReady`.

pub mod replay;
pub mod scripted;
pub mod synthetic;

use anyhow::{anyhow, Result};
use std::fmt;
use std::str::FromStr;

use crate::sample::Sample;

pub use replay::ReplaySource;
pub use scripted::{ScriptedSource, StopCounter};
pub use synthetic::SyntheticSource;

/// Which sample variants and image processing the device produces.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum DeviceMode {
    /// Raw stereo images + IMU readings.
    #[default]
    Raw,
    /// Rectified stereo images with a depth image + IMU readings.
    Depth,
}

impl FromStr for DeviceMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "raw" | "raw_mode" => Ok(DeviceMode::Raw),
            "depth" | "depth_mode" => Ok(DeviceMode::Depth),
            other => Err(anyhow!("[{}] is not a valid mode", other)),
        }
    }
}

impl fmt::Display for DeviceMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceMode::Raw => f.write_str("raw_mode"),
            DeviceMode::Depth => f.write_str("depth_mode"),
        }
    }
}

/// Options passed to device creation.
#[derive(Clone, Debug)]
pub struct DeviceConfig {
    /// Device URI (`stub://<name>` or `replay://<sequence dir>`).
    pub uri: String,
    pub mode: DeviceMode,
    /// IMU rate for synthetic devices.
    pub imu_hz: u32,
    /// Stereo rate for synthetic devices.
    pub stereo_hz: u32,
    pub width: u32,
    pub height: u32,
    /// Pace samples against the wall clock (false emits as fast as polled).
    pub realtime: bool,
    /// Synthetic devices emit textureless frames after this many stereo samples.
    pub blank_after: Option<u64>,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            uri: "stub://device".to_string(),
            mode: DeviceMode::Raw,
            imu_hz: 200,
            stereo_hz: 30,
            width: 320,
            height: 240,
            realtime: true,
            blank_after: None,
        }
    }
}

/// Result of a non-blocking read.
#[derive(Debug)]
pub enum Polled {
    Ready(Sample),
    NotReady,
}

/// A device or driver that produces samples.
///
/// `poll` must return immediately. `stop` may be called on a source that was
/// never started and must tolerate repeated calls.
pub trait FrameSource: Send {
    /// Source identifier (used in logs).
    fn name(&self) -> &str;

    fn start(&mut self) -> Result<()>;

    fn stop(&mut self);

    fn poll(&mut self) -> Polled;

    /// Check if the source is healthy.
    fn is_healthy(&self) -> bool {
        true
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeviceState {
    Initialized,
    Started,
    Stopped,
}

/// Single owning reference to a frame source.
pub struct DeviceHandle {
    source: Box<dyn FrameSource>,
    mode: DeviceMode,
    state: DeviceState,
}

impl DeviceHandle {
    pub fn new(source: Box<dyn FrameSource>, mode: DeviceMode) -> Self {
        Self {
            source,
            mode,
            state: DeviceState::Initialized,
        }
    }

    pub fn name(&self) -> &str {
        self.source.name()
    }

    pub fn mode(&self) -> DeviceMode {
        self.mode
    }

    pub fn state(&self) -> DeviceState {
        self.state
    }

    pub fn is_healthy(&self) -> bool {
        self.source.is_healthy()
    }

    /// Start streaming. A stopped device cannot be restarted.
    pub fn start(&mut self) -> Result<()> {
        match self.state {
            DeviceState::Initialized => {
                self.source.start()?;
                self.state = DeviceState::Started;
                log::info!("device {} started ({})", self.source.name(), self.mode);
                Ok(())
            }
            DeviceState::Started => Ok(()),
            DeviceState::Stopped => Err(anyhow!(
                "device {} already stopped; create a new device",
                self.source.name()
            )),
        }
    }

    /// Non-blocking read. A device that is not streaming is never ready.
    pub fn poll(&mut self) -> Polled {
        match self.state {
            DeviceState::Started => self.source.poll(),
            _ => Polled::NotReady,
        }
    }

    /// Stop the device. Returns true only for the call that performed the stop.
    ///
    /// Stopping an unstarted or already stopped device is a no-op.
    pub fn stop(&mut self) -> bool {
        match self.state {
            DeviceState::Started => {
                self.source.stop();
                self.state = DeviceState::Stopped;
                log::info!("device {} stopped", self.source.name());
                true
            }
            DeviceState::Initialized => {
                self.state = DeviceState::Stopped;
                false
            }
            DeviceState::Stopped => false,
        }
    }
}

impl Drop for DeviceHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Create a device for the configured URI.
pub fn open_device(config: &DeviceConfig) -> Result<DeviceHandle> {
    let source: Box<dyn FrameSource> = if config.uri.starts_with("stub://") {
        Box::new(SyntheticSource::new(config.clone())?)
    } else if let Some(dir) = config.uri.strip_prefix("replay://") {
        Box::new(ReplaySource::open(dir, config.mode)?)
    } else {
        return Err(anyhow!(
            "unsupported device uri '{}' (expected stub:// or replay://)",
            config.uri
        ));
    };
    Ok(DeviceHandle::new(source, config.mode))
}
