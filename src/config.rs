use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::ingest::{DeviceConfig, DeviceMode};
use crate::pose_log::DEFAULT_POSE_LOG_PATH;
use crate::session::SessionOptions;

const DEFAULT_PRESENT_EVERY: u64 = 30;
const DEFAULT_IDLE_SPINS: u32 = 64;
const DEFAULT_HEALTH_SECS: u64 = 5;

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct StreamConfigFile {
    pose_log: Option<PathBuf>,
    device: Option<DeviceConfigFile>,
    present: Option<PresentConfigFile>,
    session: Option<SessionConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct DeviceConfigFile {
    uri: Option<String>,
    mode: Option<String>,
    imu_hz: Option<u32>,
    stereo_hz: Option<u32>,
    width: Option<u32>,
    height: Option<u32>,
    realtime: Option<bool>,
    blank_after: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct PresentConfigFile {
    enabled: Option<bool>,
    every: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct SessionConfigFile {
    idle_spins: Option<u32>,
    health_secs: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct StreamConfig {
    pub device: DeviceConfig,
    pub pose_log: PathBuf,
    pub present: PresentSettings,
    pub idle_spins: u32,
    pub health_interval: Duration,
}

#[derive(Debug, Clone)]
pub struct PresentSettings {
    pub enabled: bool,
    /// Console summary every N presented frames.
    pub every: u64,
}

impl StreamConfig {
    /// Defaults, then the `VIO_CONFIG` TOML file, then `VIO_*` env overrides.
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("VIO_CONFIG").ok();
        let file_cfg = match config_path.as_deref() {
            Some(path) if !path.trim().is_empty() => Some(read_config_file(Path::new(path))?),
            _ => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default())?;
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: StreamConfigFile) -> Result<Self> {
        let defaults = DeviceConfig::default();
        let dev = file.device.unwrap_or_default();
        let mode = match dev.mode {
            Some(mode) => mode.parse::<DeviceMode>()?,
            None => defaults.mode,
        };
        let device = DeviceConfig {
            uri: dev.uri.unwrap_or(defaults.uri),
            mode,
            imu_hz: dev.imu_hz.unwrap_or(defaults.imu_hz),
            stereo_hz: dev.stereo_hz.unwrap_or(defaults.stereo_hz),
            width: dev.width.unwrap_or(defaults.width),
            height: dev.height.unwrap_or(defaults.height),
            realtime: dev.realtime.unwrap_or(defaults.realtime),
            blank_after: dev.blank_after.or(defaults.blank_after),
        };
        let present = file.present.unwrap_or_default();
        let session = file.session.unwrap_or_default();
        Ok(Self {
            device,
            pose_log: file
                .pose_log
                .unwrap_or_else(|| PathBuf::from(DEFAULT_POSE_LOG_PATH)),
            present: PresentSettings {
                enabled: present.enabled.unwrap_or(true),
                every: present.every.unwrap_or(DEFAULT_PRESENT_EVERY),
            },
            idle_spins: session.idle_spins.unwrap_or(DEFAULT_IDLE_SPINS),
            health_interval: Duration::from_secs(
                session.health_secs.unwrap_or(DEFAULT_HEALTH_SECS),
            ),
        })
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(uri) = std::env::var("VIO_DEVICE_URI") {
            if !uri.trim().is_empty() {
                self.device.uri = uri.trim().to_string();
            }
        }
        if let Ok(path) = std::env::var("VIO_POSE_LOG") {
            if !path.trim().is_empty() {
                self.pose_log = PathBuf::from(path);
            }
        }
        if let Ok(hz) = std::env::var("VIO_STEREO_HZ") {
            self.device.stereo_hz = hz
                .trim()
                .parse()
                .map_err(|_| anyhow!("VIO_STEREO_HZ must be an integer rate in Hz"))?;
        }
        if let Ok(hz) = std::env::var("VIO_IMU_HZ") {
            self.device.imu_hz = hz
                .trim()
                .parse()
                .map_err(|_| anyhow!("VIO_IMU_HZ must be an integer rate in Hz"))?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.device.uri.trim().is_empty() {
            return Err(anyhow!("device uri must not be empty"));
        }
        if self.device.imu_hz == 0 || self.device.stereo_hz == 0 {
            return Err(anyhow!("device rates must be greater than zero"));
        }
        if self.device.width == 0 || self.device.height == 0 {
            return Err(anyhow!("device image size must be non-zero"));
        }
        if self.present.every == 0 {
            return Err(anyhow!("present.every must be greater than zero"));
        }
        if self.pose_log.as_os_str().is_empty() {
            return Err(anyhow!("pose log path must not be empty"));
        }
        Ok(())
    }

    pub fn session_options(&self) -> SessionOptions {
        SessionOptions {
            idle_spins: self.idle_spins,
            health_interval: self.health_interval,
            stop_after_updates: None,
        }
    }
}

fn read_config_file(path: &Path) -> Result<StreamConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let cfg = toml::from_str(&raw)
        .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?;
    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_yields_defaults() -> Result<()> {
        let cfg = StreamConfig::from_file(toml::from_str("")?)?;
        assert_eq!(cfg.device.uri, "stub://device");
        assert_eq!(cfg.device.mode, DeviceMode::Raw);
        assert_eq!(cfg.pose_log, PathBuf::from(DEFAULT_POSE_LOG_PATH));
        assert_eq!(cfg.present.every, DEFAULT_PRESENT_EVERY);
        cfg.validate()
    }

    #[test]
    fn file_sections_override_defaults() -> Result<()> {
        let raw = r#"
            pose_log = "/var/tmp/poses.txt"

            [device]
            mode = "depth_mode"
            stereo_hz = 15
            blank_after = 40

            [present]
            enabled = false
        "#;
        let cfg = StreamConfig::from_file(toml::from_str(raw)?)?;
        assert_eq!(cfg.device.mode, DeviceMode::Depth);
        assert_eq!(cfg.device.stereo_hz, 15);
        assert_eq!(cfg.device.imu_hz, DeviceConfig::default().imu_hz);
        assert_eq!(cfg.device.blank_after, Some(40));
        assert!(!cfg.present.enabled);
        assert_eq!(cfg.pose_log, PathBuf::from("/var/tmp/poses.txt"));
        Ok(())
    }

    #[test]
    fn bad_mode_and_unknown_keys_are_rejected() {
        let bad_mode: StreamConfigFile =
            toml::from_str("[device]\nmode = \"thermal\"").expect("parses as toml");
        assert!(StreamConfig::from_file(bad_mode).is_err());
        assert!(toml::from_str::<StreamConfigFile>("[device]\nfps = 3").is_err());
    }
}
