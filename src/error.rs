//! Startup error tier.
//!
//! Only these errors reach the process exit status. Everything that happens
//! after the device is streaming is absorbed by the session and reported
//! through `SessionReport`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StartupError {
    /// Bad or missing calibration/vocabulary file, bad arguments or config.
    #[error("configuration error: {0:#}")]
    Configuration(anyhow::Error),
    /// Device could not be created or started.
    #[error("device error: {0:#}")]
    Device(anyhow::Error),
}

impl StartupError {
    pub fn configuration(err: impl Into<anyhow::Error>) -> Self {
        StartupError::Configuration(err.into())
    }

    pub fn device(err: impl Into<anyhow::Error>) -> Self {
        StartupError::Device(err.into())
    }
}

/// Exit status used for every startup failure and for usage errors.
pub const EXIT_STARTUP_FAILURE: i32 = -1;
