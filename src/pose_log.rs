//! Append-only pose log.
//!
//! One whitespace-delimited record per line:
//! `timestamp tx ty tz qx qy qz qw`.
//!
//! The log is a best-effort side channel. A failed write is reported once
//! (until a later write succeeds again) and never interrupts streaming; every
//! record is still attempted.

use anyhow::{Context, Result};
use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::Path;

use crate::pose::Pose;

pub const DEFAULT_POSE_LOG_PATH: &str = "/tmp/vio_pose_output.txt";

pub struct PoseLog {
    label: String,
    writer: Box<dyn Write + Send>,
    written: u64,
    failures: u64,
    failing: bool,
    /// A failed write left an unterminated fragment in the log.
    partial: bool,
}

impl PoseLog {
    /// Open `path` for appending, creating it if needed.
    pub fn open(path: &Path) -> Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("failed to open pose log {}", path.display()))?;
        Ok(Self::from_writer(path.display().to_string(), Box::new(file)))
    }

    pub fn from_writer(label: impl Into<String>, writer: Box<dyn Write + Send>) -> Self {
        Self {
            label: label.into(),
            writer,
            written: 0,
            failures: 0,
            failing: false,
            partial: false,
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn records_written(&self) -> u64 {
        self.written
    }

    pub fn failures(&self) -> u64 {
        self.failures
    }

    /// Append one record. Returns false if the write failed.
    pub fn append(&mut self, pose: &Pose) -> bool {
        let mut line = format_record(pose);
        if self.partial {
            line.insert(0, '\n');
        }
        match self.write_line(line.as_bytes()) {
            Ok(()) => {
                if self.failing {
                    log::info!("pose log {} writable again", self.label);
                    self.failing = false;
                }
                self.partial = false;
                self.written += 1;
                true
            }
            Err(err) => {
                self.failures += 1;
                if !self.failing {
                    log::error!("pose log {} write failed: {}", self.label, err);
                    self.failing = true;
                }
                false
            }
        }
    }

    /// `write_all` plus flush, remembering whether the failure cut a line short.
    fn write_line(&mut self, mut buf: &[u8]) -> io::Result<()> {
        let mut sent = 0;
        while !buf.is_empty() {
            match self.writer.write(buf) {
                Ok(0) => {
                    self.partial |= sent > 0;
                    return Err(io::Error::new(
                        io::ErrorKind::WriteZero,
                        "failed to write whole record",
                    ));
                }
                Ok(n) => {
                    sent += n;
                    buf = &buf[n..];
                }
                Err(err) if err.kind() == io::ErrorKind::Interrupted => {}
                Err(err) => {
                    self.partial |= sent > 0;
                    return Err(err);
                }
            }
        }
        self.partial = false;
        self.writer.flush()
    }

    pub fn flush(&mut self) {
        if let Err(err) = self.writer.flush() {
            log::warn!("pose log {} flush failed: {}", self.label, err);
        }
    }
}

pub fn format_record(pose: &Pose) -> String {
    let t = pose.translation;
    let [qx, qy, qz, qw] = pose.quaternion_xyzw();
    format!(
        "{} {} {} {} {} {} {} {}\n",
        pose.timestamp, t.x, t.y, t.z, qx, qy, qz, qw
    )
}
