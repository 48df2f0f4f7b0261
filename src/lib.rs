//! Stereo-inertial streaming loop (vio-stream)
//!
//! Drives a stereo + IMU device through a perception pipeline: samples are
//! polled without blocking, dispatched by variant, fed to the pipeline, and
//! the resulting pose is logged and handed to a presenter.
//!
//! # Architecture
//!
//! - One owned `DeviceHandle` per session; stopping it is idempotent.
//! - `Sample` is a sum type and dispatch matches it exhaustively.
//! - Stop requests (keypress, Ctrl-C) only set a `StopToken`; the session
//!   runs the stop sequence itself, exactly once.
//! - Pipeline results are published as whole `StateSnapshot`s, so readers on
//!   other threads never see a half-updated state.
//! - Presentation runs on its own thread and drops frames rather than
//!   stalling ingestion.
//!
//! # Module Structure
//!
//! - `sample`, `pose`: data model
//! - `ingest`: frame sources (synthetic, replay, scripted) and `DeviceHandle`
//! - `dispatch`: variant routing
//! - `pipeline`: pipeline contract, reference pipelines, snapshots
//! - `session`: consumption loop and lifecycle
//! - `pose_log`, `present`, `record`: sinks
//! - `shutdown`: stop token, interrupt handler, key watcher
//! - `config`, `app`: layered configuration and the shared binary launch path

pub mod app;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod ingest;
pub mod pipeline;
pub mod pose;
pub mod pose_log;
pub mod present;
pub mod record;
pub mod sample;
pub mod session;
pub mod shutdown;

pub use config::StreamConfig;
pub use dispatch::{Discard, Dispatcher, Route};
pub use error::{StartupError, EXIT_STARTUP_FAILURE};
pub use ingest::{
    open_device, DeviceConfig, DeviceHandle, DeviceMode, DeviceState, FrameSource, Polled,
};
pub use pipeline::{
    Calibration, FeatureOptions, FeaturePipeline, FeatureSet, InertialOdometry, OdometryOptions,
    Pipeline, PipelineMode, SnapshotHandle, StateSnapshot, ViewerPipeline,
};
pub use pose::Pose;
pub use pose_log::{PoseLog, DEFAULT_POSE_LOG_PATH};
pub use present::{ConsolePresenter, PresentFrame, Presenter, RenderWorker};
pub use record::{RecordSink, RecordWorker, Recorder, RecordingSummary};
pub use sample::{
    DepthImage, Image, InertialSample, Sample, SampleKind, StereoSample, Timestamp, Vec3,
};
pub use session::{
    ExitReason, Session, SessionBuilder, SessionOptions, SessionReport, SessionState,
    SessionStats, StepOutcome,
};
pub use shutdown::{StopReason, StopToken, EXIT_INTERRUPTED};
