//! Typed dispatch of polled samples.
//!
//! The dispatcher is a pure classifier: it inspects the variant of each sample,
//! validates the payload and decides whether the running pipeline consumes it.
//! Samples the pipeline does not use, and samples whose payload is corrupt, are
//! discarded. Discarding is normal flow control; the loop moves on to the next
//! poll.

use crate::pipeline::PipelineMode;
use crate::sample::{InertialSample, Sample, SampleKind, StereoSample, Vec3};

#[derive(Debug)]
pub enum Route {
    /// Feed the pipeline and present the result.
    Stereo(StereoSample),
    /// Feed the pipeline only (SLAM mode).
    Inertial(InertialSample),
    Discard(Discard),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Discard {
    /// Valid sample of a variant the pipeline does not consume.
    NotConsumed(SampleKind),
    /// Payload failed validation.
    Corrupt(&'static str),
}

#[derive(Clone, Copy, Debug)]
pub struct Dispatcher {
    mode: PipelineMode,
}

impl Dispatcher {
    pub fn new(mode: PipelineMode) -> Self {
        Self { mode }
    }

    pub fn mode(&self) -> PipelineMode {
        self.mode
    }

    pub fn dispatch(&self, sample: Sample) -> Route {
        match sample {
            Sample::Stereo(stereo) => match validate_stereo(&stereo) {
                Ok(()) => Route::Stereo(stereo),
                Err(reason) => Route::Discard(Discard::Corrupt(reason)),
            },
            Sample::Inertial(imu) => {
                if !self.mode.consumes_inertial() {
                    return Route::Discard(Discard::NotConsumed(SampleKind::Inertial));
                }
                if !is_finite(&imu.linear_accel) || !is_finite(&imu.angular_velocity) {
                    return Route::Discard(Discard::Corrupt("non-finite inertial reading"));
                }
                Route::Inertial(imu)
            }
        }
    }
}

fn is_finite(v: &Vec3) -> bool {
    v.iter().all(|c| c.is_finite())
}

fn validate_stereo(stereo: &StereoSample) -> Result<(), &'static str> {
    if !stereo.left.is_well_formed() {
        return Err("malformed left image");
    }
    if !stereo.right.is_well_formed() {
        return Err("malformed right image");
    }
    if stereo.left.width != stereo.right.width || stereo.left.height != stereo.right.height {
        return Err("left/right size mismatch");
    }
    if let Some(depth) = &stereo.depth {
        if !depth.is_well_formed() {
            return Err("malformed depth image");
        }
    }
    Ok(())
}
