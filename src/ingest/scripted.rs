//! Scripted frame source.
//!
//! Plays back a fixed list of poll results, then reports `NotReady` forever.
//! Used to drive sessions deterministically in tests and fixtures.

use anyhow::{anyhow, Result};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use super::{FrameSource, Polled};
use crate::sample::Sample;

/// Shared count of underlying `stop` calls.
#[derive(Clone, Debug, Default)]
pub struct StopCounter(Arc<AtomicUsize>);

impl StopCounter {
    pub fn count(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }

    fn bump(&self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }
}

pub struct ScriptedSource {
    script: VecDeque<Polled>,
    fail_start: bool,
    stops: Option<StopCounter>,
}

impl ScriptedSource {
    pub fn new(script: Vec<Polled>) -> Self {
        Self {
            script: script.into(),
            fail_start: false,
            stops: None,
        }
    }

    /// Build a script of ready samples.
    pub fn from_samples(samples: impl IntoIterator<Item = Sample>) -> Self {
        Self::new(samples.into_iter().map(Polled::Ready).collect())
    }

    pub fn with_stop_counter(mut self, counter: StopCounter) -> Self {
        self.stops = Some(counter);
        self
    }

    /// Make `start` fail, as a missing device would.
    pub fn failing_start(mut self) -> Self {
        self.fail_start = true;
        self
    }

    pub fn remaining(&self) -> usize {
        self.script.len()
    }
}

impl FrameSource for ScriptedSource {
    fn name(&self) -> &str {
        "scripted"
    }

    fn start(&mut self) -> Result<()> {
        if self.fail_start {
            return Err(anyhow!("scripted device not present"));
        }
        Ok(())
    }

    fn stop(&mut self) {
        if let Some(stops) = &self.stops {
            stops.bump();
        }
    }

    fn poll(&mut self) -> Polled {
        self.script.pop_front().unwrap_or(Polled::NotReady)
    }
}
