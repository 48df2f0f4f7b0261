//! Snapshot-consistent view of pipeline results for readers on other threads.
//!
//! The session is the only writer. It publishes a complete `StateSnapshot`
//! after each accepted update, replacing the previous one in a single
//! assignment under the lock, so a reader sees the results of exactly one
//! update cycle.

use std::sync::{Arc, RwLock};

use super::FeatureSet;
use crate::pose::Pose;
use crate::sample::Timestamp;

#[derive(Clone, Debug, Default)]
pub struct StateSnapshot {
    /// Number of accepted updates folded into this snapshot.
    pub update_count: u64,
    pub timestamp: Option<Timestamp>,
    pub pose: Option<Pose>,
    pub features: Option<Arc<FeatureSet>>,
}

#[derive(Clone, Debug, Default)]
pub struct SnapshotHandle {
    inner: Arc<RwLock<StateSnapshot>>,
}

impl SnapshotHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn publish(&self, snapshot: StateSnapshot) {
        // A poisoned lock still holds a whole snapshot; writes are single assignments.
        let mut guard = self.inner.write().unwrap_or_else(|e| e.into_inner());
        *guard = snapshot;
    }

    pub fn latest(&self) -> StateSnapshot {
        self.inner.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn pose(&self) -> Option<Pose> {
        self.inner.read().unwrap_or_else(|e| e.into_inner()).pose
    }

    pub fn update_count(&self) -> u64 {
        self.inner.read().unwrap_or_else(|e| e.into_inner()).update_count
    }
}
