use serde::{Deserialize, Serialize};

/// Point-in-time counts across a backend's jobs, broken down by status.
/// Used by the worker pool's health reporting and by the freshness
/// trigger to decide whether a stage is backed up before firing more work.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueStats {
    pub pending: u64,
    pub processing: u64,
    pub retrying: u64,
    pub completed: u64,
    pub failed: u64,
}

impl QueueStats {
    pub fn total(&self) -> u64 {
        self.pending + self.processing + self.retrying + self.completed + self.failed
    }

    pub fn in_flight(&self) -> u64 {
        self.pending + self.processing + self.retrying
    }
}
