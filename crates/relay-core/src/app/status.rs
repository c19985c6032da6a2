use serde::{Deserialize, Serialize};

/// Number of events in each status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventCounts {
    pub pending: usize,
    pub processing: usize,
    pub completed: usize,
    pub failed: usize,
}

impl EventCounts {
    pub fn total(&self) -> usize {
        self.pending + self.processing + self.completed + self.failed
    }

    /// Nothing left for a worker to pick up or finish.
    pub fn is_settled(&self) -> bool {
        self.pending == 0 && self.processing == 0
    }
}
