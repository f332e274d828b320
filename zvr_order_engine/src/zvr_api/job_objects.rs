use serde::{Deserialize, Serialize};

/// The result of asking a background job to run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", content = "result", rename_all = "snake_case")]
pub enum JobOutcome<T> {
    Completed(T),
    /// The job did not run, e.g. because another worker holds its lease.
    Skipped(String),
}

impl<T> JobOutcome<T> {
    pub fn completed(self) -> Option<T> {
        match self {
            JobOutcome::Completed(t) => Some(t),
            JobOutcome::Skipped(_) => None,
        }
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self, JobOutcome::Skipped(_))
    }
}

/// Result of one payment sync sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncSummary {
    pub checked: usize,
    /// Payments whose status changed as a result of the poll.
    pub applied: usize,
    pub late_settlements: usize,
    /// Payments expired locally after their gateway expiry time had passed.
    pub expired: usize,
    pub failed: usize,
}
