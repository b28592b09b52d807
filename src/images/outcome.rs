// ABOUTME: Aggregated batch results for delete and push requests.
// ABOUTME: BatchStatus encodes the success / partial / error rule.

use serde::Serialize;

use crate::classify::StructuredError;

/// Tri-state result of a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BatchStatus {
    Success,
    Partial,
    Error,
}

impl BatchStatus {
    /// Status for a batch of `requested` items with `succeeded` completed
    /// items and `failed` recorded errors.
    ///
    /// Errors decide first: none recorded is a success, however little was
    /// done. An empty request is an error.
    pub fn from_counts(requested: usize, succeeded: usize, failed: usize) -> Self {
        match (requested, succeeded, failed) {
            (0, _, _) => BatchStatus::Error,
            (_, _, 0) => BatchStatus::Success,
            (_, 0, _) => BatchStatus::Error,
            _ => BatchStatus::Partial,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            BatchStatus::Success => "success",
            BatchStatus::Partial => "partial",
            BatchStatus::Error => "error",
        }
    }
}

impl std::fmt::Display for BatchStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of a delete batch.
#[derive(Debug, Clone, Serialize)]
pub struct DeleteReport {
    pub status: BatchStatus,
    /// Removed ids, in attempt order.
    pub deleted: Vec<String>,
    /// Inspection and removal failures, in the order they happened.
    pub errors: Vec<StructuredError>,
    pub total_count: usize,
    /// Bytes freed, as far as post-removal inspection could tell.
    pub deleted_size: u64,
    /// Bytes of every image that could be inspected before removal.
    pub total_size: u64,
}

/// Outcome of a push batch.
#[derive(Debug, Clone, Serialize)]
pub struct PushReport {
    pub status: BatchStatus,
    /// Tags pushed without an error, in push order.
    pub pushed: Vec<String>,
    pub errors: Vec<StructuredError>,
    /// Number of image ids requested.
    pub total_count: usize,
}
