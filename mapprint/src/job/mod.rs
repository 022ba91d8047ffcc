//! Job identity, status and snapshots.
//!
//! A job is one print request's full lifecycle. Its id comes from an
//! injectable [`JobSequence`] rather than a process global, so several
//! orchestrators in one process never collide and tests can start sequences
//! wherever they like. Ids are strictly increasing within a sequence and
//! are never reused.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::spec::PrintSpec;

/// Progress value emitted for non-final snapshots never reaches 1:
/// `progress == 1` holds exactly for the finished snapshot, even when the
/// rounded mean of nearly-complete layers would round up.
pub const MAX_ONGOING_PROGRESS: f64 = 0.9999;

/// Identifier of one print job, unique per sequence for the process
/// lifetime.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct JobId(u64);

impl JobId {
    /// Creates a job id from a raw value.
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Returns the raw id value.
    pub fn value(self) -> u64 {
        self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Monotonic, thread-safe job id allocator.
///
/// Clones share the same underlying counter.
#[derive(Debug, Clone, Default)]
pub struct JobSequence {
    next: Arc<AtomicU64>,
}

impl JobSequence {
    /// Creates a sequence starting at 0.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a sequence starting at `first`.
    pub fn starting_at(first: u64) -> Self {
        Self {
            next: Arc::new(AtomicU64::new(first)),
        }
    }

    /// Allocates the next id.
    pub fn next_id(&self) -> JobId {
        JobId(self.next.fetch_add(1, Ordering::Relaxed))
    }
}

/// Lifecycle state of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    /// Created, no layer has reported yet.
    Pending,
    /// At least one layer has reported and the job is below full progress.
    Ongoing,
    /// All layers complete, artifact present. Terminal.
    Finished,
    /// Cancelled before completion, partial state discarded. Terminal.
    Cancelled,
}

/// One point-in-time view of a job, emitted on its status stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobStatusSnapshot {
    /// Job id.
    pub id: JobId,
    /// The originating spec, retained verbatim.
    pub spec: PrintSpec,
    /// Fraction complete in `[0, 1]`, non-decreasing across snapshots.
    pub progress: f64,
    /// Lifecycle state.
    pub status: JobStatus,
    /// True once any layer failed irrecoverably; the job will stall below
    /// full progress.
    #[serde(default)]
    pub stalled: bool,
    /// The encoded artifact; present iff `status` is `Finished`. Raster
    /// bytes are not serialized, transports move them out of band.
    #[serde(skip)]
    pub artifact: Option<Bytes>,
}

impl JobStatusSnapshot {
    /// The snapshot a job is born with.
    pub fn pending(id: JobId, spec: PrintSpec) -> Self {
        Self {
            id,
            spec,
            progress: 0.0,
            status: JobStatus::Pending,
            stalled: false,
            artifact: None,
        }
    }

    /// Whether this snapshot is a terminal one (no further snapshots will
    /// be emitted for the job).
    pub fn is_terminal(&self) -> bool {
        matches!(self.status, JobStatus::Finished | JobStatus::Cancelled)
    }
}

/// Rounds a progress fraction to 4 decimal digits.
pub fn round_progress(progress: f64) -> f64 {
    (progress * 10_000.0).round() / 10_000.0
}

/// Aggregates per-layer progress into job progress: the unweighted
/// arithmetic mean rounded to 4 decimals, capped below 1 so only the
/// finished snapshot ever reports full progress.
pub fn aggregate_progress(layer_progress: &[f64]) -> f64 {
    if layer_progress.is_empty() {
        return 0.0;
    }
    let mean = layer_progress.iter().sum::<f64>() / layer_progress.len() as f64;
    round_progress(mean).min(MAX_ONGOING_PROGRESS)
}
