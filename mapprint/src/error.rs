//! Crate-wide error types.
//!
//! Failures that reject a print request (`InvalidSpec`, `UnknownProjection`)
//! are raised before any job exists. Failures after job creation never abort
//! the job directly: a layer that cannot load stalls its job below full
//! progress, reported through the snapshot stall flag rather than an error.

use thiserror::Error;

use crate::job::JobId;

/// Errors surfaced by the print orchestrator.
#[derive(Debug, Error)]
pub enum PrintError {
    /// The projection code could not be resolved and no usable inline
    /// definition was supplied, or the supplied definition failed to parse.
    #[error("unknown projection: {0}")]
    UnknownProjection(String),

    /// The print spec failed validation (empty layer list, non-positive
    /// size, out-of-range opacity).
    #[error("invalid print spec: {0}")]
    InvalidSpec(String),

    /// A layer's underlying resource or tile fetches failed irrecoverably.
    #[error("layer {index} failed to load: {reason}")]
    LayerLoadFailed {
        /// Index of the failed layer within the spec.
        index: usize,
        /// Human-readable failure description.
        reason: String,
    },

    /// The channel between the requester and the print daemon is severed.
    #[error("status channel error: {0}")]
    ChannelError(String),

    /// The job was cancelled before producing an artifact.
    #[error("print job {0} was cancelled")]
    Cancelled(JobId),

    /// No job with the given id exists in the registry.
    #[error("unknown job id: {0}")]
    UnknownJob(JobId),
}
