//! Error taxonomy for the BGP orchestrator.

use crate::domain::Conflict;
use thiserror::Error;

/// Closed error union returned by every public operation.
///
/// Every component boundary translates its failure modes into one of these
/// variants rather than letting an implementation-specific error escape.
#[derive(Error, Debug)]
pub enum BgpError {
    /// Malformed input, uniqueness violation, or invariant breach.
    #[error("validation error: {0}")]
    Validation(String),

    /// One or more detection rules produced a conflict.
    #[error("{} conflict(s) detected", .0.len())]
    Conflict(Vec<Conflict>),

    /// The id references a deleted or nonexistent record.
    #[error("not found: {0}")]
    NotFound(String),

    /// An essential external dependency is down or its circuit is open.
    #[error("unavailable: {0}")]
    Unavailable(String),

    /// Unexpected failure; logged with a correlation id upstream.
    #[error("internal error: {0}")]
    Internal(String),
}

/// Result type for the BGP orchestrator.
pub type BgpResult<T> = Result<T, BgpError>;
