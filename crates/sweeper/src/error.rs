//! Sweep error types.

use domain::DomainError;
use thiserror::Error;

/// Errors that abort a whole sweep.
///
/// Failures of individual orders are not errors: they are counted in the
/// sweep report and retried on the next tick.
#[derive(Debug, Error)]
pub enum SweepError {
    /// The query for overdue orders failed.
    #[error("failed to query expired orders: {0}")]
    Query(#[source] DomainError),
}

/// Result type for sweep operations.
pub type Result<T> = std::result::Result<T, SweepError>;
