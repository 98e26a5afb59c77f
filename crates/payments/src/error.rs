//! Reconciliation error types.

use domain::DomainError;
use thiserror::Error;

/// Errors that can occur while reconciling a payment event.
#[derive(Debug, Error)]
pub enum ReconcileError {
    /// The payload could not be decoded or lacks the order reference.
    #[error("malformed payment event: {0}")]
    MalformedEvent(String),

    /// Applying the event to the order failed.
    #[error(transparent)]
    Domain(#[from] DomainError),
}

/// Convenience type alias for reconciliation results.
pub type Result<T> = std::result::Result<T, ReconcileError>;
