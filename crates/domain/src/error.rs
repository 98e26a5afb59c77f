//! Domain error types.

use common::{OrderId, VariantId};
use order_store::StoreError;
use thiserror::Error;

use crate::order::OrderError;

/// Errors that can occur during domain operations.
#[derive(Debug, Error)]
pub enum DomainError {
    /// The request or transition was rejected by the order rules.
    #[error(transparent)]
    Order(#[from] OrderError),

    /// The catalog lookup itself failed.
    #[error("variant lookup failed: {0}")]
    VariantLookupFailed(#[source] StoreError),

    /// A line asked for more units than the variant has left.
    #[error(
        "insufficient stock for variant {variant_id}: requested {requested}, available {available}"
    )]
    InsufficientStock {
        variant_id: VariantId,
        requested: u32,
        available: u32,
    },

    /// No order with this id exists.
    #[error("order not found: {0}")]
    OrderNotFound(OrderId),

    /// The acting user does not own the order.
    #[error("unauthorized to update this order")]
    Forbidden,

    /// The caller did not supply an order id.
    #[error("no order id")]
    MissingOrderId,

    /// Stored or catalog data contradicts itself, e.g. a requested variant is gone.
    #[error("data integrity error: {0}")]
    DataIntegrity(String),

    /// The order store failed.
    #[error("persistence error: {0}")]
    Persistence(#[source] StoreError),
}

impl DomainError {
    /// Short machine-readable label, used for metric labels and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            DomainError::Order(e) => e.kind(),
            DomainError::VariantLookupFailed(_) => "variant_lookup_failed",
            DomainError::InsufficientStock { .. } => "insufficient_stock",
            DomainError::OrderNotFound(_) => "order_not_found",
            DomainError::Forbidden => "forbidden",
            DomainError::MissingOrderId => "missing_order_id",
            DomainError::DataIntegrity(_) => "data_integrity",
            DomainError::Persistence(_) => "persistence",
        }
    }

    /// Returns true for errors caused by the caller's input rather than by
    /// the state of the system.
    pub fn is_input_error(&self) -> bool {
        matches!(
            self,
            DomainError::MissingOrderId
                | DomainError::Order(
                    OrderError::EmptyOrder
                        | OrderError::InvalidQuantity { .. }
                        | OrderError::UnknownStatus(_)
                        | OrderError::TotalOutOfRange
                )
        )
    }
}

impl From<StoreError> for DomainError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::InsufficientStock {
                variant_id,
                requested,
                available,
            } => DomainError::InsufficientStock {
                variant_id,
                requested,
                available,
            },
            StoreError::VariantNotFound(variant_id) => {
                DomainError::DataIntegrity(format!("variant {variant_id} does not exist"))
            }
            StoreError::OrderNotFound(order_id) => DomainError::OrderNotFound(order_id),
            other => DomainError::Persistence(other),
        }
    }
}
