//! Order checkout, pricing and status transitions.

mod commands;
mod details;
mod pricing;
mod service;
mod transition;

pub use commands::{CreateOrder, OrderLineRequest};
pub use details::OrderDetails;
pub use pricing::unit_price;
pub use service::{OrderService, OrderServiceConfig};
pub use transition::{StatusChange, check_transition};

use common::{Money, OrderStatus, ParseStatusError, VariantId};
use thiserror::Error;

/// Errors raised by the order rules themselves, before or without touching the store.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OrderError {
    /// The checkout request has no lines.
    #[error("no item in order")]
    EmptyOrder,

    /// A line asked for zero units.
    #[error("invalid quantity for variant {variant_id}: must be greater than 0")]
    InvalidQuantity { variant_id: VariantId },

    /// The status change is not in the transition table.
    #[error("invalid status transition from {from} to {to}")]
    InvalidTransition { from: OrderStatus, to: OrderStatus },

    /// A status string outside the known set.
    #[error("unknown order status: {0:?}")]
    UnknownStatus(String),

    /// The order total does not fit in a money amount.
    #[error("order total is out of range")]
    TotalOutOfRange,

    /// The product discount is larger than the variant's price.
    #[error("discount {discount} exceeds price {price} of variant {variant_id}")]
    DiscountExceedsPrice {
        variant_id: VariantId,
        price: Money,
        discount: Money,
    },
}

impl OrderError {
    pub(crate) fn kind(&self) -> &'static str {
        match self {
            OrderError::EmptyOrder => "empty_order",
            OrderError::InvalidQuantity { .. } => "invalid_quantity",
            OrderError::InvalidTransition { .. } => "invalid_transition",
            OrderError::UnknownStatus(_) => "unknown_status",
            OrderError::TotalOutOfRange => "total_out_of_range",
            OrderError::DiscountExceedsPrice { .. } => "discount_exceeds_price",
        }
    }
}

impl From<ParseStatusError> for OrderError {
    fn from(err: ParseStatusError) -> Self {
        OrderError::UnknownStatus(err.0)
    }
}
