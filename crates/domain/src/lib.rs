//! Order lifecycle layer of the storefront.
//!
//! This crate turns checkout requests into persisted orders and governs
//! everything that happens to an order afterwards:
//! - checkout validation, pricing and the atomic stock decrement
//! - the status state machine and who may drive it
//! - cancellation with stock restoration
//! - the queries used by the expiration sweep

pub mod error;
pub mod order;

pub use error::DomainError;
pub use order::{
    CreateOrder, OrderDetails, OrderError, OrderLineRequest, OrderService, OrderServiceConfig,
    StatusChange, check_transition, unit_price,
};
