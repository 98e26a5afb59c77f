//! Shared types for the storefront order engine.
//!
//! Everything in here is plain data used by every other crate: typed
//! identifiers, [`Money`] and the [`OrderStatus`] state machine.

pub mod money;
pub mod status;
pub mod types;

pub use money::Money;
pub use status::{OrderStatus, ParseStatusError};
pub use types::{CouponId, OrderId, OrderLineId, ProductId, UserId, VariantId};
