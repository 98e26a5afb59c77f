pub mod admin;
pub mod ops;
pub mod orders;
pub mod webhooks;

use common::OrderId;

use crate::error::ApiError;

/// Parses an order id path segment.
///
/// A non-positive id counts as absent and is reported by the service as a
/// missing order id.
fn parse_order_id(id: &str) -> Result<Option<OrderId>, ApiError> {
    let raw: i64 = id
        .trim()
        .parse()
        .map_err(|_| ApiError::BadRequest(format!("invalid order id: {id:?}")))?;
    Ok(OrderId::from_raw(raw))
}
