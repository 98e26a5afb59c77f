//! Order commands.

use common::{CouponId, UserId, VariantId};
use order_store::ShippingInfo;
use serde::{Deserialize, Serialize};

use super::OrderError;

/// One requested line of a checkout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderLineRequest {
    pub variant_id: VariantId,
    pub quantity: u32,
}

impl OrderLineRequest {
    pub fn new(variant_id: VariantId, quantity: u32) -> Self {
        Self {
            variant_id,
            quantity,
        }
    }
}

/// Command to place a new order.
#[derive(Debug, Clone)]
pub struct CreateOrder {
    /// The user placing the order.
    pub user_id: UserId,

    /// Coupon attached to the order. Recorded, not priced.
    pub coupon_id: Option<CouponId>,

    /// Requested lines, in request order.
    pub lines: Vec<OrderLineRequest>,

    /// Shipping and contact details.
    pub shipping: ShippingInfo,
}

impl CreateOrder {
    /// Creates a new CreateOrder command with no coupon.
    pub fn new(user_id: UserId, lines: Vec<OrderLineRequest>, shipping: ShippingInfo) -> Self {
        Self {
            user_id,
            coupon_id: None,
            lines,
            shipping,
        }
    }

    /// Attaches a coupon.
    pub fn with_coupon(mut self, coupon_id: CouponId) -> Self {
        self.coupon_id = Some(coupon_id);
        self
    }

    /// Validates the requested lines and merges repeated variants.
    ///
    /// Quantities of a variant that appears more than once are summed, and
    /// the merged line keeps the position of its first occurrence.
    pub fn merged_lines(&self) -> Result<Vec<OrderLineRequest>, OrderError> {
        if self.lines.is_empty() {
            return Err(OrderError::EmptyOrder);
        }

        let mut merged: Vec<OrderLineRequest> = Vec::with_capacity(self.lines.len());
        for line in &self.lines {
            if line.quantity == 0 {
                return Err(OrderError::InvalidQuantity {
                    variant_id: line.variant_id,
                });
            }

            match merged.iter_mut().find(|m| m.variant_id == line.variant_id) {
                Some(existing) => {
                    existing.quantity = existing.quantity.checked_add(line.quantity).ok_or(
                        OrderError::InvalidQuantity {
                            variant_id: line.variant_id,
                        },
                    )?;
                }
                None => merged.push(*line),
            }
        }

        Ok(merged)
    }
}
