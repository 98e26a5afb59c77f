//! Persistent records owned by the order store.
//!
//! Orders and their lines are immutable from the outside: fields are only
//! reachable through accessors, and the store is the only code that builds
//! or updates them.

use chrono::{DateTime, Utc};
use common::{CouponId, Money, OrderId, OrderLineId, OrderStatus, ProductId, UserId, VariantId};
use serde::{Deserialize, Serialize};

/// A purchasable SKU with its own price and stock counter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Variant {
    pub id: VariantId,
    pub product_id: ProductId,
    /// Unit price before any product discount.
    pub price: Money,
    /// Units currently available. Only ledger operations change it.
    pub stock: u32,
    /// Size or attribute label, e.g. "XL".
    pub size: String,
}

/// The purchase-relevant part of a product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub name: String,
    /// Flat amount taken off every variant's price while `on_sale` is set.
    pub discount: Option<Money>,
    pub on_sale: bool,
}

/// A variant together with its parent product, as returned by catalog lookups.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub variant: Variant,
    pub product: Product,
}

/// Shipping and contact details. Opaque to the order engine.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShippingInfo {
    pub recipient_name: String,
    pub phone: String,
    pub address: String,
}

/// A line of a new order, before it is persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewOrderLine {
    pub variant_id: VariantId,
    pub quantity: u32,
    pub price_at_purchase: Money,
}

impl NewOrderLine {
    pub fn new(variant_id: VariantId, quantity: u32, price_at_purchase: Money) -> Self {
        Self {
            variant_id,
            quantity,
            price_at_purchase,
        }
    }

    /// Returns `price_at_purchase * quantity`, or `None` on overflow.
    pub fn subtotal(&self) -> Option<Money> {
        self.price_at_purchase.checked_mul(self.quantity)
    }
}

/// An order ready to be inserted, with its total computed from its lines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewOrder {
    user_id: UserId,
    coupon_id: Option<CouponId>,
    shipping: ShippingInfo,
    payment_expire_at: DateTime<Utc>,
    total_price: Money,
    lines: Vec<NewOrderLine>,
}

impl NewOrder {
    /// Builds a pending order. The total is derived from `lines` and cannot
    /// be supplied separately.
    ///
    /// Returns `None` when the total does not fit in [`Money`].
    pub fn new(
        user_id: UserId,
        coupon_id: Option<CouponId>,
        shipping: ShippingInfo,
        payment_expire_at: DateTime<Utc>,
        lines: Vec<NewOrderLine>,
    ) -> Option<Self> {
        let total_price = lines
            .iter()
            .try_fold(Money::zero(), |total, line| total.checked_add(line.subtotal()?))?;
        Some(Self {
            user_id,
            coupon_id,
            shipping,
            payment_expire_at,
            total_price,
            lines,
        })
    }

    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    pub fn coupon_id(&self) -> Option<CouponId> {
        self.coupon_id
    }

    pub fn shipping(&self) -> &ShippingInfo {
        &self.shipping
    }

    pub fn payment_expire_at(&self) -> DateTime<Utc> {
        self.payment_expire_at
    }

    pub fn total_price(&self) -> Money {
        self.total_price
    }

    pub fn lines(&self) -> &[NewOrderLine] {
        &self.lines
    }
}

/// A persisted order line. Never changes after creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrderLine {
    id: OrderLineId,
    order_id: OrderId,
    variant_id: VariantId,
    quantity: u32,
    price_at_purchase: Money,
}

impl OrderLine {
    pub(crate) fn from_parts(
        id: OrderLineId,
        order_id: OrderId,
        variant_id: VariantId,
        quantity: u32,
        price_at_purchase: Money,
    ) -> Self {
        Self {
            id,
            order_id,
            variant_id,
            quantity,
            price_at_purchase,
        }
    }

    pub fn id(&self) -> OrderLineId {
        self.id
    }

    pub fn order_id(&self) -> OrderId {
        self.order_id
    }

    pub fn variant_id(&self) -> VariantId {
        self.variant_id
    }

    pub fn quantity(&self) -> u32 {
        self.quantity
    }

    /// Unit price snapshot taken when the order was placed.
    pub fn price_at_purchase(&self) -> Money {
        self.price_at_purchase
    }

    pub fn subtotal(&self) -> Option<Money> {
        self.price_at_purchase.checked_mul(self.quantity)
    }
}

/// A persisted order with its lines.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Order {
    id: OrderId,
    user_id: UserId,
    coupon_id: Option<CouponId>,
    status: OrderStatus,
    shipping: ShippingInfo,
    total_price: Money,
    payment_expire_at: DateTime<Utc>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    lines: Vec<OrderLine>,
}

impl Order {
    /// Materializes a freshly inserted order.
    pub(crate) fn from_new(
        id: OrderId,
        new_order: NewOrder,
        line_ids: &[OrderLineId],
        created_at: DateTime<Utc>,
    ) -> Self {
        let lines = new_order
            .lines
            .iter()
            .zip(line_ids)
            .map(|(line, line_id)| {
                OrderLine::from_parts(
                    *line_id,
                    id,
                    line.variant_id,
                    line.quantity,
                    line.price_at_purchase,
                )
            })
            .collect();

        Self {
            id,
            user_id: new_order.user_id,
            coupon_id: new_order.coupon_id,
            status: OrderStatus::Pending,
            shipping: new_order.shipping,
            total_price: new_order.total_price,
            payment_expire_at: new_order.payment_expire_at,
            created_at,
            updated_at: created_at,
            lines,
        }
    }

    #[allow(clippy::too_many_arguments)]
    pub(crate) fn from_parts(
        id: OrderId,
        user_id: UserId,
        coupon_id: Option<CouponId>,
        status: OrderStatus,
        shipping: ShippingInfo,
        total_price: Money,
        payment_expire_at: DateTime<Utc>,
        created_at: DateTime<Utc>,
        updated_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            user_id,
            coupon_id,
            status,
            shipping,
            total_price,
            payment_expire_at,
            created_at,
            updated_at,
            lines: Vec::new(),
        }
    }

    pub(crate) fn push_line(&mut self, line: OrderLine) {
        self.lines.push(line);
    }

    pub(crate) fn set_status(&mut self, status: OrderStatus, at: DateTime<Utc>) {
        self.status = status;
        self.updated_at = at;
    }

    pub fn id(&self) -> OrderId {
        self.id
    }

    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    pub fn coupon_id(&self) -> Option<CouponId> {
        self.coupon_id
    }

    pub fn status(&self) -> OrderStatus {
        self.status
    }

    pub fn shipping(&self) -> &ShippingInfo {
        &self.shipping
    }

    pub fn total_price(&self) -> Money {
        self.total_price
    }

    pub fn payment_expire_at(&self) -> DateTime<Utc> {
        self.payment_expire_at
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    pub fn lines(&self) -> &[OrderLine] {
        &self.lines
    }

    /// Returns true if the order is still unpaid and its grace window has
    /// closed at `now`.
    pub fn is_payment_overdue(&self, now: DateTime<Utc>) -> bool {
        self.status == OrderStatus::Pending && self.payment_expire_at <= now
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn sample_new_order() -> NewOrder {
        NewOrder::new(
            UserId::new(1),
            None,
            ShippingInfo::default(),
            Utc::now() + Duration::minutes(30),
            vec![
                NewOrderLine::new(VariantId::new(1), 2, Money::from_cents(90)),
                NewOrderLine::new(VariantId::new(2), 1, Money::from_cents(250)),
            ],
        )
        .unwrap()
    }

    #[test]
    fn new_order_total_is_sum_of_line_subtotals() {
        assert_eq!(sample_new_order().total_price(), Money::from_cents(430));
    }

    #[test]
    fn new_order_refuses_a_total_that_overflows() {
        let build = |lines| {
            NewOrder::new(
                UserId::new(1),
                None,
                ShippingInfo::default(),
                Utc::now(),
                lines,
            )
        };

        let huge_line = build(vec![NewOrderLine::new(
            VariantId::new(1),
            2_000_000_000,
            Money::from_cents(5_000_000_000),
        )]);
        assert!(huge_line.is_none());

        let huge_sum = build(vec![
            NewOrderLine::new(VariantId::new(1), 1, Money::from_cents(i64::MAX)),
            NewOrderLine::new(VariantId::new(2), 1, Money::from_cents(1)),
        ]);
        assert!(huge_sum.is_none());
    }

    #[test]
    fn from_new_starts_pending_and_keeps_line_snapshots() {
        let created_at = Utc::now();
        let order = Order::from_new(
            OrderId::new(10),
            sample_new_order(),
            &[OrderLineId::new(100), OrderLineId::new(101)],
            created_at,
        );

        assert_eq!(order.status(), OrderStatus::Pending);
        assert_eq!(order.lines().len(), 2);
        assert_eq!(order.lines()[0].order_id(), OrderId::new(10));
        assert_eq!(order.lines()[1].price_at_purchase(), Money::from_cents(250));
        let line_total = order
            .lines()
            .iter()
            .try_fold(Money::zero(), |total, line| total.checked_add(line.subtotal()?));
        assert_eq!(line_total, Some(order.total_price()));
    }

    #[test]
    fn payment_overdue_only_while_pending() {
        let mut order = Order::from_new(
            OrderId::new(1),
            sample_new_order(),
            &[OrderLineId::new(1), OrderLineId::new(2)],
            Utc::now(),
        );
        let later = order.payment_expire_at() + Duration::seconds(1);

        assert!(order.is_payment_overdue(order.payment_expire_at()));
        assert!(order.is_payment_overdue(later));
        assert!(!order.is_payment_overdue(order.created_at()));

        order.set_status(OrderStatus::Paid, later);
        assert!(!order.is_payment_overdue(later));
    }
}
