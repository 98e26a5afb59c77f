//! Order service: the entry points of the order lifecycle.

use std::collections::HashMap;
use std::time::Instant;

use chrono::{DateTime, Duration, Utc};
use common::{OrderId, OrderStatus, UserId, VariantId};
use order_store::{
    Catalog, CatalogEntry, NewOrder, NewOrderLine, Order, OrderQuery, OrderStore, OrderStoreExt,
    OrderTransaction,
};

use super::{CreateOrder, OrderDetails, OrderError, StatusChange, check_transition, unit_price};
use crate::error::DomainError;

type Result<T> = std::result::Result<T, DomainError>;

/// Tunables of the order service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrderServiceConfig {
    /// Time after creation during which payment must land.
    pub payment_grace: Duration,
}

impl OrderServiceConfig {
    /// Default payment grace window, in seconds.
    pub const DEFAULT_PAYMENT_GRACE_SECS: i64 = 30 * 60;

    /// Sets the payment grace window.
    pub fn with_payment_grace(mut self, payment_grace: Duration) -> Self {
        self.payment_grace = payment_grace;
        self
    }
}

impl Default for OrderServiceConfig {
    fn default() -> Self {
        Self {
            payment_grace: Duration::seconds(Self::DEFAULT_PAYMENT_GRACE_SECS),
        }
    }
}

/// Who is driving a status change.
#[derive(Debug, Clone, Copy)]
enum Actor {
    /// The owning user, from the storefront.
    Owner(UserId),
    /// The payment webhook, acting for the user named in the event.
    Webhook(UserId),
    /// An administrator; no ownership check.
    Admin,
}

impl Actor {
    fn required_owner(&self) -> Option<UserId> {
        match self {
            Actor::Owner(user_id) | Actor::Webhook(user_id) => Some(*user_id),
            Actor::Admin => None,
        }
    }

    fn tolerates_replay(&self) -> bool {
        matches!(self, Actor::Webhook(_))
    }
}

/// Service for managing orders.
///
/// Owns the order store and the catalog. Every write runs in one store
/// transaction; a failure anywhere drops the transaction, which rolls back
/// every stock change and order write made so far.
pub struct OrderService<S, C> {
    store: S,
    catalog: C,
    config: OrderServiceConfig,
}

impl<S: OrderStore, C: Catalog> OrderService<S, C> {
    /// Creates a new order service with the default configuration.
    pub fn new(store: S, catalog: C) -> Self {
        Self::with_config(store, catalog, OrderServiceConfig::default())
    }

    /// Creates a new order service.
    pub fn with_config(store: S, catalog: C, config: OrderServiceConfig) -> Self {
        Self {
            store,
            catalog,
            config,
        }
    }

    /// Returns a reference to the underlying order store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Places an order.
    ///
    /// Validates and merges the requested lines, prices them from the catalog,
    /// then decrements stock and inserts the pending order in one transaction.
    #[tracing::instrument(skip(self, cmd), fields(user_id = %cmd.user_id, lines = cmd.lines.len()))]
    pub async fn create_order(&self, cmd: CreateOrder) -> Result<OrderDetails> {
        let started = Instant::now();
        let result = self.place_order(cmd).await;

        match &result {
            Ok(details) => {
                metrics::counter!("orders_created_total").increment(1);
                metrics::histogram!("order_checkout_duration_seconds")
                    .record(started.elapsed().as_secs_f64());
                tracing::info!(
                    order_id = %details.order.id(),
                    total = %details.order.total_price(),
                    "order created"
                );
            }
            Err(err) => {
                metrics::counter!("orders_checkout_rejected_total", "reason" => err.kind())
                    .increment(1);
                tracing::warn!(reason = err.kind(), error = %err, "checkout rejected");
            }
        }

        result
    }

    async fn place_order(&self, cmd: CreateOrder) -> Result<OrderDetails> {
        let lines = cmd.merged_lines()?;

        let variant_ids: Vec<VariantId> = lines.iter().map(|l| l.variant_id).collect();
        let entries = self
            .catalog
            .find_variants(&variant_ids)
            .await
            .map_err(DomainError::VariantLookupFailed)?;
        let by_id: HashMap<VariantId, &CatalogEntry> =
            entries.iter().map(|e| (e.variant.id, e)).collect();

        let mut priced = Vec::with_capacity(lines.len());
        for line in &lines {
            let entry = by_id.get(&line.variant_id).ok_or_else(|| {
                DomainError::DataIntegrity(format!("variant {} does not exist", line.variant_id))
            })?;
            priced.push(NewOrderLine::new(
                line.variant_id,
                line.quantity,
                unit_price(entry)?,
            ));
        }

        let mut tx = self.store.begin().await?;
        let movements = ledger_order(lines.iter().map(|l| (l.variant_id, l.quantity)));
        for (variant_id, quantity) in movements {
            tx.decrement_stock(variant_id, quantity).await?;
        }

        let new_order = NewOrder::new(
            cmd.user_id,
            cmd.coupon_id,
            cmd.shipping,
            Utc::now() + self.config.payment_grace,
            priced,
        )
        .ok_or(OrderError::TotalOutOfRange)?;
        let order = tx.insert_order(new_order).await?;
        tx.commit().await?;

        // Committed: nothing below may turn the checkout into a failure.
        let order_id = order.id();
        let order = match self.store.find_order(order_id).await {
            Ok(Some(stored)) => stored,
            Ok(None) => order,
            Err(err) => {
                tracing::warn!(%order_id, error = %err, "re-reading placed order failed");
                order
            }
        };

        let variant_ids: Vec<VariantId> = order.lines().iter().map(|l| l.variant_id()).collect();
        let details = match self.catalog.find_variants(&variant_ids).await {
            Ok(entries) => OrderDetails::new(order, &entries),
            Err(err) => {
                tracing::warn!(%order_id, error = %err, "catalog enrichment of placed order failed");
                OrderDetails::new(order, &[])
            }
        };
        Ok(details)
    }

    /// Loads an order owned by `user_id`.
    #[tracing::instrument(skip(self))]
    pub async fn get_order_by_id(
        &self,
        order_id: Option<OrderId>,
        user_id: UserId,
    ) -> Result<OrderDetails> {
        let order_id = order_id.ok_or(DomainError::MissingOrderId)?;
        let order = self
            .store
            .find_order(order_id)
            .await?
            .ok_or(DomainError::OrderNotFound(order_id))?;

        if order.user_id() != user_id {
            return Err(DomainError::Forbidden);
        }

        let mut details = self.enrich(vec![order]).await?;
        details.pop().ok_or(DomainError::OrderNotFound(order_id))
    }

    /// Lists every order of a user.
    #[tracing::instrument(skip(self))]
    pub async fn get_all_orders_by_user(&self, user_id: UserId) -> Result<Vec<OrderDetails>> {
        let orders = self.store.find_orders(OrderQuery::for_user(user_id)).await?;
        self.enrich(orders).await
    }

    /// Lists every order.
    #[tracing::instrument(skip(self))]
    pub async fn get_all_orders_admin(&self) -> Result<Vec<OrderDetails>> {
        let orders = self.store.find_orders(OrderQuery::new()).await?;
        self.enrich(orders).await
    }

    /// Changes the status of an order on behalf of its owner.
    #[tracing::instrument(skip(self))]
    pub async fn update_status_by_user(
        &self,
        user_id: UserId,
        order_id: Option<OrderId>,
        status: OrderStatus,
    ) -> Result<StatusChange> {
        let order_id = order_id.ok_or(DomainError::MissingOrderId)?;
        self.transition(order_id, status, Actor::Owner(user_id))
            .await
    }

    /// Changes the status of an order from a payment webhook.
    ///
    /// Same rules as [`Self::update_status_by_user`], except that an order
    /// which already reached `status` is reported with `applied == false`
    /// instead of failing, so redelivered events are harmless.
    #[tracing::instrument(skip(self))]
    pub async fn update_status_order(
        &self,
        order_id: Option<OrderId>,
        status: OrderStatus,
        user_id: UserId,
    ) -> Result<StatusChange> {
        let order_id = order_id.ok_or(DomainError::MissingOrderId)?;
        self.transition(order_id, status, Actor::Webhook(user_id))
            .await
    }

    /// Changes the status of any order.
    #[tracing::instrument(skip(self))]
    pub async fn update_status_by_admin(
        &self,
        order_id: Option<OrderId>,
        status: OrderStatus,
    ) -> Result<StatusChange> {
        let order_id = order_id.ok_or(DomainError::MissingOrderId)?;
        self.transition(order_id, status, Actor::Admin).await
    }

    /// Cancels an order and returns its units to stock.
    #[tracing::instrument(skip(self))]
    pub async fn cancel_order_and_restore_stock(
        &self,
        order_id: Option<OrderId>,
    ) -> Result<StatusChange> {
        let order_id = order_id.ok_or(DomainError::MissingOrderId)?;
        self.transition(order_id, OrderStatus::Cancel, Actor::Admin)
            .await
    }

    /// Physically removes an order and its lines. Stock is not restored.
    #[tracing::instrument(skip(self))]
    pub async fn delete_order(&self, order_id: Option<OrderId>) -> Result<()> {
        let order_id = order_id.ok_or(DomainError::MissingOrderId)?;

        if !self.store.delete_order(order_id).await? {
            return Err(DomainError::OrderNotFound(order_id));
        }

        tracing::info!(%order_id, "order deleted");
        Ok(())
    }

    /// Returns unpaid orders whose grace window closed at or before `now`.
    pub async fn expired_pending_orders(&self, now: DateTime<Utc>) -> Result<Vec<Order>> {
        Ok(self.store.find_pending_expired(now).await?)
    }

    /// Cancels one overdue order and restores its stock.
    ///
    /// The order is re-checked under its lock: if it is no longer pending or
    /// no longer overdue at `now` (a payment landed in the meantime), nothing
    /// is written and `false` is returned.
    #[tracing::instrument(skip(self))]
    pub async fn cancel_expired_order(&self, order_id: OrderId, now: DateTime<Utc>) -> Result<bool> {
        let mut tx = self.store.begin().await?;

        let Some(order) = tx.lock_order(order_id).await? else {
            return Ok(false);
        };
        if !order.is_payment_overdue(now) {
            tracing::debug!(%order_id, status = %order.status(), "order no longer overdue");
            return Ok(false);
        }

        restore_stock(&mut tx, &order).await?;
        tx.set_status(order_id, OrderStatus::Cancel).await?;
        tx.commit().await?;

        metrics::counter!(
            "order_status_transitions_total",
            "from" => OrderStatus::Pending.as_str(),
            "to" => OrderStatus::Cancel.as_str()
        )
        .increment(1);
        Ok(true)
    }

    async fn transition(
        &self,
        order_id: OrderId,
        target: OrderStatus,
        actor: Actor,
    ) -> Result<StatusChange> {
        let mut tx = self.store.begin().await?;

        let order = tx
            .lock_order(order_id)
            .await?
            .ok_or(DomainError::OrderNotFound(order_id))?;

        if let Some(owner) = actor.required_owner()
            && order.user_id() != owner
        {
            tracing::warn!(%order_id, user_id = %owner, "status change by non-owner refused");
            return Err(DomainError::Forbidden);
        }

        let previous = order.status();

        if actor.tolerates_replay() && previous.has_reached(target) {
            tx.rollback().await?;
            tracing::info!(%order_id, status = %previous, "status already applied");
            return Ok(StatusChange {
                order,
                previous,
                applied: false,
            });
        }

        check_transition(previous, target)?;

        if target == OrderStatus::Cancel {
            restore_stock(&mut tx, &order).await?;
        }
        let order = tx.set_status(order_id, target).await?;
        tx.commit().await?;

        metrics::counter!(
            "order_status_transitions_total",
            "from" => previous.as_str(),
            "to" => target.as_str()
        )
        .increment(1);
        tracing::info!(%order_id, from = %previous, to = %target, "order status changed");

        Ok(StatusChange {
            order,
            previous,
            applied: true,
        })
    }

    /// Attaches current catalog data, one lookup for all orders.
    async fn enrich(&self, orders: Vec<Order>) -> Result<Vec<OrderDetails>> {
        let mut variant_ids: Vec<VariantId> = orders
            .iter()
            .flat_map(|o| o.lines().iter().map(|l| l.variant_id()))
            .collect();
        variant_ids.sort();
        variant_ids.dedup();

        let catalog = if variant_ids.is_empty() {
            Vec::new()
        } else {
            self.catalog
                .find_variants(&variant_ids)
                .await
                .map_err(DomainError::VariantLookupFailed)?
        };

        Ok(orders
            .into_iter()
            .map(|order| OrderDetails::new(order, &catalog))
            .collect())
    }
}

/// Orders stock movements by variant id.
///
/// Every transaction touches variant rows in the same order, so two of them
/// never wait on each other's row locks.
fn ledger_order(
    movements: impl IntoIterator<Item = (VariantId, u32)>,
) -> Vec<(VariantId, u32)> {
    let mut movements: Vec<_> = movements.into_iter().collect();
    movements.sort_by_key(|(variant_id, _)| *variant_id);
    movements
}

async fn restore_stock<T: OrderTransaction>(tx: &mut T, order: &Order) -> Result<()> {
    let mut units: u64 = 0;
    let movements = ledger_order(order.lines().iter().map(|l| (l.variant_id(), l.quantity())));
    for (variant_id, quantity) in movements {
        tx.increment_stock(variant_id, quantity).await?;
        units += u64::from(quantity);
    }

    metrics::counter!("order_stock_restored_units_total").increment(units);
    tracing::debug!(order_id = %order.id(), units, "stock restored");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::order::{OrderError, OrderLineRequest};
    use common::{Money, ProductId};
    use order_store::{InMemoryOrderStore, Product, ShippingInfo, Variant};

    async fn seeded() -> OrderService<InMemoryOrderStore, InMemoryOrderStore> {
        let store = InMemoryOrderStore::new();
        store
            .insert_product(Product {
                id: ProductId::new(1),
                name: "Sneaker".to_string(),
                discount: Some(Money::from_cents(10)),
                on_sale: true,
            })
            .await;
        store
            .insert_variant(Variant {
                id: VariantId::new(1),
                product_id: ProductId::new(1),
                price: Money::from_cents(100),
                stock: 5,
                size: "42".to_string(),
            })
            .await;
        OrderService::new(store.clone(), store)
    }

    fn checkout(user: i64, quantity: u32) -> CreateOrder {
        CreateOrder::new(
            UserId::new(user),
            vec![OrderLineRequest::new(VariantId::new(1), quantity)],
            ShippingInfo::default(),
        )
    }

    #[tokio::test]
    async fn test_create_order() {
        let service = seeded().await;

        let details = service.create_order(checkout(1, 2)).await.unwrap();

        assert_eq!(details.order.status(), OrderStatus::Pending);
        assert_eq!(details.order.total_price(), Money::from_cents(180));
        assert_eq!(details.variants.len(), 1);
        assert_eq!(
            service.store().variant_stock(VariantId::new(1)).await,
            Some(3)
        );
    }

    #[tokio::test]
    async fn test_payment_deadline_uses_grace_window() {
        let store = InMemoryOrderStore::new();
        store
            .insert_product(Product {
                id: ProductId::new(1),
                name: "Sneaker".to_string(),
                discount: None,
                on_sale: false,
            })
            .await;
        store
            .insert_variant(Variant {
                id: VariantId::new(1),
                product_id: ProductId::new(1),
                price: Money::from_cents(100),
                stock: 5,
                size: "42".to_string(),
            })
            .await;
        let config = OrderServiceConfig::default().with_payment_grace(Duration::minutes(5));
        let service = OrderService::with_config(store.clone(), store, config);

        let order = service.create_order(checkout(1, 1)).await.unwrap().order;
        let window = order.payment_expire_at() - order.created_at();

        assert!(window <= Duration::minutes(5));
        assert!(window > Duration::minutes(4));
    }

    #[tokio::test]
    async fn test_invalid_input_touches_nothing() {
        let service = seeded().await;

        let err = service.create_order(checkout(1, 0)).await.unwrap_err();
        assert!(matches!(
            err,
            DomainError::Order(OrderError::InvalidQuantity { .. })
        ));
        assert_eq!(service.store().order_count().await, 0);
        assert_eq!(
            service.store().variant_stock(VariantId::new(1)).await,
            Some(5)
        );
    }

    #[tokio::test]
    async fn test_get_order_by_id() {
        let service = seeded().await;
        let order_id = service.create_order(checkout(1, 1)).await.unwrap().order.id();

        let details = service
            .get_order_by_id(Some(order_id), UserId::new(1))
            .await
            .unwrap();
        assert_eq!(details.order.id(), order_id);

        assert!(matches!(
            service.get_order_by_id(None, UserId::new(1)).await,
            Err(DomainError::MissingOrderId)
        ));
        assert!(matches!(
            service.get_order_by_id(Some(order_id), UserId::new(2)).await,
            Err(DomainError::Forbidden)
        ));
        assert!(matches!(
            service
                .get_order_by_id(Some(OrderId::new(404)), UserId::new(1))
                .await,
            Err(DomainError::OrderNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_full_order_lifecycle() {
        let service = seeded().await;
        let order_id = service.create_order(checkout(1, 1)).await.unwrap().order.id();

        for status in [OrderStatus::Paid, OrderStatus::Shipped] {
            let change = service
                .update_status_by_admin(Some(order_id), status)
                .await
                .unwrap();
            assert!(change.applied);
        }
        let change = service
            .update_status_by_user(UserId::new(1), Some(order_id), OrderStatus::Complete)
            .await
            .unwrap();

        assert_eq!(change.previous, OrderStatus::Shipped);
        assert_eq!(change.order.status(), OrderStatus::Complete);
    }

    #[tokio::test]
    async fn test_cancel_order_restores_stock() {
        let service = seeded().await;
        let order_id = service.create_order(checkout(1, 3)).await.unwrap().order.id();
        assert_eq!(
            service.store().variant_stock(VariantId::new(1)).await,
            Some(2)
        );

        let change = service
            .cancel_order_and_restore_stock(Some(order_id))
            .await
            .unwrap();

        assert_eq!(change.order.status(), OrderStatus::Cancel);
        assert_eq!(
            service.store().variant_stock(VariantId::new(1)).await,
            Some(5)
        );

        // Cancel is terminal, so a second cancel restores nothing.
        let err = service
            .cancel_order_and_restore_stock(Some(order_id))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            DomainError::Order(OrderError::InvalidTransition { .. })
        ));
        assert_eq!(
            service.store().variant_stock(VariantId::new(1)).await,
            Some(5)
        );
    }

    #[tokio::test]
    async fn test_delete_order() {
        let service = seeded().await;
        let order_id = service.create_order(checkout(1, 1)).await.unwrap().order.id();

        service.delete_order(Some(order_id)).await.unwrap();

        assert!(matches!(
            service.delete_order(Some(order_id)).await,
            Err(DomainError::OrderNotFound(_))
        ));
        assert!(matches!(
            service.delete_order(None).await,
            Err(DomainError::MissingOrderId)
        ));
        // Hard delete leaves stock where it was.
        assert_eq!(
            service.store().variant_stock(VariantId::new(1)).await,
            Some(4)
        );
    }

    #[tokio::test]
    async fn test_cancel_expired_order_rechecks_state() {
        let service = seeded().await;
        let order = service.create_order(checkout(1, 2)).await.unwrap().order;
        let later = order.payment_expire_at() + Duration::seconds(1);

        // Not yet overdue.
        assert!(
            !service
                .cancel_expired_order(order.id(), order.created_at())
                .await
                .unwrap()
        );

        assert!(service.cancel_expired_order(order.id(), later).await.unwrap());
        assert_eq!(
            service.store().variant_stock(VariantId::new(1)).await,
            Some(5)
        );

        // Already cancelled.
        assert!(!service.cancel_expired_order(order.id(), later).await.unwrap());
        assert_eq!(
            service.store().variant_stock(VariantId::new(1)).await,
            Some(5)
        );
    }

    #[test]
    fn test_ledger_order_sorts_by_variant() {
        let movements = ledger_order([
            (VariantId::new(7), 1),
            (VariantId::new(2), 4),
            (VariantId::new(5), 2),
        ]);

        assert_eq!(
            movements,
            vec![
                (VariantId::new(2), 4),
                (VariantId::new(5), 2),
                (VariantId::new(7), 1),
            ]
        );
    }

    async fn seeded_expensive(stock: u32) -> OrderService<InMemoryOrderStore, InMemoryOrderStore> {
        let store = InMemoryOrderStore::new();
        store
            .insert_product(Product {
                id: ProductId::new(1),
                name: "Watch".to_string(),
                discount: None,
                on_sale: false,
            })
            .await;
        store
            .insert_variant(Variant {
                id: VariantId::new(1),
                product_id: ProductId::new(1),
                price: Money::from_cents(5_000_000_000),
                stock,
                size: "One Size".to_string(),
            })
            .await;
        OrderService::new(store.clone(), store)
    }

    #[tokio::test]
    async fn test_huge_quantity_fails_on_stock() {
        let service = seeded_expensive(1).await;

        let err = service
            .create_order(checkout(1, 2_000_000_000))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            DomainError::InsufficientStock {
                requested: 2_000_000_000,
                available: 1,
                ..
            }
        ));
        assert_eq!(service.store().order_count().await, 0);
    }

    #[tokio::test]
    async fn test_total_out_of_range_rolls_back() {
        let service = seeded_expensive(2_000_000_000).await;

        let err = service
            .create_order(checkout(1, 2_000_000_000))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            DomainError::Order(OrderError::TotalOutOfRange)
        ));
        assert!(err.is_input_error());
        assert_eq!(service.store().order_count().await, 0);
        assert_eq!(
            service.store().variant_stock(VariantId::new(1)).await,
            Some(2_000_000_000)
        );
    }
}
