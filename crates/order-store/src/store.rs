use async_trait::async_trait;
use common::{OrderId, OrderStatus, VariantId};

use crate::{CatalogEntry, NewOrder, Order, OrderQuery, Result};

/// Batch lookup of variants with their parent products.
///
/// This is the catalog collaborator's read interface. It never touches stock
/// counters, so its results must not be used for stock decisions.
#[async_trait]
pub trait Catalog: Send + Sync {
    /// Resolves a set of variant ids in one call.
    ///
    /// Ids that don't exist are simply absent from the result; an `Err` means
    /// the lookup itself failed.
    async fn find_variants(&self, variant_ids: &[VariantId]) -> Result<Vec<CatalogEntry>>;
}

/// Core trait for order repository implementations.
///
/// Reads are served directly. Every write goes through a transaction obtained
/// from [`OrderStore::begin`]. All implementations must be thread-safe (Send + Sync).
#[async_trait]
pub trait OrderStore: Send + Sync {
    /// The transaction type handed out by this store.
    type Transaction: OrderTransaction + 'static;

    /// Starts a transaction.
    ///
    /// Nothing written through the transaction is visible to others until
    /// [`OrderTransaction::commit`]. Dropping it without committing rolls back.
    async fn begin(&self) -> Result<Self::Transaction>;

    /// Loads an order with its lines.
    ///
    /// Returns None if the order doesn't exist.
    async fn find_order(&self, order_id: OrderId) -> Result<Option<Order>>;

    /// Retrieves orders matching a query, ordered by id.
    async fn find_orders(&self, query: OrderQuery) -> Result<Vec<Order>>;

    /// Deletes an order and its lines.
    ///
    /// Returns false if the order didn't exist.
    async fn delete_order(&self, order_id: OrderId) -> Result<bool>;
}

/// A unit of work against the order store: the inventory ledger plus order writes.
#[async_trait]
pub trait OrderTransaction: Send {
    /// Atomically checks and decrements a variant's stock.
    ///
    /// Fails with `InsufficientStock` (leaving stock untouched) when fewer than
    /// `quantity` units are available, and with `VariantNotFound` when the
    /// variant doesn't exist. Returns the remaining stock.
    async fn decrement_stock(&mut self, variant_id: VariantId, quantity: u32) -> Result<u32>;

    /// Increments a variant's stock, returning the new stock.
    async fn increment_stock(&mut self, variant_id: VariantId, quantity: u32) -> Result<u32>;

    /// Inserts a new pending order together with all of its lines.
    async fn insert_order(&mut self, order: NewOrder) -> Result<Order>;

    /// Loads an order and locks it against concurrent writers until the
    /// transaction ends.
    async fn lock_order(&mut self, order_id: OrderId) -> Result<Option<Order>>;

    /// Writes a new status and returns the updated order.
    async fn set_status(&mut self, order_id: OrderId, status: OrderStatus) -> Result<Order>;

    /// Makes all writes of this transaction durable and visible.
    async fn commit(self) -> Result<()>;

    /// Discards all writes of this transaction.
    async fn rollback(self) -> Result<()>;
}

/// Extension trait providing convenience methods for order stores.
#[async_trait]
pub trait OrderStoreExt: OrderStore {
    /// Returns unpaid orders whose grace window closed at or before `now`.
    async fn find_pending_expired(&self, now: chrono::DateTime<chrono::Utc>) -> Result<Vec<Order>> {
        self.find_orders(OrderQuery::pending_expired(now)).await
    }
}

// Blanket implementation for all OrderStore implementations
impl<T: OrderStore + ?Sized> OrderStoreExt for T {}
