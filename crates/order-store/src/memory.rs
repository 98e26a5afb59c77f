use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use common::{OrderId, OrderLineId, OrderStatus, ProductId, VariantId};
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};

use crate::{
    CatalogEntry, NewOrder, Order, OrderQuery, Product, Result, StoreError, Variant,
    store::{Catalog, OrderStore, OrderTransaction},
};

#[derive(Debug, Clone, Default)]
struct MemoryState {
    orders: BTreeMap<OrderId, Order>,
    variants: HashMap<VariantId, Variant>,
    products: HashMap<ProductId, Product>,
    next_order_id: i64,
    next_line_id: i64,
}

#[derive(Debug, Clone, Default)]
struct FaultPlan {
    fail_on_insert: bool,
    fail_variant_lookup: bool,
    fail_status_updates_for: HashSet<OrderId>,
}

/// In-memory order store and catalog for testing.
///
/// A transaction holds the store-wide lock for its whole lifetime and works on
/// a private copy of the state, which replaces the shared state on commit.
/// Writers are therefore fully serialized, and an uncommitted transaction
/// leaves no trace.
#[derive(Clone, Default)]
pub struct InMemoryOrderStore {
    state: Arc<Mutex<MemoryState>>,
    faults: Arc<RwLock<FaultPlan>>,
}

impl InMemoryOrderStore {
    /// Creates a new empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces a catalog product.
    pub async fn insert_product(&self, product: Product) {
        self.state.lock().await.products.insert(product.id, product);
    }

    /// Adds or replaces a catalog variant, including its stock counter.
    pub async fn insert_variant(&self, variant: Variant) {
        self.state.lock().await.variants.insert(variant.id, variant);
    }

    /// Returns the current stock of a variant.
    pub async fn variant_stock(&self, variant_id: VariantId) -> Option<u32> {
        self.state
            .lock()
            .await
            .variants
            .get(&variant_id)
            .map(|v| v.stock)
    }

    /// Returns the total number of orders stored.
    pub async fn order_count(&self) -> usize {
        self.state.lock().await.orders.len()
    }

    /// Configures every subsequent order insert to fail.
    pub async fn set_fail_on_insert(&self, fail: bool) {
        self.faults.write().await.fail_on_insert = fail;
    }

    /// Configures every subsequent catalog lookup to fail.
    pub async fn set_fail_variant_lookup(&self, fail: bool) {
        self.faults.write().await.fail_variant_lookup = fail;
    }

    /// Makes every subsequent status write for `order_id` fail.
    pub async fn fail_status_updates_for(&self, order_id: OrderId) {
        self.faults
            .write()
            .await
            .fail_status_updates_for
            .insert(order_id);
    }

    /// Removes all configured failures.
    pub async fn clear_faults(&self) {
        *self.faults.write().await = FaultPlan::default();
    }
}

/// Transaction over an [`InMemoryOrderStore`].
pub struct InMemoryTransaction {
    guard: OwnedMutexGuard<MemoryState>,
    working: MemoryState,
    faults: FaultPlan,
}

#[async_trait]
impl OrderTransaction for InMemoryTransaction {
    async fn decrement_stock(&mut self, variant_id: VariantId, quantity: u32) -> Result<u32> {
        let variant = self
            .working
            .variants
            .get_mut(&variant_id)
            .ok_or(StoreError::VariantNotFound(variant_id))?;

        if variant.stock < quantity {
            return Err(StoreError::InsufficientStock {
                variant_id,
                requested: quantity,
                available: variant.stock,
            });
        }

        variant.stock -= quantity;
        Ok(variant.stock)
    }

    async fn increment_stock(&mut self, variant_id: VariantId, quantity: u32) -> Result<u32> {
        let variant = self
            .working
            .variants
            .get_mut(&variant_id)
            .ok_or(StoreError::VariantNotFound(variant_id))?;

        variant.stock = variant.stock.checked_add(quantity).ok_or_else(|| {
            StoreError::InvalidRecord(format!("stock overflow for variant {variant_id}"))
        })?;
        Ok(variant.stock)
    }

    async fn insert_order(&mut self, order: NewOrder) -> Result<Order> {
        if self.faults.fail_on_insert {
            return Err(StoreError::Unavailable(
                "order insert rejected".to_string(),
            ));
        }

        // Foreign key simulation
        if let Some(missing) = order
            .lines()
            .iter()
            .find(|line| !self.working.variants.contains_key(&line.variant_id))
        {
            return Err(StoreError::VariantNotFound(missing.variant_id));
        }

        self.working.next_order_id += 1;
        let order_id = OrderId::new(self.working.next_order_id);

        let line_ids: Vec<OrderLineId> = order
            .lines()
            .iter()
            .map(|_| {
                self.working.next_line_id += 1;
                OrderLineId::new(self.working.next_line_id)
            })
            .collect();

        let order = Order::from_new(order_id, order, &line_ids, Utc::now());
        self.working.orders.insert(order_id, order.clone());
        Ok(order)
    }

    async fn lock_order(&mut self, order_id: OrderId) -> Result<Option<Order>> {
        // The whole store is already locked by this transaction.
        Ok(self.working.orders.get(&order_id).cloned())
    }

    async fn set_status(&mut self, order_id: OrderId, status: OrderStatus) -> Result<Order> {
        if self.faults.fail_status_updates_for.contains(&order_id) {
            return Err(StoreError::Unavailable(format!(
                "status update rejected for order {order_id}"
            )));
        }

        let order = self
            .working
            .orders
            .get_mut(&order_id)
            .ok_or(StoreError::OrderNotFound(order_id))?;
        order.set_status(status, Utc::now());
        Ok(order.clone())
    }

    async fn commit(self) -> Result<()> {
        let Self {
            mut guard, working, ..
        } = self;
        *guard = working;
        Ok(())
    }

    async fn rollback(self) -> Result<()> {
        Ok(())
    }
}

#[async_trait]
impl OrderStore for InMemoryOrderStore {
    type Transaction = InMemoryTransaction;

    async fn begin(&self) -> Result<Self::Transaction> {
        let guard = Arc::clone(&self.state).lock_owned().await;
        let working = guard.clone();
        let faults = self.faults.read().await.clone();

        Ok(InMemoryTransaction {
            guard,
            working,
            faults,
        })
    }

    async fn find_order(&self, order_id: OrderId) -> Result<Option<Order>> {
        Ok(self.state.lock().await.orders.get(&order_id).cloned())
    }

    async fn find_orders(&self, query: OrderQuery) -> Result<Vec<Order>> {
        let state = self.state.lock().await;
        let limit = query.limit.unwrap_or(usize::MAX);

        Ok(state
            .orders
            .values()
            .filter(|order| query.matches(order))
            .take(limit)
            .cloned()
            .collect())
    }

    async fn delete_order(&self, order_id: OrderId) -> Result<bool> {
        Ok(self.state.lock().await.orders.remove(&order_id).is_some())
    }
}

#[async_trait]
impl Catalog for InMemoryOrderStore {
    async fn find_variants(&self, variant_ids: &[VariantId]) -> Result<Vec<CatalogEntry>> {
        if self.faults.read().await.fail_variant_lookup {
            return Err(StoreError::Unavailable(
                "catalog lookup rejected".to_string(),
            ));
        }

        let state = self.state.lock().await;
        let mut seen = HashSet::new();

        Ok(variant_ids
            .iter()
            .filter(|id| seen.insert(**id))
            .filter_map(|id| {
                let variant = state.variants.get(id)?;
                let product = state.products.get(&variant.product_id)?;
                Some(CatalogEntry {
                    variant: variant.clone(),
                    product: product.clone(),
                })
            })
            .collect())
    }
}
