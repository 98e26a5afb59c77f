//! PostgreSQL integration tests
//!
//! These tests use a shared PostgreSQL container for efficiency.
//! Run with:
//!
//! ```bash
//! cargo test -p order-store --test postgres_integration -- --test-threads=1
//! ```

use std::sync::Arc;

use chrono::{Duration, Utc};
use common::{Money, OrderId, OrderStatus, ProductId, UserId, VariantId};
use order_store::{
    Catalog, NewOrder, NewOrderLine, OrderQuery, OrderStore, OrderStoreExt, OrderTransaction,
    PostgresOrderStore, Product, ShippingInfo, StoreError, Variant,
};
use sqlx::PgPool;
use testcontainers::{ContainerAsync, runners::AsyncRunner};
use testcontainers_modules::postgres::Postgres;
use tokio::sync::OnceCell;

/// Shared container info - container stays alive for all tests
struct ContainerInfo {
    #[allow(dead_code)] // Container must stay alive for tests
    container: ContainerAsync<Postgres>,
    connection_string: String,
}

/// Global shared container
static CONTAINER: OnceCell<Arc<ContainerInfo>> = OnceCell::const_new();

async fn get_container_info() -> Arc<ContainerInfo> {
    CONTAINER
        .get_or_init(|| async {
            let container = Postgres::default().start().await.unwrap();

            let host = container.get_host().await.unwrap();
            let port = container.get_host_port_ipv4(5432).await.unwrap();

            let connection_string =
                format!("postgres://postgres:postgres@{}:{}/postgres", host, port);

            let temp_pool = PgPool::connect(&connection_string).await.unwrap();
            PostgresOrderStore::new(temp_pool.clone())
                .run_migrations()
                .await
                .unwrap();
            temp_pool.close().await;

            Arc::new(ContainerInfo {
                container,
                connection_string,
            })
        })
        .await
        .clone()
}

/// Get a fresh store with its own pool, cleared tables and one seeded variant
async fn get_test_store(stock: u32) -> PostgresOrderStore {
    let info = get_container_info().await;

    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(5)
        .connect(&info.connection_string)
        .await
        .unwrap();

    // Clear tables for test isolation
    sqlx::query("TRUNCATE TABLE order_lines, orders, variants, products RESTART IDENTITY")
        .execute(&pool)
        .await
        .unwrap();

    let store = PostgresOrderStore::new(pool);
    store
        .insert_product(&Product {
            id: ProductId::new(1),
            name: "Hoodie".to_string(),
            discount: Some(Money::from_cents(10)),
            on_sale: true,
        })
        .await
        .unwrap();
    store
        .insert_variant(&Variant {
            id: VariantId::new(1),
            product_id: ProductId::new(1),
            price: Money::from_cents(100),
            stock,
            size: "L".to_string(),
        })
        .await
        .unwrap();
    store
}

fn new_order(user: i64, quantity: u32) -> NewOrder {
    NewOrder::new(
        UserId::new(user),
        None,
        ShippingInfo {
            recipient_name: "Ada".to_string(),
            phone: "555-0100".to_string(),
            address: "1 Loop Rd".to_string(),
        },
        Utc::now() + Duration::minutes(30),
        vec![NewOrderLine::new(
            VariantId::new(1),
            quantity,
            Money::from_cents(90),
        )],
    )
    .unwrap()
}

#[tokio::test]
async fn checkout_write_path_commits() {
    let store = get_test_store(5).await;

    let mut tx = store.begin().await.unwrap();
    assert_eq!(tx.decrement_stock(VariantId::new(1), 2).await.unwrap(), 3);
    let order = tx.insert_order(new_order(1, 2)).await.unwrap();
    tx.commit().await.unwrap();

    assert_eq!(store.variant_stock(VariantId::new(1)).await.unwrap(), Some(3));

    let stored = store.find_order(order.id()).await.unwrap().unwrap();
    assert_eq!(stored.status(), OrderStatus::Pending);
    assert_eq!(stored.total_price(), Money::from_cents(180));
    assert_eq!(stored.lines().len(), 1);
    assert_eq!(stored.lines()[0].price_at_purchase(), Money::from_cents(90));
    assert_eq!(stored.shipping().recipient_name, "Ada");
}

#[tokio::test]
async fn decrement_never_goes_negative() {
    let store = get_test_store(1).await;

    let mut tx = store.begin().await.unwrap();
    let err = tx.decrement_stock(VariantId::new(1), 2).await.unwrap_err();
    assert!(matches!(
        err,
        StoreError::InsufficientStock {
            requested: 2,
            available: 1,
            ..
        }
    ));

    let err = tx.decrement_stock(VariantId::new(42), 1).await.unwrap_err();
    assert!(matches!(err, StoreError::VariantNotFound(_)));
}

#[tokio::test]
async fn decrement_beyond_column_range_is_insufficient_stock() {
    let store = get_test_store(4).await;

    let mut tx = store.begin().await.unwrap();
    let err = tx
        .decrement_stock(VariantId::new(1), 3_000_000_000)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        StoreError::InsufficientStock {
            requested: 3_000_000_000,
            available: 4,
            ..
        }
    ));

    let err = tx
        .decrement_stock(VariantId::new(42), u32::MAX)
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::VariantNotFound(_)));

    // The transaction is still usable after the refusal.
    assert_eq!(tx.decrement_stock(VariantId::new(1), 4).await.unwrap(), 0);
}

#[tokio::test]
async fn rollback_discards_stock_and_order() {
    let store = get_test_store(5).await;

    let mut tx = store.begin().await.unwrap();
    tx.decrement_stock(VariantId::new(1), 2).await.unwrap();
    tx.insert_order(new_order(1, 2)).await.unwrap();
    tx.rollback().await.unwrap();

    assert_eq!(store.variant_stock(VariantId::new(1)).await.unwrap(), Some(5));
    assert!(store.find_orders(OrderQuery::new()).await.unwrap().is_empty());
}

#[tokio::test]
async fn concurrent_decrements_do_not_oversell() {
    let store = get_test_store(3).await;

    let mut handles = Vec::new();
    for _ in 0..8 {
        let store = store.clone();
        handles.push(tokio::spawn(async move {
            let mut tx = store.begin().await.unwrap();
            match tx.decrement_stock(VariantId::new(1), 1).await {
                Ok(_) => {
                    tx.commit().await.unwrap();
                    true
                }
                Err(_) => false,
            }
        }));
    }

    let mut succeeded = 0;
    for handle in handles {
        if handle.await.unwrap() {
            succeeded += 1;
        }
    }

    assert_eq!(succeeded, 3);
    assert_eq!(store.variant_stock(VariantId::new(1)).await.unwrap(), Some(0));
}

#[tokio::test]
async fn status_update_and_restock() {
    let store = get_test_store(5).await;

    let mut tx = store.begin().await.unwrap();
    tx.decrement_stock(VariantId::new(1), 2).await.unwrap();
    let order = tx.insert_order(new_order(1, 2)).await.unwrap();
    tx.commit().await.unwrap();

    let mut tx = store.begin().await.unwrap();
    let locked = tx.lock_order(order.id()).await.unwrap().unwrap();
    assert_eq!(locked.lines().len(), 1);
    for line in locked.lines() {
        tx.increment_stock(line.variant_id(), line.quantity())
            .await
            .unwrap();
    }
    let updated = tx.set_status(order.id(), OrderStatus::Cancel).await.unwrap();
    tx.commit().await.unwrap();

    assert_eq!(updated.status(), OrderStatus::Cancel);
    assert_eq!(store.variant_stock(VariantId::new(1)).await.unwrap(), Some(5));
}

#[tokio::test]
async fn missing_order_paths() {
    let store = get_test_store(5).await;

    let mut tx = store.begin().await.unwrap();
    assert!(tx.lock_order(OrderId::new(999)).await.unwrap().is_none());
    let err = tx
        .set_status(OrderId::new(999), OrderStatus::Paid)
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::OrderNotFound(_)));
    drop(tx);

    assert!(store.find_order(OrderId::new(999)).await.unwrap().is_none());
    assert!(!store.delete_order(OrderId::new(999)).await.unwrap());
}

#[tokio::test]
async fn query_filters() {
    let store = get_test_store(10).await;

    let mut tx = store.begin().await.unwrap();
    let first = tx.insert_order(new_order(1, 1)).await.unwrap();
    let second = tx.insert_order(new_order(2, 1)).await.unwrap();
    tx.set_status(second.id(), OrderStatus::Paid).await.unwrap();
    tx.commit().await.unwrap();

    let mine = store
        .find_orders(OrderQuery::for_user(UserId::new(1)))
        .await
        .unwrap();
    assert_eq!(mine.len(), 1);
    assert_eq!(mine[0].id(), first.id());
    assert_eq!(mine[0].lines().len(), 1);

    let expired = store
        .find_pending_expired(first.payment_expire_at() + Duration::seconds(1))
        .await
        .unwrap();
    assert_eq!(expired.len(), 1);
    assert_eq!(expired[0].id(), first.id());

    let limited = store.find_orders(OrderQuery::new().limit(1)).await.unwrap();
    assert_eq!(limited.len(), 1);

    assert!(store.delete_order(first.id()).await.unwrap());
    assert!(store.find_order(first.id()).await.unwrap().is_none());
}

#[tokio::test]
async fn catalog_lookup_joins_products() {
    let store = get_test_store(4).await;

    let entries = store
        .find_variants(&[VariantId::new(1), VariantId::new(77)])
        .await
        .unwrap();

    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].variant.stock, 4);
    assert_eq!(entries[0].product.discount, Some(Money::from_cents(10)));
    assert!(entries[0].product.on_sale);
}
