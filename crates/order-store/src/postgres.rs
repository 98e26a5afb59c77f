use std::collections::HashMap;

use async_trait::async_trait;
use common::{CouponId, Money, OrderId, OrderLineId, OrderStatus, ProductId, UserId, VariantId};
use sqlx::{PgExecutor, PgPool, Postgres, Row, postgres::PgRow};

use crate::{
    CatalogEntry, NewOrder, Order, OrderLine, OrderQuery, Product, Result, ShippingInfo,
    StoreError, Variant,
    store::{Catalog, OrderStore, OrderTransaction},
};

const ORDER_COLUMNS: &str = "id, user_id, coupon_id, status, recipient_name, phone, address, \
     total_price, payment_expire_at, created_at, updated_at";

/// PostgreSQL-backed order store and catalog.
#[derive(Clone)]
pub struct PostgresOrderStore {
    pool: PgPool,
}

impl PostgresOrderStore {
    /// Creates a new PostgreSQL order store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> std::result::Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("../../migrations").run(&self.pool).await
    }

    /// Adds or replaces a catalog product.
    pub async fn insert_product(&self, product: &Product) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO products (id, name, discount, on_sale)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (id) DO UPDATE SET
                name = EXCLUDED.name,
                discount = EXCLUDED.discount,
                on_sale = EXCLUDED.on_sale
            "#,
        )
        .bind(product.id.as_i64())
        .bind(&product.name)
        .bind(product.discount.map(|d| d.cents()))
        .bind(product.on_sale)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Adds or replaces a catalog variant, including its stock counter.
    pub async fn insert_variant(&self, variant: &Variant) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO variants (id, product_id, price, stock, size)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (id) DO UPDATE SET
                product_id = EXCLUDED.product_id,
                price = EXCLUDED.price,
                stock = EXCLUDED.stock,
                size = EXCLUDED.size
            "#,
        )
        .bind(variant.id.as_i64())
        .bind(variant.product_id.as_i64())
        .bind(variant.price.cents())
        .bind(stock_to_db(variant.stock)?)
        .bind(&variant.size)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Returns the current stock of a variant.
    pub async fn variant_stock(&self, variant_id: VariantId) -> Result<Option<u32>> {
        let stock: Option<i32> = sqlx::query_scalar("SELECT stock FROM variants WHERE id = $1")
            .bind(variant_id.as_i64())
            .fetch_optional(&self.pool)
            .await?;

        stock.map(stock_from_db).transpose()
    }
}

fn stock_to_db(value: u32) -> Result<i32> {
    i32::try_from(value).map_err(|_| StoreError::InvalidRecord(format!("value {value} out of range")))
}

fn stock_from_db(value: i32) -> Result<u32> {
    u32::try_from(value)
        .map_err(|_| StoreError::InvalidRecord(format!("negative stored quantity {value}")))
}

fn row_to_order(row: &PgRow) -> Result<Order> {
    let status: String = row.try_get("status")?;
    let status: OrderStatus = status
        .parse()
        .map_err(|e: common::ParseStatusError| StoreError::InvalidRecord(e.to_string()))?;

    Ok(Order::from_parts(
        OrderId::new(row.try_get("id")?),
        UserId::new(row.try_get("user_id")?),
        row.try_get::<Option<i64>, _>("coupon_id")?.map(CouponId::new),
        status,
        ShippingInfo {
            recipient_name: row.try_get("recipient_name")?,
            phone: row.try_get("phone")?,
            address: row.try_get("address")?,
        },
        Money::from_cents(row.try_get("total_price")?),
        row.try_get("payment_expire_at")?,
        row.try_get("created_at")?,
        row.try_get("updated_at")?,
    ))
}

fn row_to_line(row: &PgRow) -> Result<OrderLine> {
    Ok(OrderLine::from_parts(
        OrderLineId::new(row.try_get("id")?),
        OrderId::new(row.try_get("order_id")?),
        VariantId::new(row.try_get("variant_id")?),
        stock_from_db(row.try_get("quantity")?)?,
        Money::from_cents(row.try_get("price_at_purchase")?),
    ))
}

/// Loads the lines of `orders` and attaches them in id order.
async fn attach_lines<'e, E>(executor: E, orders: &mut [Order]) -> Result<()>
where
    E: PgExecutor<'e>,
{
    if orders.is_empty() {
        return Ok(());
    }

    let order_ids: Vec<i64> = orders.iter().map(|o| o.id().as_i64()).collect();
    let rows = sqlx::query(
        r#"
        SELECT id, order_id, variant_id, quantity, price_at_purchase
        FROM order_lines
        WHERE order_id = ANY($1)
        ORDER BY id ASC
        "#,
    )
    .bind(&order_ids)
    .fetch_all(executor)
    .await?;

    let mut by_order: HashMap<OrderId, Vec<OrderLine>> = HashMap::new();
    for row in &rows {
        let line = row_to_line(row)?;
        by_order.entry(line.order_id()).or_default().push(line);
    }

    for order in orders.iter_mut() {
        for line in by_order.remove(&order.id()).unwrap_or_default() {
            order.push_line(line);
        }
    }

    Ok(())
}

/// Transaction over a [`PostgresOrderStore`].
pub struct PgOrderTransaction {
    tx: sqlx::Transaction<'static, Postgres>,
}

impl PgOrderTransaction {
    /// Explains a refused decrement: too little stock, or no such variant.
    async fn shortfall(&mut self, variant_id: VariantId, requested: u32) -> Result<StoreError> {
        let available: Option<i32> = sqlx::query_scalar("SELECT stock FROM variants WHERE id = $1")
            .bind(variant_id.as_i64())
            .fetch_optional(&mut *self.tx)
            .await?;

        Ok(match available {
            Some(available) => StoreError::InsufficientStock {
                variant_id,
                requested,
                available: stock_from_db(available)?,
            },
            None => StoreError::VariantNotFound(variant_id),
        })
    }
}

#[async_trait]
impl OrderTransaction for PgOrderTransaction {
    async fn decrement_stock(&mut self, variant_id: VariantId, quantity: u32) -> Result<u32> {
        // The stock column can never hold this many units.
        let Ok(requested) = i32::try_from(quantity) else {
            return Err(self.shortfall(variant_id, quantity).await?);
        };

        // Conditional decrement: the row is only touched when enough stock is left.
        let remaining: Option<i32> = sqlx::query_scalar(
            r#"
            UPDATE variants SET stock = stock - $2
            WHERE id = $1 AND stock >= $2
            RETURNING stock
            "#,
        )
        .bind(variant_id.as_i64())
        .bind(requested)
        .fetch_optional(&mut *self.tx)
        .await?;

        match remaining {
            Some(remaining) => stock_from_db(remaining),
            None => Err(self.shortfall(variant_id, quantity).await?),
        }
    }

    async fn increment_stock(&mut self, variant_id: VariantId, quantity: u32) -> Result<u32> {
        let stock: Option<i32> = sqlx::query_scalar(
            "UPDATE variants SET stock = stock + $2 WHERE id = $1 RETURNING stock",
        )
        .bind(variant_id.as_i64())
        .bind(stock_to_db(quantity)?)
        .fetch_optional(&mut *self.tx)
        .await?;

        stock
            .ok_or(StoreError::VariantNotFound(variant_id))
            .and_then(stock_from_db)
    }

    async fn insert_order(&mut self, order: NewOrder) -> Result<Order> {
        let sql = format!(
            r#"
            INSERT INTO orders (user_id, coupon_id, status, recipient_name, phone, address,
                                total_price, payment_expire_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING {ORDER_COLUMNS}
            "#
        );
        let row = sqlx::query(&sql)
            .bind(order.user_id().as_i64())
            .bind(order.coupon_id().map(|c| c.as_i64()))
            .bind(OrderStatus::Pending.as_str())
            .bind(&order.shipping().recipient_name)
            .bind(&order.shipping().phone)
            .bind(&order.shipping().address)
            .bind(order.total_price().cents())
            .bind(order.payment_expire_at())
            .fetch_one(&mut *self.tx)
            .await?;

        let mut stored = row_to_order(&row)?;

        for line in order.lines() {
            let row = sqlx::query(
                r#"
                INSERT INTO order_lines (order_id, variant_id, quantity, price_at_purchase)
                VALUES ($1, $2, $3, $4)
                RETURNING id, order_id, variant_id, quantity, price_at_purchase
                "#,
            )
            .bind(stored.id().as_i64())
            .bind(line.variant_id.as_i64())
            .bind(stock_to_db(line.quantity)?)
            .bind(line.price_at_purchase.cents())
            .fetch_one(&mut *self.tx)
            .await
            .map_err(|e| {
                if let sqlx::Error::Database(ref db_err) = e
                    && db_err.constraint() == Some("order_lines_variant_id_fkey")
                {
                    return StoreError::VariantNotFound(line.variant_id);
                }
                StoreError::Database(e)
            })?;

            stored.push_line(row_to_line(&row)?);
        }

        Ok(stored)
    }

    async fn lock_order(&mut self, order_id: OrderId) -> Result<Option<Order>> {
        let sql = format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1 FOR UPDATE");
        let row = sqlx::query(&sql)
            .bind(order_id.as_i64())
            .fetch_optional(&mut *self.tx)
            .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let mut orders = [row_to_order(&row)?];
        attach_lines(&mut *self.tx, &mut orders).await?;
        let [order] = orders;
        Ok(Some(order))
    }

    async fn set_status(&mut self, order_id: OrderId, status: OrderStatus) -> Result<Order> {
        let sql = format!(
            "UPDATE orders SET status = $2, updated_at = NOW() WHERE id = $1 RETURNING {ORDER_COLUMNS}"
        );
        let row = sqlx::query(&sql)
            .bind(order_id.as_i64())
            .bind(status.as_str())
            .fetch_optional(&mut *self.tx)
            .await?
            .ok_or(StoreError::OrderNotFound(order_id))?;

        let mut orders = [row_to_order(&row)?];
        attach_lines(&mut *self.tx, &mut orders).await?;
        let [order] = orders;
        Ok(order)
    }

    async fn commit(self) -> Result<()> {
        self.tx.commit().await?;
        Ok(())
    }

    async fn rollback(self) -> Result<()> {
        self.tx.rollback().await?;
        Ok(())
    }
}

#[async_trait]
impl OrderStore for PostgresOrderStore {
    type Transaction = PgOrderTransaction;

    async fn begin(&self) -> Result<Self::Transaction> {
        let tx = self.pool.begin().await?;
        Ok(PgOrderTransaction { tx })
    }

    async fn find_order(&self, order_id: OrderId) -> Result<Option<Order>> {
        let sql = format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1");
        let row = sqlx::query(&sql)
            .bind(order_id.as_i64())
            .fetch_optional(&self.pool)
            .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let mut orders = [row_to_order(&row)?];
        attach_lines(&self.pool, &mut orders).await?;
        let [order] = orders;
        Ok(Some(order))
    }

    async fn find_orders(&self, query: OrderQuery) -> Result<Vec<Order>> {
        let mut sql = format!("SELECT {ORDER_COLUMNS} FROM orders WHERE 1=1");
        let mut param_count = 0;

        // Build dynamic query
        if query.user_id.is_some() {
            param_count += 1;
            sql.push_str(&format!(" AND user_id = ${param_count}"));
        }
        if query.status.is_some() {
            param_count += 1;
            sql.push_str(&format!(" AND status = ${param_count}"));
        }
        if query.payment_expired_by.is_some() {
            param_count += 1;
            sql.push_str(&format!(" AND payment_expire_at <= ${param_count}"));
        }

        sql.push_str(" ORDER BY id ASC");

        if query.limit.is_some() {
            param_count += 1;
            sql.push_str(&format!(" LIMIT ${param_count}"));
        }

        let mut sqlx_query = sqlx::query(&sql);

        if let Some(user_id) = query.user_id {
            sqlx_query = sqlx_query.bind(user_id.as_i64());
        }
        if let Some(status) = query.status {
            sqlx_query = sqlx_query.bind(status.as_str());
        }
        if let Some(at) = query.payment_expired_by {
            sqlx_query = sqlx_query.bind(at);
        }
        if let Some(limit) = query.limit {
            sqlx_query = sqlx_query.bind(i64::try_from(limit).unwrap_or(i64::MAX));
        }

        let rows = sqlx_query.fetch_all(&self.pool).await?;
        let mut orders = rows.iter().map(row_to_order).collect::<Result<Vec<_>>>()?;
        attach_lines(&self.pool, &mut orders).await?;
        Ok(orders)
    }

    async fn delete_order(&self, order_id: OrderId) -> Result<bool> {
        // Lines go with the order through ON DELETE CASCADE.
        let result = sqlx::query("DELETE FROM orders WHERE id = $1")
            .bind(order_id.as_i64())
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl Catalog for PostgresOrderStore {
    async fn find_variants(&self, variant_ids: &[VariantId]) -> Result<Vec<CatalogEntry>> {
        let ids: Vec<i64> = variant_ids.iter().map(|id| id.as_i64()).collect();

        let rows = sqlx::query(
            r#"
            SELECT v.id, v.product_id, v.price, v.stock, v.size,
                   p.name, p.discount, p.on_sale
            FROM variants v
            JOIN products p ON p.id = v.product_id
            WHERE v.id = ANY($1)
            ORDER BY v.id ASC
            "#,
        )
        .bind(&ids)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                let product_id = ProductId::new(row.try_get("product_id")?);
                Ok(CatalogEntry {
                    variant: Variant {
                        id: VariantId::new(row.try_get("id")?),
                        product_id,
                        price: Money::from_cents(row.try_get("price")?),
                        stock: stock_from_db(row.try_get("stock")?)?,
                        size: row.try_get("size")?,
                    },
                    product: Product {
                        id: product_id,
                        name: row.try_get("name")?,
                        discount: row
                            .try_get::<Option<i64>, _>("discount")?
                            .map(Money::from_cents),
                        on_sale: row.try_get("on_sale")?,
                    },
                })
            })
            .collect()
    }
}
