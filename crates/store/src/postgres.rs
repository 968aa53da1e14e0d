use async_trait::async_trait;
use common::{CustomerId, Money, OrderId, ProductId};
use sqlx::{PgPool, Postgres, Row, Transaction, postgres::PgRow};

use crate::{
    NewProduct, Order, OrderLine, OrderWithLines, Product, Result, StockLevel, StoreError,
    store::{Store, StoreTx},
};

/// PostgreSQL-backed storefront store.
///
/// The oversell guarantee comes from the database itself: fulfillment reads
/// lock product rows with `SELECT ... FOR UPDATE` and decrements are guarded
/// with `quantity >= N` inside the same transaction, so conflicting commits
/// on the same product serialize on the row lock regardless of how many
/// engine processes share the pool.
#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Creates a new PostgreSQL store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> Result<()> {
        tracing::info!("running database migrations");
        sqlx::migrate!("../../migrations").run(&self.pool).await?;
        Ok(())
    }

    fn row_to_product(row: PgRow) -> Result<Product> {
        Ok(Product {
            id: ProductId::new(row.try_get("id")?),
            sku: row.try_get("sku")?,
            name: row.try_get("name")?,
            description: row.try_get("description")?,
            price: Money::from_cents(row.try_get("price_cents")?),
            quantity: row.try_get::<i32, _>("quantity")? as u32,
        })
    }

    fn row_to_order(row: PgRow) -> Result<Order> {
        Ok(Order {
            id: OrderId::new(row.try_get("id")?),
            customer_id: row
                .try_get::<Option<i64>, _>("customer_id")?
                .map(CustomerId::new),
            total: Money::from_cents(row.try_get("total_cents")?),
            created_at: row.try_get("created_at")?,
        })
    }

    fn map_sku_conflict(e: sqlx::Error, sku: &str) -> StoreError {
        if let sqlx::Error::Database(ref db_err) = e
            && db_err.constraint() == Some("products_sku_key")
        {
            return StoreError::DuplicateSku(sku.to_string());
        }
        StoreError::Database(e)
    }
}

#[async_trait]
impl Store for PostgresStore {
    async fn begin(&self) -> Result<Box<dyn StoreTx>> {
        let tx = self.pool.begin().await?;
        tracing::debug!("started fulfillment unit of work");
        Ok(Box::new(PostgresTx { tx }))
    }

    async fn list_products(&self, search: Option<&str>) -> Result<Vec<Product>> {
        let rows = match search {
            Some(q) => {
                let pattern = format!("%{q}%");
                sqlx::query(
                    r#"
                    SELECT id, sku, name, description, price_cents, quantity
                    FROM products
                    WHERE name ILIKE $1 OR sku ILIKE $1
                    ORDER BY id DESC
                    "#,
                )
                .bind(pattern)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query(
                    r#"
                    SELECT id, sku, name, description, price_cents, quantity
                    FROM products
                    ORDER BY id DESC
                    "#,
                )
                .fetch_all(&self.pool)
                .await?
            }
        };

        rows.into_iter().map(Self::row_to_product).collect()
    }

    async fn get_product(&self, id: ProductId) -> Result<Option<Product>> {
        let row = sqlx::query(
            r#"
            SELECT id, sku, name, description, price_cents, quantity
            FROM products
            WHERE id = $1
            "#,
        )
        .bind(id.as_i64())
        .fetch_optional(&self.pool)
        .await?;

        row.map(Self::row_to_product).transpose()
    }

    async fn create_product(&self, new: NewProduct) -> Result<Product> {
        let row = sqlx::query(
            r#"
            INSERT INTO products (sku, name, description, price_cents, quantity)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id, sku, name, description, price_cents, quantity
            "#,
        )
        .bind(&new.sku)
        .bind(&new.name)
        .bind(&new.description)
        .bind(new.price.cents())
        .bind(new.quantity as i32)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| Self::map_sku_conflict(e, &new.sku))?;

        Self::row_to_product(row)
    }

    async fn update_product(&self, id: ProductId, new: NewProduct) -> Result<Option<Product>> {
        let row = sqlx::query(
            r#"
            UPDATE products
            SET sku = $1, name = $2, description = $3, price_cents = $4, quantity = $5
            WHERE id = $6
            RETURNING id, sku, name, description, price_cents, quantity
            "#,
        )
        .bind(&new.sku)
        .bind(&new.name)
        .bind(&new.description)
        .bind(new.price.cents())
        .bind(new.quantity as i32)
        .bind(id.as_i64())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| Self::map_sku_conflict(e, &new.sku))?;

        row.map(Self::row_to_product).transpose()
    }

    async fn delete_product(&self, id: ProductId) -> Result<bool> {
        let result = sqlx::query("DELETE FROM products WHERE id = $1")
            .bind(id.as_i64())
            .execute(&self.pool)
            .await
            .map_err(|e| {
                if let sqlx::Error::Database(ref db_err) = e
                    && db_err.constraint() == Some("order_lines_product_id_fkey")
                {
                    return StoreError::ProductReferenced(id);
                }
                StoreError::Database(e)
            })?;

        Ok(result.rows_affected() > 0)
    }

    async fn list_orders(&self) -> Result<Vec<Order>> {
        let rows = sqlx::query(
            r#"
            SELECT id, customer_id, total_cents, created_at
            FROM orders
            ORDER BY id DESC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_order).collect()
    }

    async fn get_order(&self, id: OrderId) -> Result<Option<OrderWithLines>> {
        let Some(order_row) = sqlx::query(
            r#"
            SELECT id, customer_id, total_cents, created_at
            FROM orders
            WHERE id = $1
            "#,
        )
        .bind(id.as_i64())
        .fetch_optional(&self.pool)
        .await?
        else {
            return Ok(None);
        };

        let order = Self::row_to_order(order_row)?;

        let line_rows = sqlx::query(
            r#"
            SELECT ol.product_id, ol.quantity, ol.unit_price_cents, p.name AS product_name
            FROM order_lines ol
            JOIN products p ON p.id = ol.product_id
            WHERE ol.order_id = $1
            ORDER BY ol.id ASC
            "#,
        )
        .bind(id.as_i64())
        .fetch_all(&self.pool)
        .await?;

        let lines = line_rows
            .into_iter()
            .map(|row| {
                Ok(OrderLine {
                    product_id: ProductId::new(row.try_get("product_id")?),
                    product_name: row.try_get("product_name")?,
                    quantity: row.try_get::<i32, _>("quantity")? as u32,
                    unit_price: Money::from_cents(row.try_get("unit_price_cents")?),
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Some(OrderWithLines { order, lines }))
    }
}

/// One fulfillment unit of work on a pooled connection.
///
/// Dropping without commit rolls back via the underlying sqlx transaction.
struct PostgresTx {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl StoreTx for PostgresTx {
    async fn product_for_update(&mut self, id: ProductId) -> Result<Option<StockLevel>> {
        let row = sqlx::query(
            r#"
            SELECT price_cents, quantity
            FROM products
            WHERE id = $1
            FOR UPDATE
            "#,
        )
        .bind(id.as_i64())
        .fetch_optional(&mut *self.tx)
        .await?;

        Ok(match row {
            Some(row) => Some(StockLevel {
                price: Money::from_cents(row.try_get("price_cents")?),
                quantity: row.try_get::<i32, _>("quantity")? as u32,
            }),
            None => None,
        })
    }

    async fn insert_order(
        &mut self,
        customer_id: Option<CustomerId>,
        total: Money,
    ) -> Result<OrderId> {
        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO orders (customer_id, total_cents)
            VALUES ($1, $2)
            RETURNING id
            "#,
        )
        .bind(customer_id.map(|c| c.as_i64()))
        .bind(total.cents())
        .fetch_one(&mut *self.tx)
        .await?;

        Ok(OrderId::new(id))
    }

    async fn insert_order_line(
        &mut self,
        order_id: OrderId,
        product_id: ProductId,
        quantity: u32,
        unit_price: Money,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO order_lines (order_id, product_id, quantity, unit_price_cents)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(order_id.as_i64())
        .bind(product_id.as_i64())
        .bind(quantity as i32)
        .bind(unit_price.cents())
        .execute(&mut *self.tx)
        .await?;

        Ok(())
    }

    async fn decrement_stock(&mut self, id: ProductId, by: u32) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE products
            SET quantity = quantity - $1
            WHERE id = $2 AND quantity >= $1
            "#,
        )
        .bind(by as i32)
        .bind(id.as_i64())
        .execute(&mut *self.tx)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        self.tx.commit().await?;
        Ok(())
    }
}
