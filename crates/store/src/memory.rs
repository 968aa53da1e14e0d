use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use common::{CustomerId, Money, OrderId, ProductId};
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::{
    NewProduct, Order, OrderLine, OrderWithLines, Product, Result, StockLevel, StoreError,
    store::{Store, StoreTx},
};

#[derive(Debug, Clone, Default)]
struct Inner {
    products: BTreeMap<i64, Product>,
    orders: BTreeMap<i64, Order>,
    lines: BTreeMap<i64, Vec<StoredLine>>,
    next_product_id: i64,
    next_order_id: i64,
}

#[derive(Debug, Clone)]
struct StoredLine {
    product_id: ProductId,
    quantity: u32,
    unit_price: Money,
}

/// In-memory store implementation for testing.
///
/// Provides the same interface as the PostgreSQL implementation. A unit of
/// work takes the whole-store lock for its duration, which serializes
/// conflicting decrements the way Postgres row locks do, and restores a
/// snapshot on drop-without-commit to match transactional rollback.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    inner: Arc<Mutex<Inner>>,
}

impl InMemoryStore {
    /// Creates a new empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of committed orders.
    pub async fn order_count(&self) -> usize {
        self.inner.lock().await.orders.len()
    }
}

impl Inner {
    fn sku_taken(&self, sku: &str, exclude: Option<ProductId>) -> bool {
        self.products
            .values()
            .any(|p| p.sku == sku && Some(p.id) != exclude)
    }
}

#[async_trait]
impl Store for InMemoryStore {
    async fn begin(&self) -> Result<Box<dyn StoreTx>> {
        let guard = self.inner.clone().lock_owned().await;
        let snapshot = guard.clone();
        Ok(Box::new(MemoryTx {
            guard,
            snapshot: Some(snapshot),
        }))
    }

    async fn list_products(&self, search: Option<&str>) -> Result<Vec<Product>> {
        let inner = self.inner.lock().await;
        let term = search.map(str::to_lowercase);
        let mut products: Vec<Product> = inner
            .products
            .values()
            .filter(|p| match &term {
                Some(t) => {
                    p.name.to_lowercase().contains(t) || p.sku.to_lowercase().contains(t)
                }
                None => true,
            })
            .cloned()
            .collect();
        products.reverse();
        Ok(products)
    }

    async fn get_product(&self, id: ProductId) -> Result<Option<Product>> {
        let inner = self.inner.lock().await;
        Ok(inner.products.get(&id.as_i64()).cloned())
    }

    async fn create_product(&self, new: NewProduct) -> Result<Product> {
        let mut inner = self.inner.lock().await;
        if inner.sku_taken(&new.sku, None) {
            return Err(StoreError::DuplicateSku(new.sku));
        }

        inner.next_product_id += 1;
        let id = inner.next_product_id;
        let product = Product {
            id: ProductId::new(id),
            sku: new.sku,
            name: new.name,
            description: new.description,
            price: new.price,
            quantity: new.quantity,
        };
        inner.products.insert(id, product.clone());
        Ok(product)
    }

    async fn update_product(&self, id: ProductId, new: NewProduct) -> Result<Option<Product>> {
        let mut inner = self.inner.lock().await;
        if !inner.products.contains_key(&id.as_i64()) {
            return Ok(None);
        }
        if inner.sku_taken(&new.sku, Some(id)) {
            return Err(StoreError::DuplicateSku(new.sku));
        }

        let product = Product {
            id,
            sku: new.sku,
            name: new.name,
            description: new.description,
            price: new.price,
            quantity: new.quantity,
        };
        inner.products.insert(id.as_i64(), product.clone());
        Ok(Some(product))
    }

    async fn delete_product(&self, id: ProductId) -> Result<bool> {
        let mut inner = self.inner.lock().await;
        let referenced = inner
            .lines
            .values()
            .flatten()
            .any(|l| l.product_id == id);
        if referenced {
            return Err(StoreError::ProductReferenced(id));
        }
        Ok(inner.products.remove(&id.as_i64()).is_some())
    }

    async fn list_orders(&self) -> Result<Vec<Order>> {
        let inner = self.inner.lock().await;
        let mut orders: Vec<Order> = inner.orders.values().cloned().collect();
        orders.reverse();
        Ok(orders)
    }

    async fn get_order(&self, id: OrderId) -> Result<Option<OrderWithLines>> {
        let inner = self.inner.lock().await;
        let Some(order) = inner.orders.get(&id.as_i64()).cloned() else {
            return Ok(None);
        };

        let lines = inner
            .lines
            .get(&id.as_i64())
            .map(|stored| {
                stored
                    .iter()
                    .map(|l| OrderLine {
                        product_id: l.product_id,
                        product_name: inner
                            .products
                            .get(&l.product_id.as_i64())
                            .map(|p| p.name.clone())
                            .unwrap_or_default(),
                        quantity: l.quantity,
                        unit_price: l.unit_price,
                    })
                    .collect()
            })
            .unwrap_or_default();

        Ok(Some(OrderWithLines { order, lines }))
    }
}

/// Unit of work over the in-memory store.
///
/// Holds the store lock from begin to drop; mutates state in place and
/// restores the snapshot taken at begin unless committed.
struct MemoryTx {
    guard: OwnedMutexGuard<Inner>,
    snapshot: Option<Inner>,
}

#[async_trait]
impl StoreTx for MemoryTx {
    async fn product_for_update(&mut self, id: ProductId) -> Result<Option<StockLevel>> {
        Ok(self.guard.products.get(&id.as_i64()).map(|p| StockLevel {
            price: p.price,
            quantity: p.quantity,
        }))
    }

    async fn insert_order(
        &mut self,
        customer_id: Option<CustomerId>,
        total: Money,
    ) -> Result<OrderId> {
        self.guard.next_order_id += 1;
        let id = self.guard.next_order_id;
        let order = Order {
            id: OrderId::new(id),
            customer_id,
            total,
            created_at: Utc::now(),
        };
        self.guard.orders.insert(id, order);
        Ok(OrderId::new(id))
    }

    async fn insert_order_line(
        &mut self,
        order_id: OrderId,
        product_id: ProductId,
        quantity: u32,
        unit_price: Money,
    ) -> Result<()> {
        self.guard
            .lines
            .entry(order_id.as_i64())
            .or_default()
            .push(StoredLine {
                product_id,
                quantity,
                unit_price,
            });
        Ok(())
    }

    async fn decrement_stock(&mut self, id: ProductId, by: u32) -> Result<bool> {
        match self.guard.products.get_mut(&id.as_i64()) {
            Some(product) if product.quantity >= by => {
                product.quantity -= by;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn commit(mut self: Box<Self>) -> Result<()> {
        self.snapshot = None;
        Ok(())
    }
}

impl Drop for MemoryTx {
    fn drop(&mut self) {
        // Rollback: anything not committed reverts to the begin snapshot.
        if let Some(snapshot) = self.snapshot.take() {
            *self.guard = snapshot;
        }
    }
}
