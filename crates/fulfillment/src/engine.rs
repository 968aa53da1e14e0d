//! The fulfillment engine.

use std::collections::HashMap;
use std::time::Instant;

use common::{Money, ProductId};
use store::{StockLevel, Store};

use crate::error::FulfillmentError;
use crate::request::{OrderRequest, Receipt};

/// Orchestrates validation, pricing, and atomic commit of a single order
/// request against the inventory store and the order ledger.
///
/// The engine keeps no state of its own across invocations; all shared
/// mutable state lives in the store, so any number of engines (in any number
/// of processes) may run against the same database.
pub struct FulfillmentEngine<S: Store> {
    store: S,
}

impl<S: Store> FulfillmentEngine<S> {
    /// Creates an engine over the given store handle.
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Returns a reference to the underlying store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Places an order: validates every line, prices the order from the
    /// stock levels read inside the unit of work, and commits the order,
    /// its lines, and the inventory decrements together.
    ///
    /// Fail-fast and whole-request atomic: a single bad line aborts the
    /// entire order, and on any failure the store is left exactly as it was.
    #[tracing::instrument(skip(self, req), fields(lines = req.lines.len()))]
    pub async fn place_order(&self, req: OrderRequest) -> Result<Receipt, FulfillmentError> {
        let started = Instant::now();
        let result = self.execute(req).await;

        match &result {
            Ok(receipt) => {
                metrics::counter!("orders_placed_total").increment(1);
                metrics::histogram!("order_placement_seconds")
                    .record(started.elapsed().as_secs_f64());
                tracing::info!(order_id = %receipt.order_id, total = %receipt.total, "order committed");
            }
            Err(err) => {
                metrics::counter!("orders_rejected_total").increment(1);
                tracing::info!(error = %err, "order rejected");
            }
        }

        result
    }

    async fn execute(&self, req: OrderRequest) -> Result<Receipt, FulfillmentError> {
        // Input checks happen before any store access.
        if req.lines.is_empty() {
            return Err(FulfillmentError::InvalidRequest("order has no line items"));
        }
        if req.lines.iter().any(|l| l.quantity == 0) {
            return Err(FulfillmentError::InvalidRequest(
                "line quantity must be positive",
            ));
        }

        // Everything from here to commit is one unit of work; an early
        // return drops the handle and rolls back.
        let mut tx = self.store.begin().await?;

        // Each distinct product is read once, under the row lock, in sorted
        // id order so concurrent multi-product orders acquire their locks in
        // the same sequence and cannot deadlock each other.
        let mut product_ids: Vec<ProductId> = req.lines.iter().map(|l| l.product_id).collect();
        product_ids.sort_unstable();
        product_ids.dedup();

        let mut levels: HashMap<ProductId, StockLevel> = HashMap::new();
        for product_id in product_ids {
            let level = tx
                .product_for_update(product_id)
                .await?
                .ok_or(FulfillmentError::ProductNotFound(product_id))?;
            levels.insert(product_id, level);
        }

        // Duplicate lines for the same product are checked cumulatively
        // against that single read so they cannot jointly overdraw.
        let mut reserved: HashMap<ProductId, u32> = HashMap::new();
        let mut priced: Vec<(ProductId, u32, Money)> = Vec::with_capacity(req.lines.len());
        let mut total = Money::zero();

        for line in &req.lines {
            let level = levels[&line.product_id];
            let already = reserved.get(&line.product_id).copied().unwrap_or(0);
            if line.quantity > level.quantity.saturating_sub(already) {
                return Err(FulfillmentError::InsufficientStock(line.product_id));
            }
            reserved.insert(line.product_id, already + line.quantity);

            // The price read here is the price charged (price snapshot).
            total += level.price.multiply(line.quantity);
            priced.push((line.product_id, line.quantity, level.price));
        }

        let order_id = tx.insert_order(req.customer_id, total).await?;

        for (product_id, quantity, unit_price) in &priced {
            tx.insert_order_line(order_id, *product_id, *quantity, *unit_price)
                .await?;
            // Conditional decrement inside the same unit of work. Validation
            // already reserved cumulatively, so a failed guard means the
            // store changed underneath us in a way the lock should prevent;
            // refuse rather than oversell.
            if !tx.decrement_stock(*product_id, *quantity).await? {
                return Err(FulfillmentError::InsufficientStock(*product_id));
            }
        }

        tx.commit().await?;

        Ok(Receipt { order_id, total })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use common::CustomerId;
    use store::{InMemoryStore, NewProduct, Store};

    use super::*;
    use crate::request::LineRequest;

    async fn seed(store: &InMemoryStore, sku: &str, quantity: u32, price_cents: i64) -> ProductId {
        store
            .create_product(
                NewProduct::new(sku, format!("{sku} widget"))
                    .price(Money::from_cents(price_cents))
                    .quantity(quantity),
            )
            .await
            .unwrap()
            .id
    }

    #[tokio::test]
    async fn places_order_and_decrements_stock() {
        let store = InMemoryStore::new();
        let product = seed(&store, "SKU-A", 5, 1000).await;
        let engine = FulfillmentEngine::new(store.clone());

        let receipt = engine
            .place_order(OrderRequest::new(None, vec![LineRequest::new(product, 3)]))
            .await
            .unwrap();

        assert_eq!(receipt.total.cents(), 3000);
        assert_eq!(receipt.total.to_decimal_string(), "30.00");

        let remaining = store.get_product(product).await.unwrap().unwrap();
        assert_eq!(remaining.quantity, 2);
    }

    #[tokio::test]
    async fn insufficient_stock_leaves_store_unchanged() {
        let store = InMemoryStore::new();
        let product = seed(&store, "SKU-A", 2, 1000).await;
        let engine = FulfillmentEngine::new(store.clone());

        let result = engine
            .place_order(OrderRequest::new(None, vec![LineRequest::new(product, 3)]))
            .await;

        assert!(matches!(
            result,
            Err(FulfillmentError::InsufficientStock(id)) if id == product
        ));
        assert_eq!(store.get_product(product).await.unwrap().unwrap().quantity, 2);
        assert_eq!(store.order_count().await, 0);
    }

    #[tokio::test]
    async fn unknown_product_fails_whole_order() {
        let store = InMemoryStore::new();
        let known = seed(&store, "SKU-A", 5, 1000).await;
        let engine = FulfillmentEngine::new(store.clone());

        let unknown = ProductId::new(9999);
        let result = engine
            .place_order(OrderRequest::new(
                None,
                vec![LineRequest::new(known, 1), LineRequest::new(unknown, 1)],
            ))
            .await;

        assert!(matches!(
            result,
            Err(FulfillmentError::ProductNotFound(id)) if id == unknown
        ));
        // The valid first line must not have been applied.
        assert_eq!(store.get_product(known).await.unwrap().unwrap().quantity, 5);
        assert_eq!(store.order_count().await, 0);
    }

    #[tokio::test]
    async fn empty_request_rejected_before_store_access() {
        let store = InMemoryStore::new();
        let engine = FulfillmentEngine::new(store);

        let result = engine.place_order(OrderRequest::new(None, vec![])).await;
        assert!(matches!(result, Err(FulfillmentError::InvalidRequest(_))));
    }

    #[tokio::test]
    async fn zero_quantity_line_rejected() {
        let store = InMemoryStore::new();
        let product = seed(&store, "SKU-A", 5, 1000).await;
        let engine = FulfillmentEngine::new(store.clone());

        let result = engine
            .place_order(OrderRequest::new(None, vec![LineRequest::new(product, 0)]))
            .await;

        assert!(matches!(result, Err(FulfillmentError::InvalidRequest(_))));
        assert_eq!(store.order_count().await, 0);
    }

    #[tokio::test]
    async fn duplicate_lines_checked_cumulatively() {
        let store = InMemoryStore::new();
        let product = seed(&store, "SKU-A", 5, 1000).await;
        let engine = FulfillmentEngine::new(store.clone());

        // 3 + 3 exceeds the 5 on hand even though each line alone fits.
        let result = engine
            .place_order(OrderRequest::new(
                None,
                vec![LineRequest::new(product, 3), LineRequest::new(product, 3)],
            ))
            .await;

        assert!(matches!(
            result,
            Err(FulfillmentError::InsufficientStock(id)) if id == product
        ));
        assert_eq!(store.get_product(product).await.unwrap().unwrap().quantity, 5);

        // 3 + 2 exactly exhausts stock and yields two lines.
        let receipt = engine
            .place_order(OrderRequest::new(
                None,
                vec![LineRequest::new(product, 3), LineRequest::new(product, 2)],
            ))
            .await
            .unwrap();
        assert_eq!(receipt.total.cents(), 5000);

        let read = store.get_order(receipt.order_id).await.unwrap().unwrap();
        assert_eq!(read.lines.len(), 2);
        assert_eq!(store.get_product(product).await.unwrap().unwrap().quantity, 0);
    }

    #[tokio::test]
    async fn price_snapshot_survives_catalog_price_change() {
        let store = InMemoryStore::new();
        let product = seed(&store, "SKU-A", 5, 1000).await;
        let engine = FulfillmentEngine::new(store.clone());

        let receipt = engine
            .place_order(OrderRequest::new(None, vec![LineRequest::new(product, 2)]))
            .await
            .unwrap();

        // Catalog price doubles after the commit.
        store
            .update_product(
                product,
                NewProduct::new("SKU-A", "SKU-A widget")
                    .price(Money::from_cents(2000))
                    .quantity(3),
            )
            .await
            .unwrap();

        let read = store.get_order(receipt.order_id).await.unwrap().unwrap();
        assert_eq!(read.lines[0].unit_price.cents(), 1000);
        assert_eq!(read.order.total.cents(), 2000);
    }

    #[tokio::test]
    async fn order_read_back_is_idempotent() {
        let store = InMemoryStore::new();
        let product = seed(&store, "SKU-A", 5, 1000).await;
        let engine = FulfillmentEngine::new(store.clone());

        let receipt = engine
            .place_order(OrderRequest::new(
                Some(CustomerId::new(42)),
                vec![LineRequest::new(product, 1)],
            ))
            .await
            .unwrap();

        let first = store.get_order(receipt.order_id).await.unwrap().unwrap();
        let second = store.get_order(receipt.order_id).await.unwrap().unwrap();
        assert_eq!(first, second);
        assert_eq!(first.order.customer_id, Some(CustomerId::new(42)));
    }

    #[tokio::test]
    async fn multi_product_order_totals_line_extensions() {
        let store = InMemoryStore::new();
        let a = seed(&store, "SKU-A", 5, 1000).await;
        let b = seed(&store, "SKU-B", 10, 250).await;
        let engine = FulfillmentEngine::new(store.clone());

        let receipt = engine
            .place_order(OrderRequest::new(
                None,
                vec![LineRequest::new(a, 2), LineRequest::new(b, 4)],
            ))
            .await
            .unwrap();

        assert_eq!(receipt.total.cents(), 2000 + 1000);
        assert_eq!(store.get_product(a).await.unwrap().unwrap().quantity, 3);
        assert_eq!(store.get_product(b).await.unwrap().unwrap().quantity, 6);
    }

    #[tokio::test]
    async fn concurrent_requests_cannot_oversell() {
        let store = InMemoryStore::new();
        let product = seed(&store, "SKU-A", 5, 1000).await;
        let engine = Arc::new(FulfillmentEngine::new(store.clone()));

        let mut handles = Vec::new();
        for _ in 0..2 {
            let engine = engine.clone();
            handles.push(tokio::spawn(async move {
                engine
                    .place_order(OrderRequest::new(None, vec![LineRequest::new(product, 3)]))
                    .await
            }));
        }

        let mut successes = 0;
        let mut stock_failures = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => successes += 1,
                Err(FulfillmentError::InsufficientStock(_)) => stock_failures += 1,
                Err(other) => panic!("unexpected error: {other}"),
            }
        }

        assert_eq!(successes, 1);
        assert_eq!(stock_failures, 1);
        assert_eq!(store.get_product(product).await.unwrap().unwrap().quantity, 2);
    }

    #[tokio::test]
    async fn many_concurrent_requests_exhaust_stock_exactly() {
        let store = InMemoryStore::new();
        let product = seed(&store, "SKU-A", 10, 500).await;
        let engine = Arc::new(FulfillmentEngine::new(store.clone()));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let engine = engine.clone();
            handles.push(tokio::spawn(async move {
                engine
                    .place_order(OrderRequest::new(None, vec![LineRequest::new(product, 3)]))
                    .await
            }));
        }

        let mut committed_units = 0;
        for handle in handles {
            if handle.await.unwrap().is_ok() {
                committed_units += 3;
            }
        }

        // 10 on hand, requests of 3: exactly three can commit.
        assert_eq!(committed_units, 9);
        assert_eq!(store.get_product(product).await.unwrap().unwrap().quantity, 1);
    }
}
