use async_trait::async_trait;
use common::{CustomerId, Money, OrderId, ProductId};

use crate::{NewProduct, Order, OrderWithLines, Product, Result, StockLevel};

/// A scoped atomic unit of work spanning the inventory rows and the order
/// ledger.
///
/// Everything done through a `StoreTx` takes effect only on `commit`;
/// dropping the handle without committing rolls every write back. Reads made
/// through [`StoreTx::product_for_update`] hold the product row against
/// conflicting concurrent decrements until the unit of work ends, which is
/// what keeps a product from being oversold under racing requests.
#[async_trait]
pub trait StoreTx: Send {
    /// Reads the current price and on-hand quantity of a product, locking
    /// the row for the remainder of the unit of work.
    ///
    /// Returns `None` if the product does not exist.
    async fn product_for_update(&mut self, id: ProductId) -> Result<Option<StockLevel>>;

    /// Appends a new order to the ledger and returns its assigned id.
    async fn insert_order(
        &mut self,
        customer_id: Option<CustomerId>,
        total: Money,
    ) -> Result<OrderId>;

    /// Appends one line to an order, capturing the unit price charged.
    async fn insert_order_line(
        &mut self,
        order_id: OrderId,
        product_id: ProductId,
        quantity: u32,
        unit_price: Money,
    ) -> Result<()>;

    /// Decrements a product's on-hand quantity by `by`, but only if the
    /// current quantity is at least `by`.
    ///
    /// Returns `false` when the guard fails (or the product is gone), in
    /// which case nothing was changed.
    async fn decrement_stock(&mut self, id: ProductId, by: u32) -> Result<bool>;

    /// Makes every write of this unit of work visible, atomically.
    async fn commit(self: Box<Self>) -> Result<()>;
}

/// Core trait for storefront storage backends.
///
/// Covers the product catalog (the inventory store), the order ledger read
/// side, and [`Store::begin`] for the atomic unit of work that order
/// fulfillment runs in. All implementations must be thread-safe
/// (Send + Sync); correctness must hold across multiple processes sharing
/// the same backing database, so implementations must not rely on
/// in-process locking for the oversell guarantee unless they own all state
/// (as the in-memory test store does).
#[async_trait]
pub trait Store: Send + Sync {
    /// Begins an atomic unit of work for order fulfillment.
    async fn begin(&self) -> Result<Box<dyn StoreTx>>;

    /// Lists products, newest first.
    ///
    /// With `search`, restricts to products whose name or SKU contains the
    /// term, case-insensitively.
    async fn list_products(&self, search: Option<&str>) -> Result<Vec<Product>>;

    /// Fetches a single product. Returns `None` if it does not exist.
    async fn get_product(&self, id: ProductId) -> Result<Option<Product>>;

    /// Creates a product. Fails with `DuplicateSku` if the SKU is taken.
    async fn create_product(&self, new: NewProduct) -> Result<Product>;

    /// Replaces every field of a product.
    ///
    /// Returns `None` if the product does not exist. Fails with
    /// `DuplicateSku` if the new SKU collides with another product.
    async fn update_product(&self, id: ProductId, new: NewProduct) -> Result<Option<Product>>;

    /// Deletes a product. Returns `false` if it did not exist; fails with
    /// `ProductReferenced` when committed order lines still reference it.
    async fn delete_product(&self, id: ProductId) -> Result<bool>;

    /// Lists committed orders, newest first.
    async fn list_orders(&self) -> Result<Vec<Order>>;

    /// Reads an order and its lines back by id, lines joined with current
    /// product names for display. Returns `None` if it does not exist.
    async fn get_order(&self, id: OrderId) -> Result<Option<OrderWithLines>>;
}
