//! Transient request and receipt types crossing the engine boundary.

use common::{CustomerId, Money, OrderId, ProductId};
use serde::{Deserialize, Serialize};

/// One (product, quantity) pair within an order request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineRequest {
    pub product_id: ProductId,
    pub quantity: u32,
}

impl LineRequest {
    pub fn new(product_id: ProductId, quantity: u32) -> Self {
        Self {
            product_id,
            quantity,
        }
    }
}

/// A purchase request. Exists only for the duration of one
/// [`FulfillmentEngine::place_order`](crate::FulfillmentEngine::place_order)
/// invocation; never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderRequest {
    pub customer_id: Option<CustomerId>,
    /// Line requests, validated and applied in the given order.
    pub lines: Vec<LineRequest>,
}

impl OrderRequest {
    pub fn new(customer_id: Option<CustomerId>, lines: Vec<LineRequest>) -> Self {
        Self { customer_id, lines }
    }
}

/// Returned on successful commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Receipt {
    pub order_id: OrderId,
    /// The total actually charged, consistent with the committed line prices.
    pub total: Money,
}
