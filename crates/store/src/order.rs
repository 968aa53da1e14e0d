//! Order ledger records.

use chrono::{DateTime, Utc};
use common::{CustomerId, Money, OrderId, ProductId};
use serde::{Deserialize, Serialize};

/// A committed order. Immutable once written to the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub customer_id: Option<CustomerId>,
    /// Sum of line extensions at commit time.
    pub total: Money,
    pub created_at: DateTime<Utc>,
}

/// A line belonging to exactly one committed order.
///
/// `unit_price` is the price snapshot captured when the order committed;
/// it is stored, never recomputed from the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderLine {
    pub product_id: ProductId,
    /// Product name at read time, joined in for display.
    pub product_name: String,
    pub quantity: u32,
    pub unit_price: Money,
}

/// An order together with its lines, as read back from the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderWithLines {
    pub order: Order,
    pub lines: Vec<OrderLine>,
}
