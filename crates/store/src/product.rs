//! Catalog product records.

use common::{Money, ProductId};
use serde::{Deserialize, Serialize};

/// A catalog product with its on-hand inventory.
///
/// `quantity` is never negative; catalog edits and order commits are the
/// only mutations, and order commits only decrement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    /// Human-assigned stock keeping unit, unique across the catalog.
    pub sku: String,
    pub name: String,
    pub description: String,
    /// Current unit price. Orders capture this at commit time.
    pub price: Money,
    /// Units on hand.
    pub quantity: u32,
}

/// Fields for creating or replacing a product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewProduct {
    pub sku: String,
    pub name: String,
    pub description: String,
    pub price: Money,
    pub quantity: u32,
}

impl NewProduct {
    pub fn new(sku: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            sku: sku.into(),
            name: name.into(),
            description: String::new(),
            price: Money::zero(),
            quantity: 0,
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn price(mut self, price: Money) -> Self {
        self.price = price;
        self
    }

    pub fn quantity(mut self, quantity: u32) -> Self {
        self.quantity = quantity;
        self
    }
}

/// Price and availability of a product as read inside a unit of work.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StockLevel {
    pub price: Money,
    pub quantity: u32,
}
