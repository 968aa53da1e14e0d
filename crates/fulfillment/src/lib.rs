//! Order fulfillment: turns a purchase request into a committed order
//! while keeping on-hand inventory consistent.
//!
//! The engine validates availability, prices the order from the stock
//! levels it reads, and commits the order, its lines, and the inventory
//! decrements as one atomic unit of work against the backing store.

pub mod engine;
pub mod error;
pub mod request;

pub use engine::FulfillmentEngine;
pub use error::FulfillmentError;
pub use request::{LineRequest, OrderRequest, Receipt};
