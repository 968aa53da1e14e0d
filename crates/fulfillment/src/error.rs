use common::ProductId;
use store::StoreError;
use thiserror::Error;

/// Errors that can occur while placing an order.
///
/// Business-rule failures (`ProductNotFound`, `InsufficientStock`) are
/// deterministic given current state and are never retried internally.
/// `Storage` failures always follow a full rollback, so the whole
/// operation is safe to retry.
#[derive(Debug, Error)]
pub enum FulfillmentError {
    /// Malformed request. No store access was attempted.
    #[error("invalid order request: {0}")]
    InvalidRequest(&'static str),

    /// A referenced product does not exist.
    #[error("product {0} not found")]
    ProductNotFound(ProductId),

    /// Requested quantity exceeds what is on hand.
    #[error("insufficient stock for product {0}")]
    InsufficientStock(ProductId),

    /// The underlying store could not complete the unit of work.
    #[error("storage failure: {0}")]
    Storage(#[from] StoreError),
}
