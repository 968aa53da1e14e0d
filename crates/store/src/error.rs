use common::ProductId;
use thiserror::Error;

/// Errors that can occur when interacting with the store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A product with the same SKU already exists.
    #[error("SKU already exists: {0}")]
    DuplicateSku(String),

    /// The product cannot be deleted because committed order lines reference it.
    #[error("product {0} is referenced by existing order lines")]
    ProductReferenced(ProductId),

    /// A database error occurred.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A database migration error occurred.
    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
