pub mod error;
pub mod memory;
pub mod order;
pub mod postgres;
pub mod product;
pub mod store;

pub use common::{CustomerId, Money, OrderId, ProductId};
pub use error::{Result, StoreError};
pub use memory::InMemoryStore;
pub use order::{Order, OrderLine, OrderWithLines};
pub use postgres::PostgresStore;
pub use product::{NewProduct, Product, StockLevel};
pub use store::{Store, StoreTx};
