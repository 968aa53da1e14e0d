pub mod health;
pub mod metrics;
pub mod orders;
pub mod products;

use fulfillment::FulfillmentEngine;
use store::Store;

/// Shared application state accessible from all handlers.
pub struct AppState<S: Store> {
    pub engine: FulfillmentEngine<S>,
}

impl<S: Store> AppState<S> {
    /// The store handle behind the engine, for catalog and read-back routes.
    pub fn store(&self) -> &S {
        self.engine.store()
    }
}
