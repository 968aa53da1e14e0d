//! HTTP gateway for the storefront system.
//!
//! Translates inbound requests into catalog store calls and fulfillment
//! engine invocations, with structured logging (tracing) and Prometheus
//! metrics.

pub mod config;
pub mod error;
pub mod routes;

use std::sync::Arc;

use axum::Router;
use axum::routing::{delete, get, post, put};
use fulfillment::FulfillmentEngine;
use metrics_exporter_prometheus::PrometheusHandle;
use store::Store;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use routes::AppState;

/// Creates the application state around a store handle.
pub fn create_state<S: Store>(store: S) -> Arc<AppState<S>> {
    Arc::new(AppState {
        engine: FulfillmentEngine::new(store),
    })
}

/// Creates the Axum application router with all routes and shared state.
pub fn create_app<S: Store + 'static>(
    state: Arc<AppState<S>>,
    metrics_handle: PrometheusHandle,
) -> Router {
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::get))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::health::check))
        .route("/api/products", get(routes::products::list::<S>))
        .route("/api/products", post(routes::products::create::<S>))
        .route("/api/products/{id}", get(routes::products::get::<S>))
        .route("/api/products/{id}", put(routes::products::update::<S>))
        .route("/api/products/{id}", delete(routes::products::remove::<S>))
        .route("/api/orders", post(routes::orders::place::<S>))
        .route("/api/orders", get(routes::orders::list::<S>))
        .route("/api/orders/{id}", get(routes::orders::get::<S>))
        .with_state(state)
        .merge(metrics_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}
