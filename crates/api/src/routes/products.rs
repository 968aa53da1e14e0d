//! Product catalog CRUD endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use common::{Money, ProductId};
use serde::{Deserialize, Serialize};
use store::{NewProduct, Product, Store};

use super::AppState;
use crate::error::ApiError;

// -- Request types --

#[derive(Deserialize)]
pub struct ProductPayload {
    pub sku: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub price_cents: i64,
    #[serde(default)]
    pub quantity: u32,
}

impl ProductPayload {
    fn into_new_product(self) -> Result<NewProduct, ApiError> {
        if self.sku.trim().is_empty() || self.name.trim().is_empty() {
            return Err(ApiError::BadRequest(
                "SKU and name are required".to_string(),
            ));
        }
        if self.price_cents < 0 {
            return Err(ApiError::BadRequest(
                "price must be non-negative".to_string(),
            ));
        }
        // The store holds quantity in a 32-bit signed column.
        if i32::try_from(self.quantity).is_err() {
            return Err(ApiError::BadRequest("quantity is too large".to_string()));
        }

        Ok(NewProduct::new(self.sku.trim(), self.name.trim())
            .description(self.description)
            .price(Money::from_cents(self.price_cents))
            .quantity(self.quantity))
    }
}

#[derive(Deserialize)]
pub struct ListQuery {
    /// Optional search term matched against name and SKU.
    pub q: Option<String>,
}

// -- Response types --

#[derive(Serialize)]
pub struct ProductResponse {
    pub id: i64,
    pub sku: String,
    pub name: String,
    pub description: String,
    pub price_cents: i64,
    pub quantity: u32,
}

impl From<Product> for ProductResponse {
    fn from(p: Product) -> Self {
        Self {
            id: p.id.as_i64(),
            sku: p.sku,
            name: p.name,
            description: p.description,
            price_cents: p.price.cents(),
            quantity: p.quantity,
        }
    }
}

#[derive(Serialize)]
pub struct DeleteResponse {
    pub success: bool,
}

// -- Handlers --

/// GET /api/products — list products, optionally filtered by search term.
#[tracing::instrument(skip(state, query))]
pub async fn list<S: Store + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<ProductResponse>>, ApiError> {
    let products = state.store().list_products(query.q.as_deref()).await?;
    Ok(Json(products.into_iter().map(Into::into).collect()))
}

/// GET /api/products/:id — fetch a single product.
#[tracing::instrument(skip(state))]
pub async fn get<S: Store + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<i64>,
) -> Result<Json<ProductResponse>, ApiError> {
    let product = state
        .store()
        .get_product(ProductId::new(id))
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Product {id} not found")))?;

    Ok(Json(product.into()))
}

/// POST /api/products — create a product.
#[tracing::instrument(skip(state, payload))]
pub async fn create<S: Store + 'static>(
    State(state): State<Arc<AppState<S>>>,
    payload: Result<Json<ProductPayload>, JsonRejection>,
) -> Result<(StatusCode, Json<ProductResponse>), ApiError> {
    let Json(payload) = payload.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    let new = payload.into_new_product()?;
    let product = state.store().create_product(new).await?;
    Ok((StatusCode::CREATED, Json(product.into())))
}

/// PUT /api/products/:id — replace every field of a product.
#[tracing::instrument(skip(state, payload))]
pub async fn update<S: Store + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<i64>,
    payload: Result<Json<ProductPayload>, JsonRejection>,
) -> Result<Json<ProductResponse>, ApiError> {
    let Json(payload) = payload.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    let new = payload.into_new_product()?;
    let product = state
        .store()
        .update_product(ProductId::new(id), new)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Product {id} not found")))?;

    Ok(Json(product.into()))
}

/// DELETE /api/products/:id — delete a product.
#[tracing::instrument(skip(state))]
pub async fn remove<S: Store + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<i64>,
) -> Result<Json<DeleteResponse>, ApiError> {
    let deleted = state.store().delete_product(ProductId::new(id)).await?;
    if !deleted {
        return Err(ApiError::NotFound(format!("Product {id} not found")));
    }
    Ok(Json(DeleteResponse { success: true }))
}
