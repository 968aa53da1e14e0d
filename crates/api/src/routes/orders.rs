//! Order placement and read-back endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use common::{CustomerId, OrderId, ProductId};
use fulfillment::{LineRequest, OrderRequest};
use serde::{Deserialize, Serialize};
use store::{Order, OrderLine, Store};

use super::AppState;
use crate::error::ApiError;

// -- Request types --

#[derive(Deserialize)]
pub struct PlaceOrderRequest {
    pub customer_id: Option<i64>,
    pub items: Vec<OrderItemRequest>,
}

#[derive(Deserialize)]
pub struct OrderItemRequest {
    pub product_id: i64,
    pub quantity: u32,
}

// -- Response types --

#[derive(Serialize)]
pub struct PlaceOrderResponse {
    pub order_id: i64,
    /// Two-decimal rendering of the total actually charged.
    pub total: String,
    pub total_cents: i64,
}

#[derive(Serialize)]
pub struct OrderResponse {
    pub id: i64,
    pub customer_id: Option<i64>,
    pub total: String,
    pub total_cents: i64,
    pub created_at: String,
}

impl From<Order> for OrderResponse {
    fn from(o: Order) -> Self {
        Self {
            id: o.id.as_i64(),
            customer_id: o.customer_id.map(|c| c.as_i64()),
            total: o.total.to_decimal_string(),
            total_cents: o.total.cents(),
            created_at: o.created_at.to_rfc3339(),
        }
    }
}

#[derive(Serialize)]
pub struct OrderLineResponse {
    pub product_id: i64,
    pub product_name: String,
    pub quantity: u32,
    pub unit_price_cents: i64,
}

impl From<OrderLine> for OrderLineResponse {
    fn from(l: OrderLine) -> Self {
        Self {
            product_id: l.product_id.as_i64(),
            product_name: l.product_name,
            quantity: l.quantity,
            unit_price_cents: l.unit_price.cents(),
        }
    }
}

#[derive(Serialize)]
pub struct OrderDetailResponse {
    #[serde(flatten)]
    pub order: OrderResponse,
    pub items: Vec<OrderLineResponse>,
}

// -- Handlers --

/// POST /api/orders — place an order through the fulfillment engine.
#[tracing::instrument(skip(state, req))]
pub async fn place<S: Store + 'static>(
    State(state): State<Arc<AppState<S>>>,
    req: Result<Json<PlaceOrderRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<PlaceOrderResponse>), ApiError> {
    let Json(req) = req.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    let lines = req
        .items
        .iter()
        .map(|item| LineRequest::new(ProductId::new(item.product_id), item.quantity))
        .collect();

    let receipt = state
        .engine
        .place_order(OrderRequest::new(req.customer_id.map(CustomerId::new), lines))
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(PlaceOrderResponse {
            order_id: receipt.order_id.as_i64(),
            total: receipt.total.to_decimal_string(),
            total_cents: receipt.total.cents(),
        }),
    ))
}

/// GET /api/orders — list committed orders, newest first.
#[tracing::instrument(skip(state))]
pub async fn list<S: Store + 'static>(
    State(state): State<Arc<AppState<S>>>,
) -> Result<Json<Vec<OrderResponse>>, ApiError> {
    let orders = state.store().list_orders().await?;
    Ok(Json(orders.into_iter().map(Into::into).collect()))
}

/// GET /api/orders/:id — read an order and its lines back.
#[tracing::instrument(skip(state))]
pub async fn get<S: Store + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<i64>,
) -> Result<Json<OrderDetailResponse>, ApiError> {
    let read = state
        .store()
        .get_order(OrderId::new(id))
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Order {id} not found")))?;

    Ok(Json(OrderDetailResponse {
        order: read.order.into(),
        items: read.lines.into_iter().map(Into::into).collect(),
    }))
}
