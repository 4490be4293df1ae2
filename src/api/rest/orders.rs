use std::sync::Arc;

use axum::Json;
use axum::Router;
use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::routing::{get, post};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::api::rest::extract::AppJson;
use crate::api::rest::ops_actor;
use crate::engine::lifecycle::{self, NewOrder};
use crate::engine::routing;
use crate::error::AppError;
use crate::models::history::StatusHistoryEntry;
use crate::models::order::{Order, OrderStatus};
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/orders", get(list_orders).post(create_order))
        .route("/orders/:id", get(get_order))
        .route("/orders/:id/history", get(order_history))
        .route("/orders/:id/cancel", post(cancel_order))
        .route("/orders/:id/reassign", post(reassign_order))
}

#[derive(Debug, Deserialize)]
pub struct OrderFilter {
    pub status: Option<OrderStatus>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CancelRequest {
    #[serde(default)]
    pub reason: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReassignRequest {
    pub target_route_id: Uuid,
    #[serde(default)]
    pub note: String,
}

async fn create_order(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    AppJson(payload): AppJson<NewOrder>,
) -> Result<Json<Order>, AppError> {
    let order = lifecycle::create_order(&state, payload, &ops_actor(&headers))?;
    Ok(Json(order))
}

async fn list_orders(
    State(state): State<Arc<AppState>>,
    Query(filter): Query<OrderFilter>,
) -> Json<Vec<Order>> {
    let mut orders: Vec<Order> = state
        .orders
        .iter()
        .filter(|entry| filter.status.is_none_or(|status| entry.status == status))
        .map(|entry| entry.value().clone())
        .collect();
    orders.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    Json(orders)
}

async fn get_order(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Order>, AppError> {
    Ok(Json(state.order(id)?))
}

async fn order_history(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<StatusHistoryEntry>>, AppError> {
    let order = state.order(id)?;
    Ok(Json(order.history().to_vec()))
}

async fn cancel_order(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
    AppJson(payload): AppJson<CancelRequest>,
) -> Result<Json<Order>, AppError> {
    let order = lifecycle::cancel_order(&state, id, payload.reason, &ops_actor(&headers))?;
    Ok(Json(order))
}

async fn reassign_order(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
    AppJson(payload): AppJson<ReassignRequest>,
) -> Result<Json<Order>, AppError> {
    let order = routing::reassign_order(
        &state,
        id,
        payload.target_route_id,
        payload.note,
        &ops_actor(&headers),
    )?;
    Ok(Json(order))
}
