use std::sync::Arc;

use axum::Json;
use axum::Router;
use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::routing::{get, post};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::api::rest::extract::AppJson;
use crate::api::rest::ops_actor;
use crate::engine::routing::{self, NewRoute};
use crate::error::AppError;
use crate::models::route::Route;
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/routes", get(list_routes).post(create_route))
        .route("/routes/:id", get(get_route))
        .route("/routes/:id/reorder", post(reorder_route))
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReorderRequest {
    pub stop_order: Vec<Uuid>,
}

async fn create_route(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    AppJson(payload): AppJson<NewRoute>,
) -> Result<Json<Route>, AppError> {
    let route = routing::create_route(&state, payload, &ops_actor(&headers)).await?;
    Ok(Json(route))
}

async fn list_routes(State(state): State<Arc<AppState>>) -> Json<Vec<Route>> {
    let mut routes: Vec<Route> = state
        .routes
        .iter()
        .map(|entry| entry.value().clone())
        .collect();
    routes.sort_by(|a, b| {
        b.route_date
            .cmp(&a.route_date)
            .then(b.created_at.cmp(&a.created_at))
    });
    Json(routes)
}

async fn get_route(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Route>, AppError> {
    Ok(Json(state.route(id)?))
}

async fn reorder_route(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    AppJson(payload): AppJson<ReorderRequest>,
) -> Result<Json<Route>, AppError> {
    let route = routing::reorder_stops(&state, id, payload.stop_order)?;
    Ok(Json(route))
}
