//! Endpoints used from the driver's device. Every call acts as `DRIVER`.
//! The read endpoints resolve the driver from the actor header and only see
//! that driver's routes.

use std::sync::Arc;

use axum::Json;
use axum::Router;
use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::routing::{get, post};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::api::rest::extract::AppJson;
use crate::api::rest::{ACTOR_HEADER, driver_actor};
use crate::engine::lifecycle::{self, PodPayload, StatusUpdate};
use crate::engine::routing;
use crate::error::AppError;
use crate::models::fleet::Driver;
use crate::models::order::{Order, OrderStatus, StopStatus};
use crate::models::route::{Route, RouteDetail};
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/driver/routes/today", get(today_route))
        .route("/driver/routes/:id", get(get_route))
        .route("/driver/routes/:id/start", post(start_route))
        .route("/driver/scan", post(scan))
        .route("/driver/orders/:id/status", post(update_status))
        .route("/driver/orders/:id/pod", post(submit_pod))
        .route(
            "/driver/orders/:id/stops/:stop_id/status",
            post(update_stop_status),
        )
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusRequest {
    pub to_status: OrderStatus,
    #[serde(flatten)]
    pub update: StatusUpdate,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StopStatusRequest {
    pub to_status: StopStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanRequest {
    pub code: String,
}

async fn today_route(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<RouteDetail>, AppError> {
    let driver = current_driver(&state, &headers)?;
    let today = Utc::now().date_naive();

    // Open routes first, then the earliest planned.
    let route = state
        .routes
        .iter()
        .filter(|entry| entry.driver_id == driver.id && entry.route_date == today)
        .map(|entry| entry.value().clone())
        .min_by_key(|route| (!route.status.is_open(), route.created_at))
        .ok_or_else(|| {
            AppError::NotFound(format!("no route assigned to {} for today", driver.name))
        })?;

    Ok(Json(route_detail(&state, route)))
}

async fn get_route(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
) -> Result<Json<RouteDetail>, AppError> {
    let driver = current_driver(&state, &headers)?;
    let route = state
        .route(id)
        .ok()
        .filter(|route| route.driver_id == driver.id)
        .ok_or_else(|| AppError::NotFound(format!("route {id} not found")))?;

    Ok(Json(route_detail(&state, route)))
}

/// Resolves a scanned reference code among the driver's own routes.
async fn scan(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    AppJson(payload): AppJson<ScanRequest>,
) -> Result<Json<Order>, AppError> {
    let driver = current_driver(&state, &headers)?;
    let code = payload.code.trim();
    if code.is_empty() {
        return Err(AppError::validation("code", "this field may not be blank"));
    }

    let order_id = state.reference_index.get(code).map(|entry| *entry.value());
    let order = order_id
        .and_then(|id| state.order(id).ok())
        .filter(|order| {
            order
                .route_id
                .and_then(|route_id| state.routes.get(&route_id).map(|route| route.driver_id))
                == Some(driver.id)
        })
        .ok_or_else(|| AppError::NotFound(format!("order {code} is not on your routes")))?;

    Ok(Json(order))
}

async fn start_route(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
) -> Result<Json<Route>, AppError> {
    let route = routing::start_route(&state, id, &driver_actor(&headers))?;
    Ok(Json(route))
}

async fn update_status(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
    AppJson(payload): AppJson<StatusRequest>,
) -> Result<Json<Order>, AppError> {
    let order = lifecycle::update_status(
        &state,
        id,
        payload.to_status,
        payload.update,
        &driver_actor(&headers),
    )?;
    Ok(Json(order))
}

async fn submit_pod(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
    AppJson(payload): AppJson<PodPayload>,
) -> Result<Json<Order>, AppError> {
    let order = lifecycle::submit_pod(&state, id, payload, &driver_actor(&headers))?;
    Ok(Json(order))
}

async fn update_stop_status(
    State(state): State<Arc<AppState>>,
    Path((id, stop_id)): Path<(Uuid, Uuid)>,
    headers: HeaderMap,
    AppJson(payload): AppJson<StopStatusRequest>,
) -> Result<Json<Order>, AppError> {
    let order = lifecycle::transition_stop(
        &state,
        id,
        stop_id,
        payload.to_status,
        &driver_actor(&headers),
    )?;
    Ok(Json(order))
}

fn current_driver(state: &AppState, headers: &HeaderMap) -> Result<Driver, AppError> {
    let Some(raw) = driver_actor(headers).id else {
        return Err(AppError::validation(
            ACTOR_HEADER,
            "driver endpoints need the driver's id",
        ));
    };

    Uuid::parse_str(&raw)
        .ok()
        .and_then(|id| state.drivers.get(&id).map(|entry| entry.value().clone()))
        .ok_or_else(|| AppError::NotFound(format!("driver {raw} not found")))
}

fn route_detail(state: &AppState, route: Route) -> RouteDetail {
    let orders = route
        .order_ids
        .iter()
        .filter_map(|order_id| state.order(*order_id).ok())
        .collect();
    RouteDetail { route, orders }
}
