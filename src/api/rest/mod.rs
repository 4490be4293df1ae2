pub mod driver;
pub mod exceptions;
pub mod extract;
pub mod fleet;
pub mod orders;
pub mod routes;
pub mod tracking;
pub mod ws;

use std::sync::Arc;

use axum::Json;
use axum::Router;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::get;
use serde::Serialize;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;

use crate::models::history::Actor;
use crate::state::AppState;

pub(crate) const ACTOR_HEADER: &str = "x-actor-id";

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .merge(fleet::router())
        .merge(orders::router())
        .merge(routes::router())
        .merge(driver::router())
        .merge(exceptions::router())
        .merge(tracking::router())
        .route("/health", get(health))
        .route("/metrics", get(metrics))
        .route("/ws", get(ws::ws_handler))
        .route("/ws/tracking/:token", get(ws::tracking_ws_handler))
        .with_state(state)
        .layer(CorsLayer::permissive())
        .fallback_service(ServeDir::new("static"))
}

pub(crate) fn ops_actor(headers: &HeaderMap) -> Actor {
    Actor::ops(actor_id(headers))
}

pub(crate) fn driver_actor(headers: &HeaderMap) -> Actor {
    Actor::driver(actor_id(headers))
}

fn actor_id(headers: &HeaderMap) -> Option<String> {
    headers
        .get(ACTOR_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    orders: usize,
    routes: usize,
    drivers: usize,
    open_exceptions: i64,
}

async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        orders: state.orders.len(),
        routes: state.routes.len(),
        drivers: state.drivers.len(),
        open_exceptions: state.metrics.open_exceptions.get(),
    })
}

async fn metrics(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    match state.metrics.encode() {
        Ok(body) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            body,
        )
            .into_response(),
        Err(err) => (StatusCode::INTERNAL_SERVER_ERROR, err).into_response(),
    }
}
