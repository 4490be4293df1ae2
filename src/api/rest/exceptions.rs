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
use crate::engine::exceptions::{self, NewException};
use crate::error::AppError;
use crate::models::exception::{ExceptionStatus, LogisticsException};
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/exceptions", get(list_exceptions).post(record_exception))
        .route("/exceptions/:id/ack", post(acknowledge))
        .route("/exceptions/:id/resolve", post(resolve))
}

#[derive(Debug, Deserialize)]
pub struct ExceptionFilter {
    pub status: Option<ExceptionStatus>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AcknowledgeRequest {
    #[serde(default)]
    pub note: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolveRequest {
    #[serde(default)]
    pub resolution: String,
}

async fn list_exceptions(
    State(state): State<Arc<AppState>>,
    Query(filter): Query<ExceptionFilter>,
) -> Json<Vec<LogisticsException>> {
    let mut found: Vec<LogisticsException> = state
        .exceptions
        .iter()
        .filter(|entry| filter.status.is_none_or(|status| entry.status == status))
        .map(|entry| entry.value().clone())
        .collect();
    found.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    Json(found)
}

async fn record_exception(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    AppJson(payload): AppJson<NewException>,
) -> Result<Json<LogisticsException>, AppError> {
    let actor = ops_actor(&headers);
    let exception = exceptions::record_exception(&state, payload, actor.id)?;
    Ok(Json(exception))
}

async fn acknowledge(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    AppJson(payload): AppJson<AcknowledgeRequest>,
) -> Result<Json<LogisticsException>, AppError> {
    Ok(Json(exceptions::acknowledge(&state, id, payload.note)?))
}

async fn resolve(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    AppJson(payload): AppJson<ResolveRequest>,
) -> Result<Json<LogisticsException>, AppError> {
    Ok(Json(exceptions::resolve(&state, id, payload.resolution)?))
}
