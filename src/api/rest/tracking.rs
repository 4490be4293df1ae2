use std::sync::Arc;

use axum::Json;
use axum::Router;
use axum::extract::{Path, State};
use axum::routing::get;

use crate::engine::tracking;
use crate::error::AppError;
use crate::models::tracking::TrackingView;
use crate::state::AppState;

/// Public, unauthenticated lookup by tracking token.
pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/tracking/:token", get(track))
}

async fn track(
    State(state): State<Arc<AppState>>,
    Path(token): Path<String>,
) -> Result<Json<TrackingView>, AppError> {
    Ok(Json(tracking::track(&state, &token)?))
}
