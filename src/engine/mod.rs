pub mod exceptions;
pub mod lifecycle;
pub mod optimizer;
pub mod routing;
pub mod tracking;
pub mod transitions;

use tracing::warn;

use crate::error::AppError;
use crate::state::AppState;

/// Counts the attempt under `entity` and logs rejections.
pub(crate) fn record_outcome<T>(state: &AppState, entity: &str, result: &Result<T, AppError>) {
    match result {
        Ok(_) => state.metrics.record_transition(entity, "applied"),
        Err(err) => {
            state.metrics.record_transition(entity, err.kind());
            warn!(entity, error = %err, "transition rejected");
        }
    }
}
