use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::engine::record_outcome;
use crate::engine::transitions::can_transition_exception;
use crate::error::AppError;
use crate::models::exception::{ExceptionStatus, ExceptionType, LogisticsException};
use crate::state::AppState;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewException {
    pub order_id: Uuid,
    #[serde(rename = "type")]
    pub exception_type: ExceptionType,
    #[serde(default)]
    pub description: String,
}

pub fn record_exception(
    state: &AppState,
    input: NewException,
    created_by: Option<String>,
) -> Result<LogisticsException, AppError> {
    let result = open(state, input, created_by);
    record_outcome(state, "exception", &result);
    result
}

pub fn acknowledge(
    state: &AppState,
    exception_id: Uuid,
    note: String,
) -> Result<LogisticsException, AppError> {
    let result = advance(state, exception_id, ExceptionStatus::Acknowledged, note);
    record_outcome(state, "exception", &result);
    result
}

/// Closes an acknowledged exception. The resolution text is required.
pub fn resolve(
    state: &AppState,
    exception_id: Uuid,
    resolution: String,
) -> Result<LogisticsException, AppError> {
    let result = advance(state, exception_id, ExceptionStatus::Resolved, resolution);
    record_outcome(state, "exception", &result);
    result
}

fn open(
    state: &AppState,
    input: NewException,
    created_by: Option<String>,
) -> Result<LogisticsException, AppError> {
    let order = state.order(input.order_id)?;

    let exception = LogisticsException {
        id: Uuid::new_v4(),
        order_id: order.id,
        exception_type: input.exception_type,
        status: ExceptionStatus::Open,
        description: input.description.trim().to_string(),
        acknowledgement_note: None,
        resolution: None,
        created_by,
        created_at: Utc::now(),
        acknowledged_at: None,
        resolved_at: None,
    };
    state.exceptions.insert(exception.id, exception.clone());
    state.metrics.open_exceptions.inc();

    info!(
        exception_id = %exception.id,
        reference_code = %order.reference_code,
        kind = ?exception.exception_type,
        "exception recorded"
    );

    Ok(exception)
}

fn advance(
    state: &AppState,
    exception_id: Uuid,
    to: ExceptionStatus,
    text: String,
) -> Result<LogisticsException, AppError> {
    let _gate = state.write_gate()?;
    let mut exception = state
        .exceptions
        .get(&exception_id)
        .map(|entry| entry.value().clone())
        .ok_or_else(|| AppError::NotFound(format!("exception {exception_id} not found")))?;

    if !can_transition_exception(exception.status, to) {
        return Err(AppError::invalid_transition(
            exception.label(),
            exception.status,
            to,
        ));
    }

    let text = text.trim().to_string();
    let now = Utc::now();
    match to {
        ExceptionStatus::Acknowledged => {
            exception.acknowledgement_note = (!text.is_empty()).then_some(text);
            exception.acknowledged_at = Some(now);
        }
        ExceptionStatus::Resolved => {
            if text.is_empty() {
                return Err(AppError::validation(
                    "resolution",
                    "a resolution is required",
                ));
            }
            exception.resolution = Some(text);
            exception.resolved_at = Some(now);
            state.metrics.open_exceptions.dec();
        }
        ExceptionStatus::Open => {}
    }
    exception.status = to;
    state.exceptions.insert(exception.id, exception.clone());

    info!(exception_id = %exception.id, status = %to, "exception updated");
    Ok(exception)
}
