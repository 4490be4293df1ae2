use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("not authenticated")]
    Unauthenticated,

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("network failure: {0}")]
    NetworkFailure(String),

    #[error("request rejected ({status}): {detail}")]
    Rejected { status: u16, detail: String },

    #[error("credential storage failed: {0}")]
    Storage(String),

    #[error("unexpected response body: {0}")]
    Decode(String),
}

/// Human-readable message from an error body: `detail` verbatim, else the
/// first field error as `field: message`.
pub fn extract_detail(body: &Value) -> String {
    if let Some(detail) = body.get("detail").and_then(Value::as_str) {
        return detail.to_string();
    }

    if let Some(fields) = body.as_object() {
        for (field, messages) in fields {
            let message = match messages {
                Value::Array(items) => items.first().and_then(Value::as_str),
                Value::String(text) => Some(text.as_str()),
                _ => None,
            };
            if let Some(message) = message {
                return format!("{field}: {message}");
            }
        }
    }

    match body {
        Value::String(text) if !text.is_empty() => text.clone(),
        Value::Null => "no details".to_string(),
        other => other.to_string(),
    }
}
