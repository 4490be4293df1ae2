use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExceptionType {
    Delay,
    FailedAttempt,
    WrongAddress,
    CustomerUnavailable,
    Damaged,
    Other,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExceptionStatus {
    Open,
    Acknowledged,
    Resolved,
}

impl ExceptionStatus {
    pub const ALL: [ExceptionStatus; 3] = [
        ExceptionStatus::Open,
        ExceptionStatus::Acknowledged,
        ExceptionStatus::Resolved,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ExceptionStatus::Open => "OPEN",
            ExceptionStatus::Acknowledged => "ACKNOWLEDGED",
            ExceptionStatus::Resolved => "RESOLVED",
        }
    }
}

impl fmt::Display for ExceptionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogisticsException {
    pub id: Uuid,
    pub order_id: Uuid,
    #[serde(rename = "type")]
    pub exception_type: ExceptionType,
    pub status: ExceptionStatus,
    pub description: String,
    pub acknowledgement_note: Option<String>,
    pub resolution: Option<String>,
    pub created_by: Option<String>,
    pub created_at: DateTime<Utc>,
    pub acknowledged_at: Option<DateTime<Utc>>,
    pub resolved_at: Option<DateTime<Utc>>,
}

impl LogisticsException {
    pub fn label(&self) -> String {
        format!("exception {}", self.id)
    }
}
