use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::order::{OrderStatus, StopStatus, StopType};

/// Customer-safe view of an order, served without authentication.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TrackingView {
    pub reference_code: String,
    pub customer_name: String,
    pub status: OrderStatus,
    pub stops: Vec<TrackingStop>,
    pub pod_summary: Option<PodSummary>,
    pub last_update: DateTime<Utc>,
    pub driver_eta: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TrackingStop {
    pub sequence_index: u32,
    #[serde(rename = "type")]
    pub stop_type: StopType,
    pub address_line: String,
    pub city: String,
    pub status: StopStatus,
    pub scheduled_eta: Option<DateTime<Utc>>,
    pub actual_arrival_time: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PodSummary {
    pub receiver_name: String,
    pub delivered_at: DateTime<Utc>,
}

/// Pushed to customers following one order on `/ws/tracking/{token}`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum TrackingEvent {
    #[serde(rename = "connected")]
    Connected {
        reference_code: String,
        status: OrderStatus,
    },
    #[serde(rename = "order.updated")]
    OrderUpdated {
        status: OrderStatus,
        updated_at: DateTime<Utc>,
    },
}
