use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::fleet::GeoPoint;
use crate::models::order::OrderStatus;
use crate::models::route::RouteStatus;

/// Pushed to dashboard subscribers on `/ws`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DispatchEvent {
    OrderUpdated {
        order_id: Uuid,
        reference_code: String,
        from_status: Option<OrderStatus>,
        to_status: OrderStatus,
        at: DateTime<Utc>,
    },
    RouteUpdated {
        route_id: Uuid,
        status: RouteStatus,
        at: DateTime<Utc>,
    },
    DriverLocation {
        driver_id: Uuid,
        location: GeoPoint,
        at: DateTime<Utc>,
    },
}
