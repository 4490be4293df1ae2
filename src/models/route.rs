use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::order::Order;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RouteStatus {
    Planned,
    InProgress,
    Completed,
    Cancelled,
}

impl RouteStatus {
    pub const ALL: [RouteStatus; 4] = [
        RouteStatus::Planned,
        RouteStatus::InProgress,
        RouteStatus::Completed,
        RouteStatus::Cancelled,
    ];

    /// Routes that still accept orders and stop changes.
    pub fn is_open(self) -> bool {
        matches!(self, RouteStatus::Planned | RouteStatus::InProgress)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RouteStatus::Planned => "PLANNED",
            RouteStatus::InProgress => "IN_PROGRESS",
            RouteStatus::Completed => "COMPLETED",
            RouteStatus::Cancelled => "CANCELLED",
        }
    }
}

impl fmt::Display for RouteStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One entry of the driver's visiting sequence across every order on the route.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct RouteStop {
    pub order_id: Uuid,
    pub stop_id: Uuid,
    pub sequence_index: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Route {
    pub id: Uuid,
    pub route_date: NaiveDate,
    pub driver_id: Uuid,
    pub vehicle_id: Uuid,
    pub status: RouteStatus,
    pub order_ids: Vec<Uuid>,
    pub stops: Vec<RouteStop>,
    pub optimized: bool,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub notes: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A route together with the orders on it, as the driver's app shows it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouteDetail {
    #[serde(flatten)]
    pub route: Route,
    pub orders: Vec<Order>,
}

impl Route {
    pub fn label(&self) -> String {
        format!("route {}", self.id)
    }

    pub fn stop_ids(&self) -> Vec<Uuid> {
        self.stops.iter().map(|stop| stop.stop_id).collect()
    }

    /// Appends the order and its stops, in the order's own sequence, at the end.
    pub(crate) fn attach(&mut self, order: &Order) {
        self.order_ids.push(order.id);
        let mut stops: Vec<_> = order.stops.iter().collect();
        stops.sort_by_key(|stop| stop.sequence_index);
        for stop in stops {
            self.stops.push(RouteStop {
                order_id: order.id,
                stop_id: stop.id,
                sequence_index: 0,
            });
        }
        self.renumber();
        self.updated_at = Utc::now();
    }

    pub(crate) fn detach(&mut self, order_id: Uuid) {
        self.order_ids.retain(|id| *id != order_id);
        self.stops.retain(|stop| stop.order_id != order_id);
        self.renumber();
        self.updated_at = Utc::now();
    }

    /// Rebuilds the sequence from stop ids already validated as a permutation.
    pub(crate) fn apply_sequence(&mut self, stop_ids: &[Uuid]) {
        let mut reordered = Vec::with_capacity(self.stops.len());
        for stop_id in stop_ids {
            if let Some(stop) = self.stops.iter().find(|stop| stop.stop_id == *stop_id) {
                reordered.push(*stop);
            }
        }
        self.stops = reordered;
        self.renumber();
        self.updated_at = Utc::now();
    }

    fn renumber(&mut self) {
        for (index, stop) in (1u32..).zip(self.stops.iter_mut()) {
            stop.sequence_index = index;
        }
    }
}
