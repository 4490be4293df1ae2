use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::fleet::GeoPoint;
use crate::models::history::StatusHistoryEntry;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    Created,
    Assigned,
    PickedUp,
    InTransit,
    Delivered,
    Failed,
    Cancelled,
}

impl OrderStatus {
    pub const ALL: [OrderStatus; 7] = [
        OrderStatus::Created,
        OrderStatus::Assigned,
        OrderStatus::PickedUp,
        OrderStatus::InTransit,
        OrderStatus::Delivered,
        OrderStatus::Failed,
        OrderStatus::Cancelled,
    ];

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            OrderStatus::Delivered | OrderStatus::Failed | OrderStatus::Cancelled
        )
    }

    /// Statuses that require the order to sit on a route.
    pub fn is_on_route(self) -> bool {
        matches!(
            self,
            OrderStatus::Assigned | OrderStatus::PickedUp | OrderStatus::InTransit
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            OrderStatus::Created => "CREATED",
            OrderStatus::Assigned => "ASSIGNED",
            OrderStatus::PickedUp => "PICKED_UP",
            OrderStatus::InTransit => "IN_TRANSIT",
            OrderStatus::Delivered => "DELIVERED",
            OrderStatus::Failed => "FAILED",
            OrderStatus::Cancelled => "CANCELLED",
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StopType {
    Pickup,
    Drop,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StopStatus {
    Pending,
    Arrived,
    Completed,
    Skipped,
}

impl StopStatus {
    pub const ALL: [StopStatus; 4] = [
        StopStatus::Pending,
        StopStatus::Arrived,
        StopStatus::Completed,
        StopStatus::Skipped,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            StopStatus::Pending => "PENDING",
            StopStatus::Arrived => "ARRIVED",
            StopStatus::Completed => "COMPLETED",
            StopStatus::Skipped => "SKIPPED",
        }
    }
}

impl fmt::Display for StopStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Stop {
    pub id: Uuid,
    pub sequence_index: u32,
    #[serde(rename = "type")]
    pub stop_type: StopType,
    pub address_line: String,
    #[serde(default)]
    pub city: String,
    #[serde(default)]
    pub state: String,
    #[serde(default)]
    pub postal_code: String,
    pub location: Option<GeoPoint>,
    pub status: StopStatus,
    pub scheduled_eta: Option<DateTime<Utc>>,
    pub actual_arrival_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub notes: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProofOfDelivery {
    pub id: Uuid,
    pub receiver_name: String,
    pub delivered_at: DateTime<Utc>,
    pub notes: Option<String>,
    pub photo_url: Option<String>,
}

/// Customer-agreed pickup and drop windows. Any bound may be left open.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct TimeWindows {
    #[serde(default)]
    pub pickup_window_start: Option<DateTime<Utc>>,
    #[serde(default)]
    pub pickup_window_end: Option<DateTime<Utc>>,
    #[serde(default)]
    pub drop_window_start: Option<DateTime<Utc>>,
    #[serde(default)]
    pub drop_window_end: Option<DateTime<Utc>>,
}

impl TimeWindows {
    /// Name of the first window end that precedes its start.
    pub fn inverted(&self) -> Option<&'static str> {
        let bounds = [
            (self.pickup_window_start, self.pickup_window_end, "pickup_window_end"),
            (self.drop_window_start, self.drop_window_end, "drop_window_end"),
        ];
        bounds.into_iter().find_map(|(start, end, field)| match (start, end) {
            (Some(start), Some(end)) if end < start => Some(field),
            _ => None,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: Uuid,
    pub reference_code: String,
    pub tracking_token: String,
    pub status: OrderStatus,
    pub customer_name: String,
    pub customer_phone: String,
    pub customer_email: Option<String>,
    #[serde(default)]
    pub notes: String,
    #[serde(flatten)]
    pub windows: TimeWindows,
    pub stops: Vec<Stop>,
    pub route_id: Option<Uuid>,
    pub pod: Option<ProofOfDelivery>,
    #[serde(default)]
    history: Vec<StatusHistoryEntry>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    pub(crate) fn new(
        reference_code: String,
        tracking_token: String,
        customer_name: String,
        customer_phone: String,
        customer_email: Option<String>,
        notes: String,
        stops: Vec<Stop>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            reference_code,
            tracking_token,
            status: OrderStatus::Created,
            customer_name,
            customer_phone,
            customer_email,
            notes,
            windows: TimeWindows::default(),
            stops,
            route_id: None,
            pod: None,
            history: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn history(&self) -> &[StatusHistoryEntry] {
        &self.history
    }

    pub(crate) fn record(&mut self, entry: StatusHistoryEntry) {
        self.updated_at = entry.at;
        self.history.push(entry);
    }

    pub fn stop(&self, stop_id: Uuid) -> Option<&Stop> {
        self.stops.iter().find(|stop| stop.id == stop_id)
    }

    pub(crate) fn stop_mut(&mut self, stop_id: Uuid) -> Option<&mut Stop> {
        self.stops.iter_mut().find(|stop| stop.id == stop_id)
    }

    /// The drop with the highest sequence index; delivery completes it.
    pub fn terminal_drop(&self) -> Option<&Stop> {
        self.stops
            .iter()
            .filter(|stop| stop.stop_type == StopType::Drop)
            .max_by_key(|stop| stop.sequence_index)
    }

    pub fn label(&self) -> String {
        format!("order {}", self.reference_code)
    }

    /// Checks that the status agrees with the stops, the POD and the route link.
    pub fn check_consistency(&self) -> Result<(), String> {
        if self.status == OrderStatus::Delivered {
            if self.pod.is_none() {
                return Err(format!("{} is DELIVERED without a POD", self.label()));
            }
            match self.terminal_drop() {
                Some(stop) if stop.status == StopStatus::Completed => {}
                _ => {
                    return Err(format!(
                        "{} is DELIVERED but its terminal drop is not COMPLETED",
                        self.label()
                    ));
                }
            }
        } else if self.pod.is_some() {
            return Err(format!("{} has a POD but is {}", self.label(), self.status));
        }

        if self.status.is_on_route() && self.route_id.is_none() {
            return Err(format!("{} is {} without a route", self.label(), self.status));
        }
        if self.status == OrderStatus::Created && self.route_id.is_some() {
            return Err(format!("{} is CREATED but linked to a route", self.label()));
        }

        for (expected, stop) in (1u32..).zip(self.stops.iter()) {
            if stop.sequence_index != expected {
                return Err(format!(
                    "{} stop {} has sequence_index {}, expected {}",
                    self.label(),
                    stop.id,
                    stop.sequence_index,
                    expected
                ));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};

    use super::TimeWindows;

    #[test]
    fn inverted_window_is_named() {
        let now = Utc::now();
        let windows = TimeWindows {
            pickup_window_start: Some(now),
            pickup_window_end: Some(now + Duration::hours(2)),
            drop_window_start: Some(now + Duration::hours(4)),
            drop_window_end: Some(now + Duration::hours(3)),
        };
        assert_eq!(windows.inverted(), Some("drop_window_end"));
    }

    #[test]
    fn open_or_equal_bounds_are_accepted() {
        let now = Utc::now();
        let windows = TimeWindows {
            pickup_window_start: Some(now),
            pickup_window_end: Some(now),
            drop_window_start: None,
            drop_window_end: Some(now - Duration::hours(1)),
        };
        assert_eq!(windows.inverted(), None);
        assert_eq!(TimeWindows::default().inverted(), None);
    }
}
