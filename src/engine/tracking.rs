//! Public tracking projection. Only fields safe for an unauthenticated reader
//! leave this module.

use uuid::Uuid;

use crate::error::AppError;
use crate::models::event::DispatchEvent;
use crate::models::order::{Order, OrderStatus};
use crate::models::tracking::{PodSummary, TrackingEvent, TrackingStop, TrackingView};
use crate::state::AppState;

pub fn track(state: &AppState, token: &str) -> Result<TrackingView, AppError> {
    let token = token.trim();
    if token.is_empty() {
        return Err(AppError::NotFound("tracking token not found".to_string()));
    }

    state
        .order_by_token(token)
        .map(|order| project(&order))
        .ok_or_else(|| AppError::NotFound("tracking token not found".to_string()))
}

/// Looks up the order a live tracking subscriber follows, plus its greeting.
pub fn subscribe(state: &AppState, token: &str) -> Result<(Uuid, TrackingEvent), AppError> {
    let order = state
        .order_by_token(token.trim())
        .ok_or_else(|| AppError::NotFound("tracking token not found".to_string()))?;

    let greeting = TrackingEvent::Connected {
        reference_code: order.reference_code,
        status: order.status,
    };
    Ok((order.id, greeting))
}

/// The customer-safe part of `event`, if it concerns `order_id`.
pub fn tracking_update(order_id: Uuid, event: &DispatchEvent) -> Option<TrackingEvent> {
    match event {
        DispatchEvent::OrderUpdated {
            order_id: updated,
            to_status,
            at,
            ..
        } if *updated == order_id => Some(TrackingEvent::OrderUpdated {
            status: *to_status,
            updated_at: *at,
        }),
        _ => None,
    }
}

/// Builds the view from a single snapshot of `order`.
pub fn project(order: &Order) -> TrackingView {
    let mut stops: Vec<TrackingStop> = order
        .stops
        .iter()
        .map(|stop| TrackingStop {
            sequence_index: stop.sequence_index,
            stop_type: stop.stop_type,
            address_line: stop.address_line.clone(),
            city: stop.city.clone(),
            status: stop.status,
            scheduled_eta: stop.scheduled_eta,
            actual_arrival_time: stop.actual_arrival_time,
        })
        .collect();
    stops.sort_by_key(|stop| stop.sequence_index);

    let pod_summary = match (&order.pod, order.status) {
        (Some(pod), OrderStatus::Delivered) => Some(PodSummary {
            receiver_name: pod.receiver_name.clone(),
            delivered_at: pod.delivered_at,
        }),
        _ => None,
    };

    let driver_eta = order
        .route_id
        .and_then(|_| order.terminal_drop())
        .and_then(|stop| stop.scheduled_eta);

    TrackingView {
        reference_code: order.reference_code.clone(),
        customer_name: order.customer_name.clone(),
        status: order.status,
        stops,
        pod_summary,
        last_update: order
            .history()
            .last()
            .map_or(order.updated_at, |entry| entry.at),
        driver_eta,
    }
}
