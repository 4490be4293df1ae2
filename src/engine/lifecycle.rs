use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::engine::record_outcome;
use crate::engine::routing::{complete_route_if_done, detach_from_route};
use crate::engine::transitions::{can_transition, can_transition_stop, is_order_edge};
use crate::error::AppError;
use crate::models::event::DispatchEvent;
use crate::models::fleet::GeoPoint;
use crate::models::history::{Actor, StatusHistoryEntry};
use crate::models::order::{
    Order, OrderStatus, ProofOfDelivery, Stop, StopStatus, StopType, TimeWindows,
};
use crate::state::AppState;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewStop {
    #[serde(default)]
    pub sequence_index: Option<u32>,
    #[serde(rename = "type")]
    pub stop_type: StopType,
    pub address_line: String,
    #[serde(default)]
    pub city: String,
    #[serde(default)]
    pub state: String,
    #[serde(default)]
    pub postal_code: String,
    #[serde(default)]
    pub location: Option<GeoPoint>,
    #[serde(default)]
    pub scheduled_eta: Option<DateTime<Utc>>,
    #[serde(default)]
    pub notes: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewOrder {
    #[serde(default)]
    pub reference_code: Option<String>,
    pub customer_name: String,
    pub customer_phone: String,
    #[serde(default)]
    pub customer_email: Option<String>,
    #[serde(default)]
    pub notes: String,
    #[serde(flatten)]
    pub windows: TimeWindows,
    pub stops: Vec<NewStop>,
}

/// Extras a driver may send with a status change.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StatusUpdate {
    #[serde(default)]
    pub stop_id: Option<Uuid>,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub note: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PodPayload {
    pub receiver_name: String,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub photo_url: Option<String>,
}

pub fn create_order(state: &AppState, input: NewOrder, actor: &Actor) -> Result<Order, AppError> {
    let result = insert_order(state, input, actor);
    record_outcome(state, "order", &result);
    result
}

/// Driver-facing status change. `DELIVERED` and `ASSIGNED` have their own
/// operations; `CANCELLED` is routed to [`cancel_order`].
pub fn update_status(
    state: &AppState,
    order_id: Uuid,
    to: OrderStatus,
    update: StatusUpdate,
    actor: &Actor,
) -> Result<Order, AppError> {
    if to == OrderStatus::Cancelled {
        return cancel_order(state, order_id, update.reason.unwrap_or_default(), actor);
    }

    let result = change_status(state, order_id, to, update, actor);
    record_outcome(state, "order", &result);
    result
}

pub fn submit_pod(
    state: &AppState,
    order_id: Uuid,
    payload: PodPayload,
    actor: &Actor,
) -> Result<Order, AppError> {
    let result = deliver(state, order_id, payload, actor);
    record_outcome(state, "order", &result);
    result
}

pub fn cancel_order(
    state: &AppState,
    order_id: Uuid,
    reason: String,
    actor: &Actor,
) -> Result<Order, AppError> {
    let result = cancel(state, order_id, reason, actor);
    record_outcome(state, "order", &result);
    result
}

pub fn transition_stop(
    state: &AppState,
    order_id: Uuid,
    stop_id: Uuid,
    to: StopStatus,
    actor: &Actor,
) -> Result<Order, AppError> {
    let result = move_stop(state, order_id, stop_id, to, actor);
    record_outcome(state, "stop", &result);
    result
}

/// Rebuilds an order's status from its history, starting from nothing.
pub fn replay_history(entries: &[StatusHistoryEntry]) -> Result<OrderStatus, AppError> {
    let mut current: Option<OrderStatus> = None;

    for (position, entry) in entries.iter().enumerate() {
        let follows = match (current, entry.from_status) {
            (None, None) => entry.to_status == OrderStatus::Created,
            (Some(status), Some(from)) => {
                status == from && (entry.is_annotation() || is_order_edge(from, entry.to_status))
            }
            _ => false,
        };

        if !follows {
            return Err(AppError::Internal(format!(
                "history entry {position} ({} -> {}) does not follow {}",
                describe(entry.from_status),
                entry.to_status,
                describe(current)
            )));
        }
        current = Some(entry.to_status);
    }

    current.ok_or_else(|| AppError::Internal("status history is empty".to_string()))
}

/// Applies one table edge to `order` and appends its history entry. On
/// rejection `order` is left untouched.
pub(crate) fn apply_transition(
    order: &mut Order,
    to: OrderStatus,
    actor: &Actor,
    note: Option<String>,
    stop_id: Option<Uuid>,
) -> Result<(), AppError> {
    if !can_transition(order.status, to, actor.kind) {
        return Err(AppError::invalid_transition(order.label(), order.status, to));
    }

    let from = order.status;
    order.status = to;
    order.record(StatusHistoryEntry::new(Some(from), to, actor, note).with_stop(stop_id));
    Ok(())
}

/// Stores `order` and announces its move away from `from`.
pub(crate) fn commit(state: &AppState, order: Order, from: Option<OrderStatus>) {
    let event = DispatchEvent::OrderUpdated {
        order_id: order.id,
        reference_code: order.reference_code.clone(),
        from_status: from,
        to_status: order.status,
        at: order.updated_at,
    };
    state.orders.insert(order.id, order);
    state.publish(event);
}

fn insert_order(state: &AppState, input: NewOrder, actor: &Actor) -> Result<Order, AppError> {
    let customer_name = required("customer_name", &input.customer_name)?;
    let customer_phone = required("customer_phone", &input.customer_phone)?;
    let customer_email = optional_text(input.customer_email);
    if let Some(email) = &customer_email {
        if !email.contains('@') {
            return Err(AppError::validation(
                "customer_email",
                format!("'{email}' is not an email address"),
            ));
        }
    }
    if let Some(field) = input.windows.inverted() {
        return Err(AppError::validation(
            field,
            "window end must not be before its start",
        ));
    }
    let stops = build_stops(input.stops)?;

    let _gate = state.write_gate()?;

    let reference_code = match optional_text(input.reference_code) {
        Some(code) => {
            if state.reference_index.contains_key(&code) {
                return Err(AppError::Conflict(format!(
                    "order with reference '{code}' already exists"
                )));
            }
            code
        }
        None => state.next_reference_code(),
    };

    let mut order = Order::new(
        reference_code,
        new_tracking_token(),
        customer_name,
        customer_phone,
        customer_email,
        input.notes.trim().to_string(),
        stops,
    );
    order.windows = input.windows;
    order.record(StatusHistoryEntry::new(None, OrderStatus::Created, actor, None));

    state
        .reference_index
        .insert(order.reference_code.clone(), order.id);
    state
        .tracking_index
        .insert(order.tracking_token.clone(), order.id);
    commit(state, order.clone(), None);

    info!(
        order_id = %order.id,
        reference_code = %order.reference_code,
        stops = order.stops.len(),
        "order created"
    );

    Ok(order)
}

fn change_status(
    state: &AppState,
    order_id: Uuid,
    to: OrderStatus,
    update: StatusUpdate,
    actor: &Actor,
) -> Result<Order, AppError> {
    match to {
        OrderStatus::Delivered => {
            return Err(AppError::validation(
                "to_status",
                "DELIVERED requires a proof of delivery; submit it through the POD endpoint",
            ));
        }
        OrderStatus::Assigned => {
            return Err(AppError::validation(
                "to_status",
                "ASSIGNED is only reachable through route assignment",
            ));
        }
        _ => {}
    }

    let _gate = state.write_gate()?;
    let mut order = state.order(order_id)?;
    let from = order.status;

    if !can_transition(from, to, actor.kind) {
        return Err(AppError::invalid_transition(order.label(), from, to));
    }

    let note = if to == OrderStatus::Failed {
        let reason = update.reason.as_deref().unwrap_or_default();
        Some(required("reason", reason)?)
    } else {
        optional_text(update.note)
    };

    if let Some(stop_id) = update.stop_id {
        complete_stop(&mut order, stop_id)?;
    }

    apply_transition(&mut order, to, actor, note, update.stop_id)?;
    let route_id = order.route_id;
    commit(state, order.clone(), Some(from));

    info!(order_id = %order.id, %from, %to, "order status updated");

    if to.is_terminal() {
        if let Some(route_id) = route_id {
            complete_route_if_done(state, route_id)?;
        }
    }

    Ok(order)
}

fn deliver(
    state: &AppState,
    order_id: Uuid,
    payload: PodPayload,
    actor: &Actor,
) -> Result<Order, AppError> {
    let _gate = state.write_gate()?;
    let mut order = state.order(order_id)?;
    let from = order.status;

    if !can_transition(from, OrderStatus::Delivered, actor.kind) {
        return Err(AppError::invalid_transition(
            order.label(),
            from,
            OrderStatus::Delivered,
        ));
    }
    if order.pod.is_some() {
        return Err(AppError::Conflict(format!(
            "proof of delivery already exists for {}",
            order.label()
        )));
    }
    let receiver_name = required("receiver_name", &payload.receiver_name)?;

    let drop_id = order
        .terminal_drop()
        .map(|stop| stop.id)
        .ok_or_else(|| AppError::Internal(format!("{} has no drop stop", order.label())))?;
    let drop_status = order.stop(drop_id).map(|stop| stop.status);
    if drop_status != Some(StopStatus::Completed) {
        complete_stop(&mut order, drop_id)?;
    }

    order.pod = Some(ProofOfDelivery {
        id: Uuid::new_v4(),
        receiver_name: receiver_name.clone(),
        delivered_at: Utc::now(),
        notes: optional_text(payload.notes),
        photo_url: optional_text(payload.photo_url),
    });
    apply_transition(
        &mut order,
        OrderStatus::Delivered,
        actor,
        Some(format!("received by {receiver_name}")),
        Some(drop_id),
    )?;
    let route_id = order.route_id;
    commit(state, order.clone(), Some(from));

    info!(order_id = %order.id, receiver = %receiver_name, "order delivered");

    if let Some(route_id) = route_id {
        complete_route_if_done(state, route_id)?;
    }

    Ok(order)
}

fn cancel(
    state: &AppState,
    order_id: Uuid,
    reason: String,
    actor: &Actor,
) -> Result<Order, AppError> {
    let _gate = state.write_gate()?;
    let mut order = state.order(order_id)?;
    let from = order.status;

    if !can_transition(from, OrderStatus::Cancelled, actor.kind) {
        return Err(AppError::invalid_transition(
            order.label(),
            from,
            OrderStatus::Cancelled,
        ));
    }
    let reason = required("reason", &reason)?;

    apply_transition(&mut order, OrderStatus::Cancelled, actor, Some(reason), None)?;

    // A picked-up order stays on its route as a terminal entry; an assigned
    // one leaves the route entirely.
    let detached_from = if from == OrderStatus::Assigned {
        order.route_id.take()
    } else {
        None
    };
    let route_id = order.route_id.or(detached_from);
    commit(state, order.clone(), Some(from));

    if let Some(source) = detached_from {
        detach_from_route(state, source, order.id)?;
    }

    info!(order_id = %order.id, %from, "order cancelled");

    if let Some(route_id) = route_id {
        complete_route_if_done(state, route_id)?;
    }

    Ok(order)
}

fn move_stop(
    state: &AppState,
    order_id: Uuid,
    stop_id: Uuid,
    to: StopStatus,
    actor: &Actor,
) -> Result<Order, AppError> {
    let _gate = state.write_gate()?;
    let mut order = state.order(order_id)?;

    if !order.status.is_on_route() {
        return Err(AppError::Conflict(format!(
            "{} is {}; stops only change while it is on a route",
            order.label(),
            order.status
        )));
    }

    let label = stop_label(&order, stop_id);
    let stop = order
        .stop_mut(stop_id)
        .ok_or_else(|| AppError::NotFound(label.clone()))?;
    step_stop(stop, to, &label)?;
    order.updated_at = Utc::now();
    state.orders.insert(order.id, order.clone());

    info!(
        order_id = %order.id,
        stop_id = %stop_id,
        to = %to,
        actor = actor.kind.as_str(),
        "stop status updated"
    );

    Ok(order)
}

/// Walks a stop to `COMPLETED` through `ARRIVED` where needed.
fn complete_stop(order: &mut Order, stop_id: Uuid) -> Result<(), AppError> {
    let label = stop_label(order, stop_id);
    let stop = order
        .stop_mut(stop_id)
        .ok_or_else(|| AppError::NotFound(label.clone()))?;

    if stop.status == StopStatus::Pending {
        step_stop(stop, StopStatus::Arrived, &label)?;
    }
    step_stop(stop, StopStatus::Completed, &label)
}

fn step_stop(stop: &mut Stop, to: StopStatus, label: &str) -> Result<(), AppError> {
    if !can_transition_stop(stop.status, to) {
        return Err(AppError::invalid_transition(label, stop.status, to));
    }

    stop.status = to;
    if matches!(to, StopStatus::Arrived | StopStatus::Completed) && stop.actual_arrival_time.is_none()
    {
        stop.actual_arrival_time = Some(Utc::now());
    }
    Ok(())
}

fn stop_label(order: &Order, stop_id: Uuid) -> String {
    match order.stop(stop_id) {
        Some(stop) => format!(
            "stop {} ({:?}) of {}",
            stop.sequence_index,
            stop.stop_type,
            order.label()
        ),
        None => format!("stop {stop_id} of {}", order.label()),
    }
}

fn build_stops(inputs: Vec<NewStop>) -> Result<Vec<Stop>, AppError> {
    if inputs.len() < 2 {
        return Err(AppError::validation(
            "stops",
            "an order needs at least two stops",
        ));
    }
    for (stop_type, name) in [(StopType::Pickup, "PICKUP"), (StopType::Drop, "DROP")] {
        if !inputs.iter().any(|stop| stop.stop_type == stop_type) {
            return Err(AppError::validation(
                "stops",
                format!("an order needs at least one {name} stop"),
            ));
        }
    }

    let explicit = inputs
        .iter()
        .filter(|stop| stop.sequence_index.is_some())
        .count();
    if explicit != 0 && explicit != inputs.len() {
        return Err(AppError::validation(
            "stops",
            "sequence_index must be given for every stop or for none",
        ));
    }

    let mut stops = Vec::with_capacity(inputs.len());
    for (position, input) in (1u32..).zip(inputs) {
        let field = format!("stops[{}]", position - 1);
        let address_line = required(&format!("{field}.address_line"), &input.address_line)?;
        if let Some(location) = &input.location {
            if !location.is_valid() {
                return Err(AppError::validation(
                    format!("{field}.location"),
                    "latitude or longitude out of range",
                ));
            }
        }

        stops.push(Stop {
            id: Uuid::new_v4(),
            sequence_index: input.sequence_index.unwrap_or(position),
            stop_type: input.stop_type,
            address_line,
            city: input.city.trim().to_string(),
            state: input.state.trim().to_string(),
            postal_code: input.postal_code.trim().to_string(),
            location: input.location,
            status: StopStatus::Pending,
            scheduled_eta: input.scheduled_eta,
            actual_arrival_time: None,
            notes: input.notes.trim().to_string(),
        });
    }

    stops.sort_by_key(|stop| stop.sequence_index);
    for (expected, stop) in (1u32..).zip(stops.iter()) {
        if stop.sequence_index != expected {
            return Err(AppError::validation(
                "stops",
                "sequence_index must run contiguously from 1",
            ));
        }
    }

    Ok(stops)
}

/// 64 hex characters from two random v4 UUIDs; unrelated to the order's id
/// or reference code.
fn new_tracking_token() -> String {
    format!("{}{}", Uuid::new_v4().simple(), Uuid::new_v4().simple())
}

fn required(field: &str, value: &str) -> Result<String, AppError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(AppError::validation(field, "this field may not be blank"));
    }
    Ok(trimmed.to_string())
}

fn optional_text(value: Option<String>) -> Option<String> {
    value
        .map(|text| text.trim().to_string())
        .filter(|text| !text.is_empty())
}

fn describe(status: Option<OrderStatus>) -> &'static str {
    status.map_or("nothing", OrderStatus::as_str)
}
