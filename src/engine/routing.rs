use std::collections::HashSet;
use std::time::Instant;

use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::engine::lifecycle::{apply_transition, commit};
use crate::engine::optimizer::StopPoint;
use crate::engine::record_outcome;
use crate::engine::transitions::can_transition_route;
use crate::error::AppError;
use crate::models::event::DispatchEvent;
use crate::models::history::{Actor, StatusHistoryEntry};
use crate::models::order::{Order, OrderStatus};
use crate::models::route::{Route, RouteStatus};
use crate::state::AppState;

const OPEN_STATES: &str = "PLANNED or IN_PROGRESS";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewRoute {
    pub route_date: NaiveDate,
    pub driver_id: Uuid,
    pub vehicle_id: Uuid,
    pub order_ids: Vec<Uuid>,
    #[serde(default)]
    pub optimize: bool,
    #[serde(default)]
    pub notes: String,
}

/// Creates a `PLANNED` route and assigns every listed order to it in one step.
///
/// With `optimize` set, the stops are then resequenced by the configured
/// optimizer. Sequencing never fails the call: on any optimizer problem the
/// route keeps the input order and the failure is logged and counted.
pub async fn create_route(
    state: &AppState,
    input: NewRoute,
    actor: &Actor,
) -> Result<Route, AppError> {
    let result = assign_new_route(state, &input, actor);
    record_outcome(state, "route", &result);
    let route = result?;

    if !input.optimize {
        return Ok(route);
    }
    optimize_route(state, route).await
}

pub fn start_route(state: &AppState, route_id: Uuid, actor: &Actor) -> Result<Route, AppError> {
    let result = begin(state, route_id, actor);
    record_outcome(state, "route", &result);
    result
}

/// Replaces the visiting sequence. `stop_ids` must name every stop on the
/// route exactly once.
pub fn reorder_stops(
    state: &AppState,
    route_id: Uuid,
    stop_ids: Vec<Uuid>,
) -> Result<Route, AppError> {
    let result = resequence(state, route_id, &stop_ids);
    record_outcome(state, "route", &result);
    result
}

pub fn reassign_order(
    state: &AppState,
    order_id: Uuid,
    target_route_id: Uuid,
    note: String,
    actor: &Actor,
) -> Result<Order, AppError> {
    let result = move_order(state, order_id, target_route_id, note, actor);
    record_outcome(state, "order", &result);
    result
}

/// Verifies `proposed` is an exact permutation of `current`.
pub fn check_permutation(current: &[Uuid], proposed: &[Uuid]) -> Result<(), String> {
    let expected: HashSet<Uuid> = current.iter().copied().collect();
    let mut seen = HashSet::with_capacity(proposed.len());

    for stop_id in proposed {
        if !seen.insert(*stop_id) {
            return Err(format!("stop {stop_id} appears more than once"));
        }
        if !expected.contains(stop_id) {
            return Err(format!("stop {stop_id} is not on this route"));
        }
    }

    if let Some(missing) = current.iter().find(|stop_id| !seen.contains(*stop_id)) {
        return Err(format!("stop {missing} is missing from the new sequence"));
    }

    Ok(())
}

/// Completes an `IN_PROGRESS` route once every order left on it is terminal.
/// Callers hold the write gate.
pub(crate) fn complete_route_if_done(state: &AppState, route_id: Uuid) -> Result<(), AppError> {
    let Some(mut route) = state.routes.get(&route_id).map(|entry| entry.value().clone()) else {
        return Ok(());
    };
    if route.status != RouteStatus::InProgress {
        return Ok(());
    }

    let all_terminal = route.order_ids.iter().all(|order_id| {
        state
            .orders
            .get(order_id)
            .is_none_or(|order| order.status.is_terminal())
    });
    if !all_terminal {
        return Ok(());
    }

    let now = Utc::now();
    route.status = RouteStatus::Completed;
    route.end_time = Some(now);
    route.updated_at = now;
    state.routes.insert(route.id, route);
    state.metrics.routes_in_progress.dec();
    state.metrics.record_transition("route", "applied");
    state.publish(DispatchEvent::RouteUpdated {
        route_id,
        status: RouteStatus::Completed,
        at: now,
    });

    info!(route_id = %route_id, "route completed");
    Ok(())
}

/// Removes an order and its stops from a route. Callers hold the write gate.
pub(crate) fn detach_from_route(
    state: &AppState,
    route_id: Uuid,
    order_id: Uuid,
) -> Result<(), AppError> {
    let mut route = state.route(route_id)?;
    route.detach(order_id);
    state.routes.insert(route.id, route);
    Ok(())
}

fn assign_new_route(state: &AppState, input: &NewRoute, actor: &Actor) -> Result<Route, AppError> {
    if input.order_ids.is_empty() {
        return Err(AppError::validation(
            "order_ids",
            "a route needs at least one order",
        ));
    }
    let mut seen = HashSet::with_capacity(input.order_ids.len());
    for order_id in &input.order_ids {
        if !seen.insert(*order_id) {
            return Err(AppError::validation(
                "order_ids",
                format!("order {order_id} is listed more than once"),
            ));
        }
    }

    let _gate = state.write_gate()?;

    let driver = state
        .drivers
        .get(&input.driver_id)
        .map(|entry| entry.value().clone())
        .ok_or_else(|| AppError::NotFound(format!("driver {} not found", input.driver_id)))?;
    if !driver.is_active {
        return Err(AppError::validation(
            "driver_id",
            format!("driver {} is inactive", driver.name),
        ));
    }
    let vehicle = state
        .vehicles
        .get(&input.vehicle_id)
        .map(|entry| entry.value().clone())
        .ok_or_else(|| AppError::NotFound(format!("vehicle {} not found", input.vehicle_id)))?;
    if !vehicle.is_active {
        return Err(AppError::validation(
            "vehicle_id",
            format!("vehicle {} is inactive", vehicle.plate_number),
        ));
    }

    let mut orders = Vec::with_capacity(input.order_ids.len());
    for order_id in &input.order_ids {
        let order = state.order(*order_id)?;
        if order.status != OrderStatus::Created {
            return Err(AppError::OrderNotEligible {
                order: order.reference_code.clone(),
                reason: format!("status is {}, expected CREATED", order.status),
            });
        }
        if let Some(route_id) = order.route_id {
            return Err(AppError::OrderNotEligible {
                order: order.reference_code.clone(),
                reason: format!("already assigned to route {route_id}"),
            });
        }
        orders.push(order);
    }

    let now = Utc::now();
    let mut route = Route {
        id: Uuid::new_v4(),
        route_date: input.route_date,
        driver_id: driver.id,
        vehicle_id: vehicle.id,
        status: RouteStatus::Planned,
        order_ids: Vec::with_capacity(orders.len()),
        stops: Vec::new(),
        optimized: false,
        start_time: None,
        end_time: None,
        notes: input.notes.trim().to_string(),
        created_at: now,
        updated_at: now,
    };

    // Everything is staged on clones; nothing is stored unless every order
    // accepts the assignment.
    let note = format!("assigned to {}", route.label());
    for order in &mut orders {
        apply_transition(order, OrderStatus::Assigned, actor, Some(note.clone()), None)?;
        order.route_id = Some(route.id);
        route.attach(order);
    }

    state.routes.insert(route.id, route.clone());
    for order in orders {
        commit(state, order, Some(OrderStatus::Created));
    }
    state.publish(DispatchEvent::RouteUpdated {
        route_id: route.id,
        status: route.status,
        at: now,
    });

    info!(
        route_id = %route.id,
        driver_id = %route.driver_id,
        orders = route.order_ids.len(),
        stops = route.stops.len(),
        "route created"
    );

    Ok(route)
}

async fn optimize_route(state: &AppState, route: Route) -> Result<Route, AppError> {
    let points = stop_points(state, &route);
    let optimizer = state.optimizer.clone();

    let started = Instant::now();
    let outcome = optimizer.sequence(&points).await;
    let elapsed = started.elapsed().as_secs_f64();

    let sequence = match outcome {
        Ok(sequence) => match check_permutation(&route.stop_ids(), &sequence) {
            Ok(()) => sequence,
            Err(reason) => {
                return Ok(keep_input_order(state, route, "invalid", elapsed, &reason));
            }
        },
        Err(err) => {
            return Ok(keep_input_order(state, route, "failed", elapsed, &err.to_string()));
        }
    };

    let _gate = state.write_gate()?;
    let mut current = state.route(route.id)?;
    if current.status != RouteStatus::Planned
        || check_permutation(&current.stop_ids(), &sequence).is_err()
    {
        return Ok(keep_input_order(
            state,
            current,
            "stale",
            elapsed,
            "route changed while sequencing",
        ));
    }

    current.apply_sequence(&sequence);
    current.optimized = true;
    state.routes.insert(current.id, current.clone());
    state
        .metrics
        .optimizer_latency_seconds
        .with_label_values(&["applied"])
        .observe(elapsed);
    state
        .metrics
        .optimizer_runs_total
        .with_label_values(&["applied"])
        .inc();

    info!(
        route_id = %current.id,
        optimizer = optimizer.name(),
        elapsed_ms = (elapsed * 1000.0) as u64,
        "route stops optimized"
    );

    Ok(current)
}

fn keep_input_order(
    state: &AppState,
    route: Route,
    outcome: &str,
    elapsed: f64,
    reason: &str,
) -> Route {
    state
        .metrics
        .optimizer_latency_seconds
        .with_label_values(&[outcome])
        .observe(elapsed);
    state
        .metrics
        .optimizer_runs_total
        .with_label_values(&[outcome])
        .inc();
    warn!(
        route_id = %route.id,
        optimizer = state.optimizer.name(),
        reason,
        "stop sequencing skipped; keeping input order"
    );
    route
}

fn stop_points(state: &AppState, route: &Route) -> Vec<StopPoint> {
    route
        .stops
        .iter()
        .filter_map(|route_stop| {
            let order = state.orders.get(&route_stop.order_id)?;
            let stop = order.stop(route_stop.stop_id)?;
            Some(StopPoint {
                stop_id: stop.id,
                order_id: order.id,
                stop_type: stop.stop_type,
                location: stop.location,
            })
        })
        .collect()
}

fn begin(state: &AppState, route_id: Uuid, actor: &Actor) -> Result<Route, AppError> {
    let _gate = state.write_gate()?;
    let mut route = state.route(route_id)?;

    if !can_transition_route(route.status, RouteStatus::InProgress) {
        return Err(AppError::InvalidRouteState {
            route: route.label(),
            status: route.status.to_string(),
            expected: RouteStatus::Planned.to_string(),
        });
    }

    let now = Utc::now();
    route.status = RouteStatus::InProgress;
    route.start_time = Some(now);
    route.updated_at = now;
    state.routes.insert(route.id, route.clone());
    state.metrics.routes_in_progress.inc();
    state.publish(DispatchEvent::RouteUpdated {
        route_id: route.id,
        status: route.status,
        at: now,
    });

    info!(
        route_id = %route.id,
        actor = actor.kind.as_str(),
        actor_id = actor.id.as_deref().unwrap_or("-"),
        "route started"
    );

    // Orders may have finished or left while the route was still PLANNED.
    complete_route_if_done(state, route.id)?;
    state.route(route.id)
}

fn resequence(state: &AppState, route_id: Uuid, stop_ids: &[Uuid]) -> Result<Route, AppError> {
    let _gate = state.write_gate()?;
    let mut route = state.route(route_id)?;

    if !route.status.is_open() {
        return Err(AppError::InvalidRouteState {
            route: route.label(),
            status: route.status.to_string(),
            expected: OPEN_STATES.to_string(),
        });
    }
    check_permutation(&route.stop_ids(), stop_ids)
        .map_err(|reason| AppError::StopSetMismatch(format!("{}: {reason}", route.label())))?;

    route.apply_sequence(stop_ids);
    route.optimized = false;
    state.routes.insert(route.id, route.clone());
    state.publish(DispatchEvent::RouteUpdated {
        route_id: route.id,
        status: route.status,
        at: route.updated_at,
    });

    info!(route_id = %route.id, stops = stop_ids.len(), "route stops reordered");
    Ok(route)
}

fn move_order(
    state: &AppState,
    order_id: Uuid,
    target_route_id: Uuid,
    note: String,
    actor: &Actor,
) -> Result<Order, AppError> {
    let _gate = state.write_gate()?;
    let mut order = state.order(order_id)?;

    if order.status != OrderStatus::Assigned {
        return Err(AppError::invalid_transition(
            order.label(),
            order.status,
            OrderStatus::Assigned,
        ));
    }

    let mut target = state.route(target_route_id)?;
    if !target.status.is_open() {
        return Err(AppError::InvalidRouteState {
            route: target.label(),
            status: target.status.to_string(),
            expected: OPEN_STATES.to_string(),
        });
    }
    if order.route_id == Some(target.id) {
        return Err(AppError::Conflict(format!(
            "{} is already on {}",
            order.label(),
            target.label()
        )));
    }

    let note = match note.trim() {
        "" => format!("reassigned to {}", target.label()),
        text => format!("reassigned to {}: {text}", target.label()),
    };
    let system = Actor::system(actor.id.clone());
    order.record(StatusHistoryEntry::new(
        Some(OrderStatus::Assigned),
        OrderStatus::Assigned,
        &system,
        Some(note),
    ));

    let source_id = order.route_id.replace(target.id);
    target.attach(&order);

    if let Some(source_id) = source_id {
        detach_from_route(state, source_id, order.id)?;
    }
    state.routes.insert(target.id, target);
    commit(state, order.clone(), Some(OrderStatus::Assigned));

    info!(
        order_id = %order.id,
        from_route = ?source_id,
        to_route = %target_route_id,
        "order reassigned"
    );

    if let Some(source_id) = source_id {
        complete_route_if_done(state, source_id)?;
    }

    Ok(order)
}
