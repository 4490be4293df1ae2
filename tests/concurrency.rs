//! Conflicting transitions raced from many threads against one order. The
//! write gate lets exactly one of them through.

use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

use cargoflow::engine::lifecycle::{
    NewOrder, NewStop, PodPayload, StatusUpdate, cancel_order, create_order, submit_pod,
    update_status,
};
use cargoflow::engine::routing::{NewRoute, create_route, start_route};
use cargoflow::error::AppError;
use cargoflow::models::fleet::{Driver, Vehicle, VehicleType};
use cargoflow::models::history::Actor;
use cargoflow::models::order::{Order, OrderStatus, StopType, TimeWindows};
use cargoflow::state::AppState;

const CONTENDERS: usize = 16;

fn ops() -> Actor {
    Actor::ops(Some("ops-1".to_string()))
}

fn driver() -> Actor {
    Actor::driver(Some("driver-1".to_string()))
}

fn new_stop(stop_type: StopType, address: &str) -> NewStop {
    NewStop {
        sequence_index: None,
        stop_type,
        address_line: address.to_string(),
        city: "Bengaluru".to_string(),
        state: "KA".to_string(),
        postal_code: "560001".to_string(),
        location: None,
        scheduled_eta: None,
        notes: String::new(),
    }
}

/// An order on a started route, walked through `steps` by the driver.
async fn order_after(state: &AppState, steps: &[OrderStatus]) -> Order {
    let order = create_order(
        state,
        NewOrder {
            reference_code: None,
            customer_name: "Test Customer".to_string(),
            customer_phone: "9999999999".to_string(),
            customer_email: None,
            notes: String::new(),
            windows: TimeWindows::default(),
            stops: vec![
                new_stop(StopType::Pickup, "123 Main St"),
                new_stop(StopType::Drop, "456 End St"),
            ],
        },
        &ops(),
    )
    .unwrap();

    let driver_record = Driver {
        id: Uuid::new_v4(),
        name: "Driver User".to_string(),
        phone: "1234567890".to_string(),
        is_active: true,
        location: None,
        location_updated_at: None,
        created_at: Utc::now(),
    };
    let vehicle = Vehicle {
        id: Uuid::new_v4(),
        plate_number: "KA01AB1234".to_string(),
        vehicle_type: VehicleType::Van,
        capacity_kg: 500,
        is_active: true,
        created_at: Utc::now(),
    };
    let input = NewRoute {
        route_date: Utc::now().date_naive(),
        driver_id: driver_record.id,
        vehicle_id: vehicle.id,
        order_ids: vec![order.id],
        optimize: false,
        notes: String::new(),
    };
    state.drivers.insert(driver_record.id, driver_record);
    state.vehicles.insert(vehicle.id, vehicle);

    let route = create_route(state, input, &ops()).await.unwrap();
    start_route(state, route.id, &driver()).unwrap();
    for step in steps {
        update_status(state, order.id, *step, StatusUpdate::default(), &driver()).unwrap();
    }

    state.order(order.id).unwrap()
}

/// Runs `attempt(i)` on `CONTENDERS` tasks at once and collects the results.
async fn race<F>(state: &Arc<AppState>, attempt: F) -> Vec<Result<Order, AppError>>
where
    F: Fn(&AppState, usize) -> Result<Order, AppError> + Send + Sync + 'static,
{
    let attempt = Arc::new(attempt);
    let barrier = Arc::new(tokio::sync::Barrier::new(CONTENDERS));
    let tasks: Vec<_> = (0..CONTENDERS)
        .map(|index| {
            let state = state.clone();
            let attempt = attempt.clone();
            let barrier = barrier.clone();
            tokio::spawn(async move {
                barrier.wait().await;
                (*attempt)(state.as_ref(), index)
            })
        })
        .collect();

    let mut results = Vec::with_capacity(CONTENDERS);
    for task in tasks {
        results.push(task.await.unwrap());
    }
    results
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn only_one_proof_of_delivery_wins() {
    let state = Arc::new(AppState::new(256));
    let order = order_after(&state, &[OrderStatus::PickedUp, OrderStatus::InTransit]).await;
    let history_before = order.history().len();
    let order_id = order.id;

    let results = race(&state, move |state, index| {
        submit_pod(
            state,
            order_id,
            PodPayload {
                receiver_name: format!("Receiver {index}"),
                notes: None,
                photo_url: None,
            },
            &driver(),
        )
    })
    .await;

    let winners: Vec<&Order> = results.iter().filter_map(|result| result.as_ref().ok()).collect();
    assert_eq!(winners.len(), 1);
    for err in results.iter().filter_map(|result| result.as_ref().err()) {
        assert!(
            matches!(err, AppError::InvalidTransition { .. } | AppError::Conflict(_)),
            "{err}"
        );
    }

    let stored = state.order(order_id).unwrap();
    assert_eq!(stored.status, OrderStatus::Delivered);
    assert_eq!(stored.history().len(), history_before + 1);
    assert_eq!(
        stored.pod.as_ref().map(|pod| pod.receiver_name.as_str()),
        Some(winners[0].pod.as_ref().unwrap().receiver_name.as_str())
    );
    stored.check_consistency().unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn delivery_and_failure_race_to_one_outcome() {
    let state = Arc::new(AppState::new(256));
    let order = order_after(&state, &[OrderStatus::PickedUp, OrderStatus::InTransit]).await;
    let history_before = order.history().len();
    let order_id = order.id;

    let results = race(&state, move |state, index| {
        if index % 2 == 0 {
            submit_pod(
                state,
                order_id,
                PodPayload {
                    receiver_name: "A. Sharma".to_string(),
                    notes: None,
                    photo_url: None,
                },
                &driver(),
            )
        } else {
            update_status(
                state,
                order_id,
                OrderStatus::Failed,
                StatusUpdate {
                    reason: Some("customer unreachable".to_string()),
                    ..StatusUpdate::default()
                },
                &driver(),
            )
        }
    })
    .await;

    assert_eq!(results.iter().filter(|result| result.is_ok()).count(), 1);

    let stored = state.order(order_id).unwrap();
    assert!(matches!(
        stored.status,
        OrderStatus::Delivered | OrderStatus::Failed
    ));
    assert_eq!(stored.pod.is_some(), stored.status == OrderStatus::Delivered);
    assert_eq!(stored.history().len(), history_before + 1);
    stored.check_consistency().unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn only_one_pickup_and_one_cancel_apply() {
    let state = Arc::new(AppState::new(256));
    let order = order_after(&state, &[]).await;
    let history_before = order.history().len();
    let order_id = order.id;

    let pickups = race(&state, move |state, _| {
        update_status(
            state,
            order_id,
            OrderStatus::PickedUp,
            StatusUpdate::default(),
            &driver(),
        )
    })
    .await;
    assert_eq!(pickups.iter().filter(|result| result.is_ok()).count(), 1);

    let cancels = race(&state, move |state, _| {
        cancel_order(state, order_id, "customer request".to_string(), &ops())
    })
    .await;
    assert_eq!(cancels.iter().filter(|result| result.is_ok()).count(), 1);

    let stored = state.order(order_id).unwrap();
    assert_eq!(stored.status, OrderStatus::Cancelled);
    assert_eq!(stored.history().len(), history_before + 2);
    stored.check_consistency().unwrap();
}
