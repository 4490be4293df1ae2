use std::sync::Arc;

use axum::Json;
use axum::Router;
use axum::extract::{Path, State};
use axum::routing::{get, patch};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::api::rest::extract::AppJson;
use crate::error::AppError;
use crate::models::event::DispatchEvent;
use crate::models::fleet::{Driver, GeoPoint, NewDriver, NewVehicle, Vehicle};
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/drivers", get(list_drivers).post(create_driver))
        .route("/drivers/:id/location", patch(update_driver_location))
        .route("/vehicles", get(list_vehicles).post(create_vehicle))
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateLocationRequest {
    pub location: GeoPoint,
}

async fn create_driver(
    State(state): State<Arc<AppState>>,
    AppJson(payload): AppJson<NewDriver>,
) -> Result<Json<Driver>, AppError> {
    let name = payload.name.trim();
    if name.is_empty() {
        return Err(AppError::validation("name", "this field may not be blank"));
    }
    let phone = payload.phone.trim();
    if phone.is_empty() {
        return Err(AppError::validation("phone", "this field may not be blank"));
    }
    if let Some(location) = &payload.location {
        check_location(location)?;
    }

    let now = Utc::now();
    let driver = Driver {
        id: Uuid::new_v4(),
        name: name.to_string(),
        phone: phone.to_string(),
        is_active: true,
        location: payload.location,
        location_updated_at: payload.location.map(|_| now),
        created_at: now,
    };

    state.drivers.insert(driver.id, driver.clone());
    info!(driver_id = %driver.id, "driver registered");
    Ok(Json(driver))
}

async fn list_drivers(State(state): State<Arc<AppState>>) -> Json<Vec<Driver>> {
    let mut drivers: Vec<Driver> = state
        .drivers
        .iter()
        .map(|entry| entry.value().clone())
        .collect();
    drivers.sort_by_key(|driver| driver.created_at);
    Json(drivers)
}

async fn update_driver_location(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    AppJson(payload): AppJson<UpdateLocationRequest>,
) -> Result<Json<Driver>, AppError> {
    check_location(&payload.location)?;

    let driver = {
        let mut driver = state
            .drivers
            .get_mut(&id)
            .ok_or_else(|| AppError::NotFound(format!("driver {id} not found")))?;
        driver.location = Some(payload.location);
        driver.location_updated_at = Some(Utc::now());
        driver.clone()
    };

    state.publish(DispatchEvent::DriverLocation {
        driver_id: driver.id,
        location: payload.location,
        at: driver.location_updated_at.unwrap_or(driver.created_at),
    });

    Ok(Json(driver))
}

async fn create_vehicle(
    State(state): State<Arc<AppState>>,
    AppJson(payload): AppJson<NewVehicle>,
) -> Result<Json<Vehicle>, AppError> {
    let plate_number = payload.plate_number.trim().to_ascii_uppercase();
    if plate_number.is_empty() {
        return Err(AppError::validation(
            "plate_number",
            "this field may not be blank",
        ));
    }
    let taken = state
        .vehicles
        .iter()
        .any(|entry| entry.plate_number == plate_number);
    if taken {
        return Err(AppError::Conflict(format!(
            "vehicle with plate '{plate_number}' already exists"
        )));
    }

    let vehicle = Vehicle {
        id: Uuid::new_v4(),
        plate_number,
        vehicle_type: payload.vehicle_type,
        capacity_kg: payload.capacity_kg,
        is_active: true,
        created_at: Utc::now(),
    };

    state.vehicles.insert(vehicle.id, vehicle.clone());
    info!(vehicle_id = %vehicle.id, plate = %vehicle.plate_number, "vehicle registered");
    Ok(Json(vehicle))
}

async fn list_vehicles(State(state): State<Arc<AppState>>) -> Json<Vec<Vehicle>> {
    let mut vehicles: Vec<Vehicle> = state
        .vehicles
        .iter()
        .map(|entry| entry.value().clone())
        .collect();
    vehicles.sort_by_key(|vehicle| vehicle.created_at);
    Json(vehicles)
}

fn check_location(location: &GeoPoint) -> Result<(), AppError> {
    if location.is_valid() {
        Ok(())
    } else {
        Err(AppError::validation(
            "location",
            "latitude or longitude out of range",
        ))
    }
}
