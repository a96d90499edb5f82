use std::sync::Arc;

use axum::extract::{Path, State};
use axum::routing::{patch, post};
use axum::Json;
use axum::Router;
use chrono::Utc;
use serde::Deserialize;
use uuid::Uuid;

use crate::error::AppError;
use crate::geo;
use crate::models::driver::{
    DriverSnapshot, DriverStatus, GeoPoint, Vehicle, DEFAULT_MAX_PICKUP_DISTANCE_KM,
};
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/drivers", post(create_driver).get(list_drivers))
        .route("/drivers/:id/status", patch(update_driver_status))
        .route("/drivers/:id/location", patch(update_driver_location))
}

#[derive(Deserialize)]
pub struct CreateDriverRequest {
    pub name: String,
    pub location: Option<GeoPoint>,
    pub vehicle: Option<Vehicle>,
    #[serde(default = "default_max_pickup")]
    pub max_pickup_distance_km: f64,
    #[serde(default)]
    pub device_tokens: Vec<String>,
}

fn default_max_pickup() -> f64 {
    DEFAULT_MAX_PICKUP_DISTANCE_KM
}

#[derive(Deserialize)]
pub struct UpdateStatusRequest {
    pub status: DriverStatus,
}

#[derive(Deserialize)]
pub struct UpdateLocationRequest {
    pub location: GeoPoint,
}

async fn create_driver(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<CreateDriverRequest>,
) -> Result<Json<DriverSnapshot>, AppError> {
    if payload.name.trim().is_empty() {
        return Err(AppError::BadRequest("name cannot be empty".to_string()));
    }

    if payload.max_pickup_distance_km <= 0.0 {
        return Err(AppError::BadRequest(
            "max_pickup_distance_km must be > 0".to_string(),
        ));
    }

    if let Some(location) = &payload.location {
        geo::validate_point(location)?;
    }

    let now = Utc::now();
    let driver = DriverSnapshot {
        id: Uuid::new_v4(),
        name: payload.name,
        location: payload.location,
        located_at: payload.location.map(|_| now),
        status: DriverStatus::Online,
        vehicle: payload.vehicle,
        max_pickup_distance_km: payload.max_pickup_distance_km,
        device_tokens: payload.device_tokens,
        updated_at: now,
    };

    state.drivers.insert(driver.id, driver.clone());
    Ok(Json(driver))
}

async fn list_drivers(State(state): State<Arc<AppState>>) -> Json<Vec<DriverSnapshot>> {
    let drivers = state
        .drivers
        .iter()
        .map(|entry| entry.value().clone())
        .collect();
    Json(drivers)
}

async fn update_driver_status(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateStatusRequest>,
) -> Result<Json<DriverSnapshot>, AppError> {
    let mut driver = state
        .drivers
        .get_mut(&id)
        .ok_or_else(|| AppError::NotFound(format!("driver {} not found", id)))?;

    driver.status = payload.status;
    driver.updated_at = Utc::now();

    Ok(Json(driver.clone()))
}

async fn update_driver_location(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateLocationRequest>,
) -> Result<Json<DriverSnapshot>, AppError> {
    geo::validate_point(&payload.location)?;

    let mut driver = state
        .drivers
        .get_mut(&id)
        .ok_or_else(|| AppError::NotFound(format!("driver {} not found", id)))?;

    let now = Utc::now();
    driver.location = Some(payload.location);
    driver.located_at = Some(now);
    driver.updated_at = now;

    Ok(Json(driver.clone()))
}
