use std::sync::Arc;

use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::Json;
use axum::Router;
use serde::Deserialize;
use uuid::Uuid;

use crate::engine::coordinator::{self, ResponseAction};
use crate::engine::queue::enqueue_order;
use crate::error::AppError;
use crate::geo;
use crate::models::driver::GeoPoint;
use crate::models::order::Order;
use crate::models::request::AssignmentRequest;
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/orders", post(create_order))
        .route("/orders/:id", get(get_order))
        .route("/orders/:id/response", post(respond_to_order))
        .route("/requests", get(list_requests))
}

#[derive(Deserialize)]
pub struct CreateOrderRequest {
    pub pickup: GeoPoint,
    #[serde(default)]
    pub dropoff: Option<GeoPoint>,
    /// Quoted upstream by pricing; passed through untouched.
    #[serde(default)]
    pub fare: Option<f64>,
}

#[derive(Deserialize)]
pub struct DriverResponseRequest {
    pub driver_id: Uuid,
    pub action: ResponseAction,
}

async fn create_order(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<CreateOrderRequest>,
) -> Result<Json<Order>, AppError> {
    geo::validate_point(&payload.pickup)?;
    if let Some(dropoff) = &payload.dropoff {
        geo::validate_point(dropoff)?;
    }

    let order = Order::new(payload.pickup, payload.dropoff, payload.fare);

    state.orders.insert(order.id, order.clone());
    enqueue_order(&state, order.id).await?;

    Ok(Json(order))
}

async fn get_order(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Order>, AppError> {
    let order = state
        .orders
        .get(&id)
        .ok_or_else(|| AppError::NotFound(format!("order {} not found", id)))?;

    Ok(Json(order.value().clone()))
}

async fn respond_to_order(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<DriverResponseRequest>,
) -> Result<Json<AssignmentRequest>, AppError> {
    let request =
        coordinator::handle_driver_response(state, id, payload.driver_id, payload.action).await?;
    Ok(Json(request))
}

async fn list_requests(State(state): State<Arc<AppState>>) -> Json<Vec<AssignmentRequest>> {
    let requests = state
        .requests
        .iter()
        .map(|entry| entry.value().clone())
        .collect();

    Json(requests)
}
