use std::cmp::Ordering;
use std::sync::Arc;

use serde::Deserialize;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::engine::availability::{self, Availability, MAX_DESTINATION_DISTANCE_KM};
use crate::engine::scheduler::RadiusRetryJob;
use crate::error::AppError;
use crate::geo;
use crate::models::driver::DriverSnapshot;
use crate::models::order::OrderStatus;
use crate::models::request::{AssignmentRequest, RequestStatus};
use crate::notify::dispatcher;
use crate::state::AppState;

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseAction {
    Accept,
    Reject,
}

/// Entry point after order creation. Validates the pickup and starts the
/// radius-expanding candidate search at the first configured radius.
pub async fn assign_driver(state: Arc<AppState>, order_id: Uuid) -> Result<(), AppError> {
    let pickup = state
        .orders
        .get(&order_id)
        .map(|order| order.pickup)
        .ok_or_else(|| AppError::NotFound(format!("order {order_id} not found")))?;
    geo::validate_point(&pickup)?;

    search_at_radius(state, order_id, 0).await
}

/// One candidate search at `radius_idx` of the configured radius policy.
///
/// Serialized per order: reject handling, timeout reassignment and delayed
/// radius retries all funnel through here under the same lock. Stale invokers
/// (the order got assigned or cancelled in the meantime) drop out at the
/// guards below.
pub async fn search_at_radius(
    state: Arc<AppState>,
    order_id: Uuid,
    radius_idx: usize,
) -> Result<(), AppError> {
    let lock = state.search_lock(order_id);
    let _guard = lock.lock().await;

    let Some(radius_km) = state.config.search_radii_km.get(radius_idx).copied() else {
        return Ok(());
    };

    let (pickup, order_status) = match state.orders.get(&order_id) {
        Some(order) => (order.pickup, order.status.clone()),
        None => return Err(AppError::NotFound(format!("order {order_id} not found"))),
    };
    if order_status != OrderStatus::Pending {
        debug!(order_id = %order_id, status = ?order_status, "order no longer pending; search dropped");
        return Ok(());
    }
    if state.has_blocking_request(order_id) {
        debug!(order_id = %order_id, "offer already outstanding; search dropped");
        return Ok(());
    }

    let excluded = state.excluded_drivers(order_id);

    let mut best: Option<(DriverSnapshot, Availability)> = None;
    for entry in state.drivers.iter() {
        let driver = entry.value();
        if !driver.is_dispatchable() || excluded.contains(&driver.id) {
            continue;
        }
        let Some(availability) = availability::evaluate(&state, driver, &pickup)? else {
            continue;
        };

        // Destination matching carries its own fixed cap; everyone else is
        // bounded by the tighter of the search radius and their preference.
        let cap = if availability.matched_via_destination {
            MAX_DESTINATION_DISTANCE_KM
        } else {
            radius_km.min(driver.max_pickup_distance_km)
        };
        if availability.effective_distance_km > cap {
            continue;
        }

        let closer = match &best {
            None => true,
            Some((current, current_availability)) => {
                match availability
                    .effective_distance_km
                    .total_cmp(&current_availability.effective_distance_km)
                {
                    Ordering::Less => true,
                    Ordering::Equal => driver.id < current.id,
                    Ordering::Greater => false,
                }
            }
        };
        if closer {
            best = Some((driver.clone(), availability));
        }
    }

    match best {
        Some((driver, availability)) => {
            offer_to_driver(&state, order_id, &driver, &availability);
            Ok(())
        }
        None => {
            schedule_next_radius(&state, order_id, radius_idx, radius_km);
            Ok(())
        }
    }
}

fn offer_to_driver(
    state: &Arc<AppState>,
    order_id: Uuid,
    driver: &DriverSnapshot,
    availability: &Availability,
) {
    state.upsert_offer(order_id, driver.id);
    state
        .metrics
        .searches_total
        .with_label_values(&["offered"])
        .inc();

    info!(
        order_id = %order_id,
        driver_id = %driver.id,
        distance_km = availability.effective_distance_km,
        via_destination = availability.matched_via_destination,
        "driver offered order"
    );

    if let Some(order) = state.orders.get(&order_id).map(|order| order.value().clone()) {
        dispatcher::notify_new_offer(state, &order, driver);
    }
}

fn schedule_next_radius(state: &Arc<AppState>, order_id: Uuid, radius_idx: usize, radius_km: f64) {
    let next_idx = radius_idx + 1;
    if next_idx < state.config.search_radii_km.len() {
        state
            .metrics
            .searches_total
            .with_label_values(&["empty"])
            .inc();
        info!(
            order_id = %order_id,
            radius_km = radius_km,
            "no candidate in radius; retrying wider"
        );
        state.executor.schedule_retry(
            state.clone(),
            state.config.radius_wait,
            RadiusRetryJob {
                order_id,
                radius_idx: next_idx,
            },
        );
    } else {
        state
            .metrics
            .searches_total
            .with_label_values(&["exhausted"])
            .inc();
        warn!(
            order_id = %order_id,
            "every radius searched without a candidate; order left unassigned"
        );
    }
}

/// Driver's answer to an outstanding offer.
///
/// Both branches go through the guarded transition; losing the race against
/// the timeout sweep (or a duplicate response) is a silent no-op and the
/// caller gets the request as it currently stands.
pub async fn handle_driver_response(
    state: Arc<AppState>,
    order_id: Uuid,
    driver_id: Uuid,
    action: ResponseAction,
) -> Result<AssignmentRequest, AppError> {
    if !state.drivers.contains_key(&driver_id) {
        return Err(AppError::NotFound(format!("driver {driver_id} not found")));
    }
    if !state.requests.contains_key(&(order_id, driver_id)) {
        return Err(AppError::NotFound(format!(
            "no offer of order {order_id} to driver {driver_id}"
        )));
    }

    match action {
        ResponseAction::Accept => {
            if state.transition_request(order_id, driver_id, RequestStatus::Accepted) {
                state
                    .metrics
                    .driver_responses_total
                    .with_label_values(&["accept"])
                    .inc();
                if let Some(mut order) = state.orders.get_mut(&order_id) {
                    if order.status == OrderStatus::Pending {
                        order.status = OrderStatus::Confirmed;
                    }
                }
                info!(order_id = %order_id, driver_id = %driver_id, "driver accepted order");
            } else {
                debug!(
                    order_id = %order_id,
                    driver_id = %driver_id,
                    "accept arrived after the offer was resolved; ignored"
                );
            }
        }
        ResponseAction::Reject => {
            if state.transition_request(order_id, driver_id, RequestStatus::Rejected) {
                state
                    .metrics
                    .driver_responses_total
                    .with_label_values(&["reject"])
                    .inc();
                info!(order_id = %order_id, driver_id = %driver_id, "driver rejected order");

                // Fresh search from the first radius; the rejecting driver is
                // now in the order's excluded set.
                let search_state = state.clone();
                tokio::spawn(async move {
                    if let Err(err) = search_at_radius(search_state, order_id, 0).await {
                        error!(order_id = %order_id, error = %err, "re-search after reject failed");
                    }
                });
            } else {
                debug!(
                    order_id = %order_id,
                    driver_id = %driver_id,
                    "reject arrived after the offer was resolved; ignored"
                );
            }
        }
    }

    state
        .requests
        .get(&(order_id, driver_id))
        .map(|request| request.value().clone())
        .ok_or_else(|| AppError::Internal("assignment request vanished".to_string()))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use chrono::Utc;
    use uuid::Uuid;

    use super::{assign_driver, handle_driver_response, search_at_radius, ResponseAction};
    use crate::config::DispatchConfig;
    use crate::models::driver::{DriverSnapshot, DriverStatus, GeoPoint, Vehicle};
    use crate::models::order::{Order, OrderStatus};
    use crate::models::request::{AssignmentRequest, RequestStatus};
    use crate::state::AppState;

    fn test_state() -> Arc<AppState> {
        let config = DispatchConfig {
            radius_wait: Duration::ZERO,
            inline_retries: true,
            ..DispatchConfig::default()
        };
        let (state, _rx) = AppState::new(config, 16);
        Arc::new(state)
    }

    fn driver(id_seed: u128, lat: f64, lng: f64, max_pickup_km: f64) -> DriverSnapshot {
        DriverSnapshot {
            id: Uuid::from_u128(id_seed),
            name: format!("driver-{id_seed}"),
            location: Some(GeoPoint { lat, lng }),
            located_at: Some(Utc::now()),
            status: DriverStatus::Online,
            vehicle: Some(Vehicle {
                plate: format!("B {id_seed} XY"),
                model: "Honda Brio".to_string(),
            }),
            max_pickup_distance_km: max_pickup_km,
            device_tokens: vec![],
            updated_at: Utc::now(),
        }
    }

    fn add_driver(state: &AppState, driver: DriverSnapshot) -> Uuid {
        let id = driver.id;
        state.drivers.insert(id, driver);
        id
    }

    fn add_order(state: &AppState, lat: f64, lng: f64) -> Uuid {
        let order = Order::new(GeoPoint { lat, lng }, None, None);
        let id = order.id;
        state.orders.insert(id, order);
        id
    }

    fn requested_driver(state: &AppState, order_id: Uuid) -> Option<Uuid> {
        state
            .requests_for_order(order_id)
            .into_iter()
            .find(|request| request.status == RequestStatus::Requested)
            .map(|request| request.driver_id)
    }

    #[tokio::test]
    async fn nearest_driver_wins() {
        let state = test_state();
        let _far = add_driver(&state, driver(1, 40.04, -75.0, 10.0));
        let near = add_driver(&state, driver(2, 40.01, -75.0, 10.0));
        let order_id = add_order(&state, 40.0, -75.0);

        assign_driver(state.clone(), order_id).await.unwrap();

        assert_eq!(requested_driver(&state, order_id), Some(near));
    }

    #[tokio::test]
    async fn equal_distance_ties_break_to_smaller_driver_id() {
        let state = test_state();
        let low = add_driver(&state, driver(1, 40.01, -75.0, 10.0));
        let _high = add_driver(&state, driver(2, 40.01, -75.0, 10.0));
        let order_id = add_order(&state, 40.0, -75.0);

        assign_driver(state.clone(), order_id).await.unwrap();

        assert_eq!(requested_driver(&state, order_id), Some(low));
    }

    #[tokio::test]
    async fn driver_preference_caps_the_search_radius() {
        let state = test_state();
        // ~8.9 km away but only willing to travel 5.
        add_driver(&state, driver(1, 40.08, -75.0, 5.0));
        let order_id = add_order(&state, 40.0, -75.0);

        assign_driver(state.clone(), order_id).await.unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;

        assert!(state.requests_for_order(order_id).is_empty());
    }

    #[tokio::test]
    async fn wider_radius_reaches_far_driver_after_retries() {
        let state = test_state();
        // ~11.1 km: outside 5 and 10, inside 15.
        let far = add_driver(&state, driver(1, 40.10, -75.0, 20.0));
        let order_id = add_order(&state, 40.0, -75.0);

        assign_driver(state.clone(), order_id).await.unwrap();
        tokio::time::sleep(Duration::from_millis(200)).await;

        assert_eq!(requested_driver(&state, order_id), Some(far));
    }

    #[tokio::test]
    async fn offline_and_vehicleless_drivers_are_skipped() {
        let state = test_state();
        let mut offline = driver(1, 40.01, -75.0, 10.0);
        offline.status = DriverStatus::Offline;
        add_driver(&state, offline);
        let mut no_vehicle = driver(2, 40.01, -75.0, 10.0);
        no_vehicle.vehicle = None;
        add_driver(&state, no_vehicle);
        let order_id = add_order(&state, 40.0, -75.0);

        assign_driver(state.clone(), order_id).await.unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;

        assert!(state.requests_for_order(order_id).is_empty());
    }

    #[tokio::test]
    async fn busy_driver_near_destination_is_offered_despite_tiny_preference() {
        let state = test_state();
        let busy = add_driver(&state, driver(1, 45.0, -80.0, 1.0));

        // Active trip ending ~2.2 km from the new pickup.
        let mut trip = Order::new(
            GeoPoint {
                lat: 45.0,
                lng: -80.0,
            },
            Some(GeoPoint {
                lat: 40.02,
                lng: -75.0,
            }),
            None,
        );
        trip.status = OrderStatus::Confirmed;
        let mut accepted = AssignmentRequest::new(trip.id, busy);
        accepted.status = RequestStatus::Accepted;
        state.requests.insert((trip.id, busy), accepted);
        state.orders.insert(trip.id, trip);

        let order_id = add_order(&state, 40.0, -75.0);
        assign_driver(state.clone(), order_id).await.unwrap();

        assert_eq!(requested_driver(&state, order_id), Some(busy));
    }

    #[tokio::test]
    async fn accepted_driver_is_not_offered_distant_pickups() {
        let state = test_state();
        let busy = add_driver(&state, driver(1, 40.0, -75.0, 10.0));

        let mut trip = Order::new(
            GeoPoint {
                lat: 40.0,
                lng: -75.0,
            },
            Some(GeoPoint {
                lat: 40.1,
                lng: -75.0,
            }),
            None,
        );
        trip.status = OrderStatus::Confirmed;
        let mut accepted = AssignmentRequest::new(trip.id, busy);
        accepted.status = RequestStatus::Accepted;
        state.requests.insert((trip.id, busy), accepted);
        state.orders.insert(trip.id, trip);

        // Pickup right next to the driver's current position, but their trip
        // ends more than 3 km away.
        let order_id = add_order(&state, 40.001, -75.0);
        assign_driver(state.clone(), order_id).await.unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;

        assert!(state.requests_for_order(order_id).is_empty());
    }

    #[tokio::test]
    async fn reject_moves_the_offer_to_the_next_driver() {
        let state = test_state();
        let near = add_driver(&state, driver(1, 40.01, -75.0, 10.0));
        let next = add_driver(&state, driver(2, 40.02, -75.0, 10.0));
        let order_id = add_order(&state, 40.0, -75.0);

        assign_driver(state.clone(), order_id).await.unwrap();
        assert_eq!(requested_driver(&state, order_id), Some(near));

        let request = handle_driver_response(state.clone(), order_id, near, ResponseAction::Reject)
            .await
            .unwrap();
        assert_eq!(request.status, RequestStatus::Rejected);

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(requested_driver(&state, order_id), Some(next));
    }

    #[tokio::test]
    async fn accept_resolves_the_order() {
        let state = test_state();
        let near = add_driver(&state, driver(1, 40.01, -75.0, 10.0));
        let order_id = add_order(&state, 40.0, -75.0);

        assign_driver(state.clone(), order_id).await.unwrap();
        let request = handle_driver_response(state.clone(), order_id, near, ResponseAction::Accept)
            .await
            .unwrap();

        assert_eq!(request.status, RequestStatus::Accepted);
        let requests = state.requests_for_order(order_id);
        assert_eq!(requests.len(), 1);
        assert_eq!(
            state.orders.get(&order_id).unwrap().status,
            OrderStatus::Confirmed
        );
    }

    #[tokio::test]
    async fn duplicate_accept_is_a_silent_noop() {
        let state = test_state();
        let near = add_driver(&state, driver(1, 40.01, -75.0, 10.0));
        let order_id = add_order(&state, 40.0, -75.0);

        assign_driver(state.clone(), order_id).await.unwrap();
        handle_driver_response(state.clone(), order_id, near, ResponseAction::Accept)
            .await
            .unwrap();
        let second = handle_driver_response(state.clone(), order_id, near, ResponseAction::Reject)
            .await
            .unwrap();

        // The late reject loses the guarded transition; the accept stands.
        assert_eq!(second.status, RequestStatus::Accepted);
    }

    #[tokio::test]
    async fn search_skips_orders_with_an_outstanding_offer() {
        let state = test_state();
        let near = add_driver(&state, driver(1, 40.01, -75.0, 10.0));
        let order_id = add_order(&state, 40.0, -75.0);

        assign_driver(state.clone(), order_id).await.unwrap();
        search_at_radius(state.clone(), order_id, 0).await.unwrap();

        let requests = state.requests_for_order(order_id);
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].driver_id, near);
    }

    #[tokio::test]
    async fn response_without_an_offer_is_not_found() {
        let state = test_state();
        let lone = add_driver(&state, driver(1, 40.01, -75.0, 10.0));
        let order_id = add_order(&state, 40.0, -75.0);

        let result =
            handle_driver_response(state.clone(), order_id, lone, ResponseAction::Accept).await;
        assert!(result.is_err());
    }
}
