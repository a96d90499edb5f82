use crate::error::AppError;
use crate::geo;
use crate::models::driver::{DriverSnapshot, GeoPoint};
use crate::models::request::RequestStatus;
use crate::state::AppState;
use uuid::Uuid;

/// Cap for destination matching: a driver finishing a trip this close to the
/// new pickup counts as available. Fixed on purpose; it overrides both the
/// search radius and the driver's own pickup preference.
pub const MAX_DESTINATION_DISTANCE_KM: f64 = 3.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Availability {
    pub effective_distance_km: f64,
    pub matched_via_destination: bool,
}

enum ActiveTrip {
    None,
    WithDestination(GeoPoint),
    UnknownDestination,
}

/// Decides whether a driver can take a new pickup right now.
///
/// A driver with no live trip is measured from their current location; a
/// driver mid-trip is measured from that trip's destination and only matches
/// within [`MAX_DESTINATION_DISTANCE_KM`]. Missing location or destination
/// data fails closed: the driver is simply unavailable.
pub fn evaluate(
    state: &AppState,
    driver: &DriverSnapshot,
    pickup: &GeoPoint,
) -> Result<Option<Availability>, AppError> {
    match active_trip(state, driver.id) {
        ActiveTrip::None => {
            let Some(location) = driver.location else {
                return Ok(None);
            };
            let distance = geo::distance_km(&location, pickup)?;
            Ok(Some(Availability {
                effective_distance_km: distance,
                matched_via_destination: false,
            }))
        }
        ActiveTrip::WithDestination(destination) => {
            let distance = geo::distance_km(&destination, pickup)?;
            if distance <= MAX_DESTINATION_DISTANCE_KM {
                Ok(Some(Availability {
                    effective_distance_km: distance,
                    matched_via_destination: true,
                }))
            } else {
                Ok(None)
            }
        }
        ActiveTrip::UnknownDestination => Ok(None),
    }
}

/// A driver's live trip is an accepted request whose order is still open.
fn active_trip(state: &AppState, driver_id: Uuid) -> ActiveTrip {
    let active_order_id = state.requests.iter().find_map(|entry| {
        let request = entry.value();
        if request.driver_id == driver_id && request.status == RequestStatus::Accepted {
            let open = state
                .orders
                .get(&request.order_id)
                .map(|order| order.is_open())
                .unwrap_or(false);
            if open {
                return Some(request.order_id);
            }
        }
        None
    });

    match active_order_id {
        None => ActiveTrip::None,
        Some(order_id) => match state.orders.get(&order_id).and_then(|order| order.dropoff) {
            Some(destination) => ActiveTrip::WithDestination(destination),
            None => ActiveTrip::UnknownDestination,
        },
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use uuid::Uuid;

    use super::{evaluate, MAX_DESTINATION_DISTANCE_KM};
    use crate::config::DispatchConfig;
    use crate::models::driver::{DriverSnapshot, DriverStatus, GeoPoint, Vehicle};
    use crate::models::order::{Order, OrderStatus};
    use crate::models::request::{AssignmentRequest, RequestStatus};
    use crate::state::AppState;

    fn state() -> AppState {
        let (state, _rx) = AppState::new(DispatchConfig::default(), 16);
        state
    }

    fn driver(id_seed: u128, location: Option<GeoPoint>) -> DriverSnapshot {
        DriverSnapshot {
            id: Uuid::from_u128(id_seed),
            name: "test-driver".to_string(),
            location,
            located_at: location.map(|_| Utc::now()),
            status: DriverStatus::Online,
            vehicle: Some(Vehicle {
                plate: "B 1234 XY".to_string(),
                model: "Toyota Avanza".to_string(),
            }),
            max_pickup_distance_km: 5.0,
            device_tokens: vec![],
            updated_at: Utc::now(),
        }
    }

    fn give_active_trip(state: &AppState, driver_id: Uuid, dropoff: Option<GeoPoint>) {
        let mut order = Order::new(
            GeoPoint {
                lat: 41.0,
                lng: -74.0,
            },
            dropoff,
            None,
        );
        order.status = OrderStatus::Confirmed;
        let mut request = AssignmentRequest::new(order.id, driver_id);
        request.status = RequestStatus::Accepted;
        state.requests.insert((order.id, driver_id), request);
        state.orders.insert(order.id, order);
    }

    const PICKUP: GeoPoint = GeoPoint {
        lat: 40.0,
        lng: -75.0,
    };

    #[test]
    fn free_driver_is_measured_from_current_location() {
        let state = state();
        let driver = driver(
            1,
            Some(GeoPoint {
                lat: 40.03,
                lng: -75.0,
            }),
        );

        let availability = evaluate(&state, &driver, &PICKUP).unwrap().unwrap();
        assert!(!availability.matched_via_destination);
        assert!((availability.effective_distance_km - 3.34).abs() < 0.05);
    }

    #[test]
    fn driver_without_location_is_unavailable() {
        let state = state();
        let driver = driver(1, None);
        assert!(evaluate(&state, &driver, &PICKUP).unwrap().is_none());
    }

    #[test]
    fn destination_within_cap_matches_via_destination() {
        let state = state();
        let driver = driver(
            1,
            Some(GeoPoint {
                lat: 45.0,
                lng: -80.0,
            }),
        );
        give_active_trip(
            &state,
            driver.id,
            Some(GeoPoint {
                lat: 40.02,
                lng: -75.0,
            }),
        );

        let availability = evaluate(&state, &driver, &PICKUP).unwrap().unwrap();
        assert!(availability.matched_via_destination);
        assert!(availability.effective_distance_km <= MAX_DESTINATION_DISTANCE_KM);
    }

    #[test]
    fn destination_beyond_cap_makes_driver_unavailable() {
        let state = state();
        let driver = driver(
            1,
            Some(GeoPoint {
                lat: 40.001,
                lng: -75.0,
            }),
        );
        give_active_trip(
            &state,
            driver.id,
            Some(GeoPoint {
                lat: 40.1,
                lng: -75.0,
            }),
        );

        assert!(evaluate(&state, &driver, &PICKUP).unwrap().is_none());
    }

    #[test]
    fn missing_destination_fails_closed() {
        let state = state();
        let driver = driver(
            1,
            Some(GeoPoint {
                lat: 40.001,
                lng: -75.0,
            }),
        );
        give_active_trip(&state, driver.id, None);

        assert!(evaluate(&state, &driver, &PICKUP).unwrap().is_none());
    }

    #[test]
    fn completed_trip_no_longer_blocks_the_driver() {
        let state = state();
        let driver = driver(
            1,
            Some(GeoPoint {
                lat: 40.01,
                lng: -75.0,
            }),
        );
        give_active_trip(
            &state,
            driver.id,
            Some(GeoPoint {
                lat: 44.0,
                lng: -70.0,
            }),
        );
        for mut order in state.orders.iter_mut() {
            order.status = OrderStatus::Completed;
        }

        let availability = evaluate(&state, &driver, &PICKUP).unwrap().unwrap();
        assert!(!availability.matched_via_destination);
    }
}
