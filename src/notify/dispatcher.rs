use serde_json::json;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::models::driver::DriverSnapshot;
use crate::models::order::Order;
use crate::notify::realtime::ServerEvent;
use crate::state::AppState;

/// Fans out a fresh offer to the driver: push to every registered device and
/// a realtime event on their live channel. Best effort on both legs; a failed
/// delivery is logged and the assignment state stands.
pub fn notify_new_offer(state: &AppState, order: &Order, driver: &DriverSnapshot) {
    let data = json!({
        "order_id": order.id,
        "code": order.code,
    });
    let body = format!("Ride {} is waiting for you", order.code);

    for token in &driver.device_tokens {
        if let Err(err) = state.push.send(token, "New ride request", &body, &data) {
            warn!(
                driver_id = %driver.id,
                order_id = %order.id,
                error = %err,
                "push delivery failed"
            );
        }
    }

    let delivered = state.registry.publish(
        driver.id,
        &ServerEvent::NewOrder {
            order: order.clone(),
        },
    );
    if delivered == 0 {
        debug!(
            driver_id = %driver.id,
            order_id = %order.id,
            "driver has no live connection; offer delivered via push only"
        );
    }
}

/// Tells the driver's live clients to drop a stale offer from their UI.
pub fn notify_removed(state: &AppState, driver_id: Uuid, order_id: Uuid) {
    let delivered = state
        .registry
        .publish(driver_id, &ServerEvent::OrderTimeout { order_id });
    if delivered == 0 {
        debug!(
            driver_id = %driver_id,
            order_id = %order_id,
            "no live connection to notify about removed offer"
        );
    }
}
