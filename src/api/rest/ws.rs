use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::response::IntoResponse;
use chrono::Utc;
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::AppError;
use crate::models::order::{Order, OrderStatus};
use crate::notify::realtime::{ClientEvent, ServerEvent};
use crate::state::AppState;

/// Realtime channel keyed by driver identity. Authentication happens at the
/// edge; by the time the upgrade reaches us the driver id is trusted.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Path(driver_id): Path<Uuid>,
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, AppError> {
    if !state.drivers.contains_key(&driver_id) {
        return Err(AppError::NotFound(format!("driver {driver_id} not found")));
    }

    Ok(ws.on_upgrade(move |socket| handle_socket(socket, state, driver_id)))
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>, driver_id: Uuid) {
    let (mut sender, mut receiver) = socket.split();
    let (conn_id, events_rx) = state.registry.subscribe(driver_id);
    let mut events = UnboundedReceiverStream::new(events_rx);
    state.metrics.connected_drivers.inc();

    info!(driver_id = %driver_id, "driver connected");

    // Greeting plus any offer the driver missed while disconnected.
    let greeting = [
        ServerEvent::ConnectionEstablished { driver_id },
        ServerEvent::InitialOrders {
            orders: outstanding_offers(&state, driver_id),
        },
    ];
    for event in greeting {
        if send_event(&mut sender, &event).await.is_err() {
            state.registry.unsubscribe(driver_id, conn_id);
            state.metrics.connected_drivers.dec();
            return;
        }
    }

    loop {
        tokio::select! {
            event = events.next() => match event {
                Some(event) => {
                    if send_event(&mut sender, &event).await.is_err() {
                        break;
                    }
                }
                None => break,
            },
            incoming = receiver.next() => match incoming {
                Some(Ok(Message::Text(text))) => match serde_json::from_str::<ClientEvent>(&text) {
                    Ok(ClientEvent::Ping) => {
                        if send_event(&mut sender, &ServerEvent::Pong).await.is_err() {
                            break;
                        }
                    }
                    Err(err) => {
                        warn!(driver_id = %driver_id, error = %err, "unparseable client message");
                    }
                },
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(_)) => break,
            },
        }
    }

    state.registry.unsubscribe(driver_id, conn_id);
    state.metrics.connected_drivers.dec();
    info!(driver_id = %driver_id, "driver disconnected");
}

async fn send_event(
    sender: &mut SplitSink<WebSocket, Message>,
    event: &ServerEvent,
) -> Result<(), ()> {
    let json = match serde_json::to_string(event) {
        Ok(json) => json,
        Err(err) => {
            warn!(error = %err, "failed to serialize realtime event");
            return Ok(());
        }
    };

    sender.send(Message::Text(json)).await.map_err(|_| ())
}

/// Offers still waiting on this driver: requested, not yet expired, and the
/// order has not been resolved elsewhere.
fn outstanding_offers(state: &AppState, driver_id: Uuid) -> Vec<Order> {
    let now = Utc::now();

    state
        .requests
        .iter()
        .filter(|entry| {
            let request = entry.value();
            request.driver_id == driver_id
                && request.is_open()
                && now - request.requested_at < state.config.offer_timeout
        })
        .filter_map(|entry| {
            state.orders.get(&entry.value().order_id).and_then(|order| {
                if order.status == OrderStatus::Pending {
                    Some(order.value().clone())
                } else {
                    None
                }
            })
        })
        .collect()
}
