use std::collections::HashMap;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::models::order::Order;

/// Server-to-client messages on a driver's live channel.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerEvent {
    ConnectionEstablished { driver_id: Uuid },
    InitialOrders { orders: Vec<Order> },
    NewOrder { order: Order },
    OrderTimeout { order_id: Uuid },
    Pong,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientEvent {
    Ping,
}

/// Maps driver id to their live connections, independent of the transport.
/// A driver may hold several connections (multiple devices); publish fans
/// out to all of them and drops senders whose receiver side is gone.
#[derive(Default)]
pub struct ConnectionRegistry {
    connections: DashMap<Uuid, HashMap<Uuid, mpsc::UnboundedSender<ServerEvent>>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, driver_id: Uuid) -> (Uuid, mpsc::UnboundedReceiver<ServerEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let conn_id = Uuid::new_v4();
        self.connections
            .entry(driver_id)
            .or_default()
            .insert(conn_id, tx);
        (conn_id, rx)
    }

    pub fn unsubscribe(&self, driver_id: Uuid, conn_id: Uuid) {
        if let Some(mut entry) = self.connections.get_mut(&driver_id) {
            entry.remove(&conn_id);
            let drained = entry.is_empty();
            drop(entry);
            if drained {
                self.connections.remove_if(&driver_id, |_, conns| conns.is_empty());
            }
        }
    }

    /// Delivers an event to every live connection of the driver, returning
    /// how many connections took it.
    pub fn publish(&self, driver_id: Uuid, event: &ServerEvent) -> usize {
        let Some(mut entry) = self.connections.get_mut(&driver_id) else {
            return 0;
        };

        let mut delivered = 0;
        entry.retain(|_, tx| match tx.send(event.clone()) {
            Ok(()) => {
                delivered += 1;
                true
            }
            Err(_) => false,
        });
        delivered
    }

    pub fn connection_count(&self) -> usize {
        self.connections.iter().map(|entry| entry.value().len()).sum()
    }
}
