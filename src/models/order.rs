use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::driver::GeoPoint;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum OrderStatus {
    Pending,
    Confirmed,
    Cancelled,
    Completed,
    Refunded,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: Uuid,
    /// Short human-readable reference, shown in push payloads.
    pub code: String,
    pub pickup: GeoPoint,
    pub dropoff: Option<GeoPoint>,
    /// Opaque fare quoted by the pricing collaborator; never computed here.
    pub fare: Option<f64>,
    pub status: OrderStatus,
    pub created_at: DateTime<Utc>,
}

impl Order {
    pub fn new(pickup: GeoPoint, dropoff: Option<GeoPoint>, fare: Option<f64>) -> Self {
        let id = Uuid::new_v4();
        Self {
            id,
            code: short_code(&id),
            pickup,
            dropoff,
            fare,
            status: OrderStatus::Pending,
            created_at: Utc::now(),
        }
    }

    /// A trip that is still live from the driver's point of view.
    pub fn is_open(&self) -> bool {
        matches!(self.status, OrderStatus::Pending | OrderStatus::Confirmed)
    }
}

fn short_code(id: &Uuid) -> String {
    format!("R-{}", &id.as_simple().to_string()[..8].to_uppercase())
}
