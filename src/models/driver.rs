use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const DEFAULT_MAX_PICKUP_DISTANCE_KM: f64 = 5.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DriverStatus {
    Online,
    Offline,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Vehicle {
    pub plate: String,
    pub model: String,
}

/// Read model of a driver as the matcher sees them. Location and preference
/// records are owned by the driver-facing API; the engine only reads them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriverSnapshot {
    pub id: Uuid,
    pub name: String,
    pub location: Option<GeoPoint>,
    pub located_at: Option<DateTime<Utc>>,
    pub status: DriverStatus,
    pub vehicle: Option<Vehicle>,
    pub max_pickup_distance_km: f64,
    pub device_tokens: Vec<String>,
    pub updated_at: DateTime<Utc>,
}

impl DriverSnapshot {
    /// Online with a registered vehicle. Availability (active trips,
    /// distance caps) is a separate check on top of this.
    pub fn is_dispatchable(&self) -> bool {
        self.status == DriverStatus::Online && self.vehicle.is_some()
    }
}
