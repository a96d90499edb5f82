use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum RequestStatus {
    Requested,
    Accepted,
    Rejected,
    Timeout,
}

/// One offer of one order to one driver. Requests are never deleted; the
/// table doubles as the audit trail of every dispatch attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssignmentRequest {
    pub order_id: Uuid,
    pub driver_id: Uuid,
    pub status: RequestStatus,
    pub requested_at: DateTime<Utc>,
    pub responded_at: Option<DateTime<Utc>>,
}

impl AssignmentRequest {
    pub fn new(order_id: Uuid, driver_id: Uuid) -> Self {
        Self {
            order_id,
            driver_id,
            status: RequestStatus::Requested,
            requested_at: Utc::now(),
            responded_at: None,
        }
    }

    pub fn is_open(&self) -> bool {
        self.status == RequestStatus::Requested
    }
}
