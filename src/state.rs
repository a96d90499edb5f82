use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use dashmap::DashMap;
use tokio::sync::{mpsc, Mutex};
use uuid::Uuid;

use crate::config::DispatchConfig;
use crate::engine::scheduler::{InlineExecutor, JobExecutor, QueuedExecutor};
use crate::models::driver::DriverSnapshot;
use crate::models::order::Order;
use crate::models::request::{AssignmentRequest, RequestStatus};
use crate::notify::push::{LogPushNotifier, PushNotifier};
use crate::notify::realtime::ConnectionRegistry;
use crate::observability::metrics::Metrics;

pub struct AppState {
    pub config: DispatchConfig,
    pub drivers: DashMap<Uuid, DriverSnapshot>,
    pub orders: DashMap<Uuid, Order>,
    /// Dispatch audit trail, keyed by (order, driver). Rows are never removed.
    pub requests: DashMap<(Uuid, Uuid), AssignmentRequest>,
    search_locks: DashMap<Uuid, Arc<Mutex<()>>>,
    pub order_tx: mpsc::Sender<Uuid>,
    pub registry: ConnectionRegistry,
    pub push: Box<dyn PushNotifier>,
    pub executor: Box<dyn JobExecutor>,
    pub metrics: Metrics,
}

impl AppState {
    pub fn new(config: DispatchConfig, order_queue_size: usize) -> (Self, mpsc::Receiver<Uuid>) {
        let (order_tx, order_rx) = mpsc::channel(order_queue_size);

        let executor: Box<dyn JobExecutor> = if config.inline_retries {
            Box::new(InlineExecutor)
        } else {
            Box::new(QueuedExecutor)
        };

        (
            Self {
                config,
                drivers: DashMap::new(),
                orders: DashMap::new(),
                requests: DashMap::new(),
                search_locks: DashMap::new(),
                order_tx,
                registry: ConnectionRegistry::new(),
                push: Box::new(LogPushNotifier),
                executor,
                metrics: Metrics::new(),
            },
            order_rx,
        )
    }

    /// Per-order mutex serializing candidate searches, so a reject, a timeout
    /// and a radius retry for the same order never interleave.
    pub fn search_lock(&self, order_id: Uuid) -> Arc<Mutex<()>> {
        self.search_locks
            .entry(order_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Guarded status transition: succeeds only while the request is still
    /// `Requested`. The dashmap entry lock makes the check-and-set atomic,
    /// so concurrent writers (accept vs sweep) resolve to exactly one winner.
    pub fn transition_request(&self, order_id: Uuid, driver_id: Uuid, to: RequestStatus) -> bool {
        match self.requests.get_mut(&(order_id, driver_id)) {
            Some(mut request) if request.status == RequestStatus::Requested => {
                request.status = to;
                request.responded_at = Some(Utc::now());
                true
            }
            _ => false,
        }
    }

    /// Creates the offer row, or revives an existing (order, driver) row in
    /// place rather than duplicating it.
    pub fn upsert_offer(&self, order_id: Uuid, driver_id: Uuid) -> AssignmentRequest {
        let mut entry = self
            .requests
            .entry((order_id, driver_id))
            .or_insert_with(|| AssignmentRequest::new(order_id, driver_id));
        entry.status = RequestStatus::Requested;
        entry.requested_at = Utc::now();
        entry.responded_at = None;
        entry.clone()
    }

    /// Drivers that already saw this order and did not accept it. They are
    /// skipped by every later search for the order.
    pub fn excluded_drivers(&self, order_id: Uuid) -> HashSet<Uuid> {
        self.requests
            .iter()
            .filter(|entry| {
                let request = entry.value();
                request.order_id == order_id && request.status != RequestStatus::Accepted
            })
            .map(|entry| entry.value().driver_id)
            .collect()
    }

    /// True when the order already has an offer in flight or was accepted;
    /// either way a new search must not double-offer it.
    pub fn has_blocking_request(&self, order_id: Uuid) -> bool {
        self.requests.iter().any(|entry| {
            let request = entry.value();
            request.order_id == order_id
                && matches!(
                    request.status,
                    RequestStatus::Requested | RequestStatus::Accepted
                )
        })
    }

    pub fn requests_for_order(&self, order_id: Uuid) -> Vec<AssignmentRequest> {
        self.requests
            .iter()
            .filter(|entry| entry.value().order_id == order_id)
            .map(|entry| entry.value().clone())
            .collect()
    }
}
