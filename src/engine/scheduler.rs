use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::engine::coordinator;
use crate::models::order::OrderStatus;
use crate::models::request::RequestStatus;
use crate::notify::dispatcher;
use crate::state::AppState;

/// Periodic sweep reclaiming offers nobody answered in time.
pub async fn run_timeout_scheduler(state: Arc<AppState>) {
    let mut ticker = tokio::time::interval(state.config.sweep_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    info!(
        interval_secs = state.config.sweep_interval.as_secs(),
        "timeout scheduler started"
    );

    loop {
        ticker.tick().await;
        sweep(state.clone()).await;
    }
}

/// One sweep pass. The guarded transition makes it idempotent: under
/// overlapping sweeps or a racing accept, each overdue request is moved to
/// `Timeout` at most once, and only the winner reassigns the order.
pub async fn sweep(state: Arc<AppState>) {
    let now = Utc::now();

    let overdue: Vec<(Uuid, Uuid)> = state
        .requests
        .iter()
        .filter_map(|entry| {
            let request = entry.value();
            if request.status != RequestStatus::Requested {
                return None;
            }
            let order_pending = state
                .orders
                .get(&request.order_id)
                .map(|order| order.status == OrderStatus::Pending)
                .unwrap_or(false);
            if !order_pending {
                return None;
            }
            if now - request.requested_at >= state.config.offer_timeout {
                Some((request.order_id, request.driver_id))
            } else {
                None
            }
        })
        .collect();

    for (order_id, driver_id) in overdue {
        if !state.transition_request(order_id, driver_id, RequestStatus::Timeout) {
            continue;
        }
        state.metrics.offer_timeouts_total.inc();
        warn!(
            order_id = %order_id,
            driver_id = %driver_id,
            "offer timed out; reassigning order"
        );

        dispatcher::notify_removed(&state, driver_id, order_id);

        let search_state = state.clone();
        tokio::spawn(async move {
            if let Err(err) = coordinator::search_at_radius(search_state, order_id, 0).await {
                error!(order_id = %order_id, error = %err, "re-search after timeout failed");
            }
        });
    }
}

/// Deferred continuation of a candidate search at the next radius. The run
/// re-checks order state, so a job outlived by an accept or cancellation is
/// a no-op.
#[derive(Debug, Clone, Copy)]
pub struct RadiusRetryJob {
    pub order_id: Uuid,
    pub radius_idx: usize,
}

impl RadiusRetryJob {
    pub async fn run(self, state: Arc<AppState>) {
        if let Err(err) = coordinator::search_at_radius(state, self.order_id, self.radius_idx).await
        {
            error!(order_id = %self.order_id, error = %err, "radius retry failed");
        }
    }
}

/// Single seam for deferred work, so there is one retry code path whether
/// jobs wait out the configured delay or run straight away.
pub trait JobExecutor: Send + Sync {
    fn schedule_retry(&self, state: Arc<AppState>, delay: Duration, job: RadiusRetryJob);
}

/// Waits out the delay on the runtime timer before running the job.
pub struct QueuedExecutor;

impl JobExecutor for QueuedExecutor {
    fn schedule_retry(&self, state: Arc<AppState>, delay: Duration, job: RadiusRetryJob) {
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            job.run(state).await;
        });
    }
}

/// Skips the delay. Selected via `INLINE_RETRIES` and used by the test suite.
pub struct InlineExecutor;

impl JobExecutor for InlineExecutor {
    fn schedule_retry(&self, state: Arc<AppState>, _delay: Duration, job: RadiusRetryJob) {
        tokio::spawn(async move {
            job.run(state).await;
        });
    }
}
