use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::engine::coordinator;
use crate::error::AppError;
use crate::state::AppState;

/// Queues an order for matching. The caller's response never waits on the
/// search itself; the engine loop picks the order up asynchronously.
pub async fn enqueue_order(state: &AppState, order_id: Uuid) -> Result<(), AppError> {
    state
        .order_tx
        .send(order_id)
        .await
        .map_err(|err| AppError::Internal(format!("order queue send failed: {err}")))?;

    state.metrics.orders_in_queue.inc();
    Ok(())
}

/// Engine intake loop: pulls freshly created orders off the queue and spawns
/// an independent matching task per order, so one slow search never stalls
/// the others.
pub async fn run_assignment_engine(state: Arc<AppState>, mut order_rx: mpsc::Receiver<Uuid>) {
    info!("assignment engine started");

    while let Some(order_id) = order_rx.recv().await {
        state.metrics.orders_in_queue.dec();

        let task_state = state.clone();
        tokio::spawn(async move {
            if let Err(err) = coordinator::assign_driver(task_state, order_id).await {
                error!(order_id = %order_id, error = %err, "failed to dispatch order");
            }
        });
    }

    warn!("assignment engine stopped: queue channel closed");
}
