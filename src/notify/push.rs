use serde_json::Value;
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
#[error("push delivery failed: {0}")]
pub struct PushError(pub String);

/// Transport seam for driver push notifications. The real gateway (FCM/APNs)
/// lives behind this trait; delivery failures never affect dispatch state.
pub trait PushNotifier: Send + Sync {
    fn send(&self, device_token: &str, title: &str, body: &str, data: &Value)
        -> Result<(), PushError>;
}

/// Logs instead of delivering. Used when no gateway is configured.
pub struct LogPushNotifier;

impl PushNotifier for LogPushNotifier {
    fn send(
        &self,
        device_token: &str,
        title: &str,
        body: &str,
        data: &Value,
    ) -> Result<(), PushError> {
        info!(
            device_token = %device_token,
            title = %title,
            body = %body,
            data = %data,
            "push notification (log transport)"
        );
        Ok(())
    }
}
