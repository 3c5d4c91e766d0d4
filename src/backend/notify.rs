//! Notifications written to the daemon log

use async_trait::async_trait;
use tracing::info;

use crate::capability::{NotificationSink, NotifyError};
use crate::events::{NotificationContext, NotificationKind};

#[derive(Debug, Default)]
pub struct LogNotificationSink;

#[async_trait]
impl NotificationSink for LogNotificationSink {
    async fn notify(
        &self,
        kind: NotificationKind,
        context: &NotificationContext,
    ) -> Result<(), NotifyError> {
        let context =
            serde_json::to_string(context).map_err(|e| NotifyError::Delivery(e.to_string()))?;
        info!(?kind, %context, "notification");
        Ok(())
    }
}
