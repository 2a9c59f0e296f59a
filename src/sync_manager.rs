use tracing::{info, warn};

use crate::domain::TelemetrySnapshot;
use crate::messaging::{MessageQos, MessagingClient};
use crate::store::DurableStore;

/// How many queued rows to attempt to flush per sync pass.
const DRAIN_LIMIT: i64 = 50;

/// Publishes the current telemetry reading, then drains whatever the
/// offline buffer accumulated while the broker was unreachable. Stops
/// at the first publish failure for this pass; unflushed rows stay
/// queued for the next cycle rather than being dropped or retried
/// in a tight loop.
pub struct SyncManager<'a> {
    store: &'a DurableStore,
    messaging: &'a MessagingClient,
}

impl<'a> SyncManager<'a> {
    pub fn new(store: &'a DurableStore, messaging: &'a MessagingClient) -> Self {
        Self { store, messaging }
    }

    pub async fn sync(&self, snap: &TelemetrySnapshot) -> anyhow::Result<()> {
        let payload = serde_json::to_string(snap)?;
        self.messaging.publish_telemetry(&payload).await.ok();

        if !self.messaging.is_connected() {
            return Ok(());
        }

        let pending = self.store.fetch_pending_sync(DRAIN_LIMIT).await?;
        if pending.is_empty() {
            return Ok(());
        }

        let mut flushed = Vec::with_capacity(pending.len());
        for row in pending {
            let qos = if row.qos == MessageQos::AtLeastOnce as i64 {
                MessageQos::AtLeastOnce
            } else {
                MessageQos::AtMostOnce
            };
            match self
                .messaging
                .publish_buffered_payload(&row.topic, &row.payload, qos)
                .await
            {
                Ok(()) => flushed.push(row.id),
                Err(e) => {
                    warn!(error = %e, topic = %row.topic, "sync drain stopped on publish failure");
                    break;
                }
            }
        }

        if !flushed.is_empty() {
            let count = flushed.len();
            self.store.mark_synced(&flushed).await?;
            info!(count, "sync manager flushed buffered rows");
        }
        Ok(())
    }
}
