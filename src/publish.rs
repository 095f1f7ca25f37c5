//! Fan-out of dashboard snapshots and alert events.
//!
//! ```text
//! ReconciliationLoop ──┐
//!                      ├──▶ Publisher::publish(channel, json) ──▶ broadcast ──▶ SSE subscribers
//! Request handlers ────┘
//! ```
//!
//! Publishing is best effort: callers log failures and carry on, the
//! database row is the record of truth.

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::broadcast;

use crate::model::alert::Alert;

#[derive(Debug, Error)]
pub enum PublishError {
    #[error("failed to encode payload: {0}")]
    Encode(#[from] serde_json::Error),
    #[cfg(test)]
    #[error("publisher closed")]
    Closed,
}

#[async_trait]
pub trait Publisher: Send + Sync {
    async fn publish(&self, channel: &str, payload: Value) -> Result<(), PublishError>;
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Envelope {
    pub channel: String,
    pub payload: Value,
}

/// In-process bus. A publish with nobody listening is not an error.
#[derive(Debug, Clone)]
pub struct BroadcastPublisher {
    tx: broadcast::Sender<Envelope>,
}

impl BroadcastPublisher {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Envelope> {
        self.tx.subscribe()
    }
}

#[async_trait]
impl Publisher for BroadcastPublisher {
    async fn publish(&self, channel: &str, payload: Value) -> Result<(), PublishError> {
        // send only fails when there are no receivers
        let _ = self.tx.send(Envelope {
            channel: channel.to_string(),
            payload,
        });
        Ok(())
    }
}

pub fn dashboard_channel(site_id: u64) -> String {
    format!("dashboard:site:{site_id}")
}

pub fn alerts_channel(site_id: u64) -> String {
    format!("alerts:site:{site_id}")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertEvent {
    Created,
    Resolved,
    Acknowledged,
}

/// Publishes one event per alert on its site's channel, logging failures.
pub async fn publish_alert_events(publisher: &dyn Publisher, event: AlertEvent, alerts: &[Alert]) {
    for alert in alerts {
        let payload = serde_json::json!({ "event": event, "alert": alert });
        if let Err(e) = publisher.publish(&alerts_channel(alert.site_id), payload).await {
            tracing::warn!(error = %e, alert_id = alert.id, ?event, "Failed to publish alert event");
        }
    }
}

#[cfg(test)]
pub use recording::RecordingPublisher;
