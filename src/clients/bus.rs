use async_trait::async_trait;
use chrono::Utc;
use serde_json::{json, Value};
use std::time::Duration;

/// The finite outbound topic set. Collaborators (persistence, reporting)
/// subscribe on the other side of the bus.
pub mod topics {
    pub const SIGNAL_ACCEPTED: &str = "signal.accepted";
    pub const SIGNAL_REJECTED: &str = "signal.rejected";
    pub const TRADE_ENTERED: &str = "trade.entered";
    pub const TRADE_EXITED: &str = "trade.exited";
    pub const TRADE_FAILED: &str = "trade.failed";
    pub const MONITOR_EMISSION: &str = "monitor.emission";
}

/// Fire-and-forget outbound event publisher. Delivery is best-effort:
/// failures are logged and never block or fail the pipeline.
#[async_trait]
pub trait EventBus: Send + Sync {
    async fn publish(&self, topic: &'static str, payload: Value);
}

// ---------------------------------------------------------------------------
// Webhook implementation
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct WebhookBus {
    http: reqwest::Client,
    url: String,
}

impl WebhookBus {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Self {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_default();
        Self {
            http,
            url: url.into(),
        }
    }
}

#[async_trait]
impl EventBus for WebhookBus {
    async fn publish(&self, topic: &'static str, payload: Value) {
        let envelope = json!({
            "topic": topic,
            "payload": payload,
            "at": Utc::now(),
        });

        match self.http.post(&self.url).json(&envelope).send().await {
            Ok(resp) => {
                if !resp.status().is_success() {
                    tracing::warn!(
                        topic,
                        status = %resp.status(),
                        "Event bus returned non-2xx"
                    );
                }
            }
            Err(e) => {
                tracing::warn!(topic, error = %e, "Failed to publish event");
            }
        }
    }
}

/// Used when no bus endpoint is configured.
#[derive(Debug, Clone, Default)]
pub struct NoopBus;

#[async_trait]
impl EventBus for NoopBus {
    async fn publish(&self, topic: &'static str, _payload: Value) {
        tracing::trace!(topic, "Event dropped (no bus configured)");
    }
}
