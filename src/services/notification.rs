//! Conflict notification service implementation
//!
//! Posts operator-attention notices to a configured webhook. Delivery is
//! fire-and-forget from the queue processor's point of view: the processor
//! spawns the send and never blocks an entry's transition on it.

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;
use uuid::Uuid;

use crate::config::NotificationConfig;
use crate::utils::errors::{DoorListError, NotifyError, NotifyResult, Result};

/// Notice sent when a queue entry lands in `conflict`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConflictNotice {
    pub entry_id: Uuid,
    pub event_id: Uuid,
    pub device_id: String,
    pub action_type: String,
    pub reason: String,
    pub occurred_at: chrono::DateTime<chrono::Utc>,
}

#[async_trait]
pub trait ConflictNotifier: Send + Sync {
    async fn notify_conflict(&self, notice: ConflictNotice) -> NotifyResult<()>;
}

/// Webhook-backed notifier.
#[derive(Clone)]
pub struct WebhookNotifier {
    client: Client,
    webhook_url: Url,
}

impl WebhookNotifier {
    /// Create a new WebhookNotifier instance
    pub fn new(config: &NotificationConfig) -> Result<Self> {
        let raw_url = config.webhook_url.as_deref().ok_or_else(|| {
            DoorListError::Config("Notifications enabled without a webhook URL".to_string())
        })?;
        let webhook_url = Url::parse(raw_url)?;

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .user_agent("DoorList/1.0")
            .build()
            .map_err(DoorListError::Http)?;

        Ok(Self {
            client,
            webhook_url,
        })
    }
}

#[async_trait]
impl ConflictNotifier for WebhookNotifier {
    async fn notify_conflict(&self, notice: ConflictNotice) -> NotifyResult<()> {
        debug!(
            entry_id = %notice.entry_id,
            url = %self.webhook_url,
            "Sending conflict notice"
        );

        let response = self
            .client
            .post(self.webhook_url.clone())
            .json(&notice)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    NotifyError::Timeout
                } else {
                    NotifyError::RequestFailed(e.to_string())
                }
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(NotifyError::InvalidResponse(format!(
                "HTTP {}: {}",
                status, error_text
            )));
        }

        debug!(entry_id = %notice.entry_id, "Conflict notice delivered");
        Ok(())
    }
}

/// Notifier used when notifications are disabled. Logs and succeeds.
#[derive(Clone, Default)]
pub struct NullNotifier;

impl NullNotifier {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ConflictNotifier for NullNotifier {
    async fn notify_conflict(&self, notice: ConflictNotice) -> NotifyResult<()> {
        warn!(
            entry_id = %notice.entry_id,
            device_id = %notice.device_id,
            reason = %notice.reason,
            "Conflict requires operator attention (notifications disabled)"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn notice() -> ConflictNotice {
        ConflictNotice {
            entry_id: Uuid::new_v4(),
            event_id: Uuid::new_v4(),
            device_id: "door-1".to_string(),
            action_type: "check-in".to_string(),
            reason: "session S1 at capacity (5/5)".to_string(),
            occurred_at: chrono::Utc::now(),
        }
    }

    #[test]
    fn test_notice_serializes_with_wire_casing() {
        let value = serde_json::to_value(notice()).unwrap();
        assert!(value.get("entryId").is_some());
        assert!(value.get("deviceId").is_some());
        assert!(value.get("actionType").is_some());
        assert!(value.get("entry_id").is_none());
    }

    #[test]
    fn test_webhook_notifier_requires_url() {
        let config = NotificationConfig {
            enabled: true,
            webhook_url: None,
            timeout_seconds: 5,
        };
        assert!(WebhookNotifier::new(&config).is_err());
    }

    #[test]
    fn test_webhook_notifier_rejects_bad_url() {
        let config = NotificationConfig {
            enabled: true,
            webhook_url: Some("not a url".to_string()),
            timeout_seconds: 5,
        };
        assert!(WebhookNotifier::new(&config).is_err());
    }

    #[tokio::test]
    async fn test_null_notifier_always_succeeds() {
        let notifier = NullNotifier::new();
        assert!(notifier.notify_conflict(notice()).await.is_ok());
    }
}
