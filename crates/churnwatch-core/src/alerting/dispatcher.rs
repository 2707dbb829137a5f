//! Gated alert delivery with an audit record per attempt

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use metrics::counter;
use parking_lot::Mutex;
use serde_json::json;
use tracing::{info, warn};
use url::Url;

use crate::config::AlertingConfig;
use crate::db::AlertLog;
use crate::error::Result;
use crate::models::{AlertConfig, AlertKind, AlertRecord, Customer, RiskSnapshot};

use super::message::DiscordMessage;
use super::notifier::{NotificationError, WebhookNotifier};

/// What happened to one alert
#[derive(Debug, Clone, PartialEq)]
pub enum DispatchOutcome {
    /// Alerting is disabled; nothing was recorded
    Skipped,
    /// Delivered and recorded
    Sent,
    /// Not delivered; a failed record was written with this reason
    Failed(String),
}

impl DispatchOutcome {
    pub fn is_sent(&self) -> bool {
        matches!(self, DispatchOutcome::Sent)
    }
}

/// Sends customer alerts and run summaries through the gates in order:
/// enabled flag, webhook validity, rate window, message size, delivery.
///
/// Every attempt past the enabled flag leaves exactly one [`AlertRecord`].
pub struct AlertDispatcher {
    notifier: WebhookNotifier,
    alerts: Arc<dyn AlertLog>,
    config: AlertingConfig,
    /// Last URL that passed the reachability probe, and when
    probed: Mutex<Option<(String, Instant)>>,
}

impl AlertDispatcher {
    pub fn new(notifier: WebhookNotifier, alerts: Arc<dyn AlertLog>, config: AlertingConfig) -> Self {
        Self {
            notifier,
            alerts,
            config,
            probed: Mutex::new(None),
        }
    }

    /// Whether `raw` would pass the delivery URL checks
    pub fn validate_webhook_url(&self, raw: &str) -> std::result::Result<Url, NotificationError> {
        self.notifier.validate_url(raw)
    }

    /// Alert about one customer's newest snapshot
    pub async fn notify_customer(
        &self,
        settings: &AlertConfig,
        kind: AlertKind,
        customer: &Customer,
        snapshot: &RiskSnapshot,
    ) -> Result<DispatchOutcome> {
        let message = DiscordMessage::customer_alert(kind, customer, snapshot, settings, Utc::now());
        self.dispatch(settings, kind, Some(customer.customer_id), message)
            .await
    }

    /// End-of-run summary
    pub async fn notify_summary(
        &self,
        settings: &AlertConfig,
        total_checked: usize,
        high_risk_count: usize,
        significant_increases: usize,
    ) -> Result<DispatchOutcome> {
        let message = DiscordMessage::summary(
            total_checked,
            high_risk_count,
            significant_increases,
            Utc::now(),
        );
        self.dispatch(settings, AlertKind::Summary, None, message).await
    }

    async fn dispatch(
        &self,
        settings: &AlertConfig,
        kind: AlertKind,
        customer_id: Option<i64>,
        message: DiscordMessage,
    ) -> Result<DispatchOutcome> {
        if !settings.is_enabled {
            return Ok(DispatchOutcome::Skipped);
        }

        let url = match self.reachable_url(&settings.webhook_url).await {
            Ok(url) => url,
            Err(reason) => {
                warn!(kind = %kind, customer_id, reason = %reason, "Webhook validation failed");
                return self.fail(kind, customer_id, json!({ "error": reason }), reason).await;
            }
        };

        let window = chrono::Duration::from_std(self.config.rate_window)
            .unwrap_or_else(|_| chrono::Duration::seconds(60));
        let recent = self.alerts.count_sent_since(Utc::now() - window).await?;
        if recent >= self.config.max_messages_per_window {
            let reason = format!(
                "rate limit exceeded ({} messages per {})",
                self.config.max_messages_per_window,
                humantime::format_duration(self.config.rate_window)
            );
            warn!(kind = %kind, customer_id, recent, "Alert rate limit exceeded");
            return self.fail(kind, customer_id, json!({ "error": reason }), reason).await;
        }

        let payload = message.to_json();
        let length = message.serialized_len();
        if length > self.config.max_message_chars {
            let reason = format!(
                "message too long ({length} > {} characters)",
                self.config.max_message_chars
            );
            warn!(kind = %kind, customer_id, length, "Alert message too long");
            return self.fail(kind, customer_id, payload, reason).await;
        }

        match self.notifier.send(&url, &payload).await {
            Ok(()) => {
                self.alerts
                    .append_alert(&AlertRecord::delivered(kind, customer_id, payload))
                    .await?;
                counter!("churnwatch_alerts_total", "kind" => kind.as_str(), "outcome" => "sent")
                    .increment(1);
                info!(kind = %kind, customer_id, "Alert sent");
                Ok(DispatchOutcome::Sent)
            }
            Err(e) => self.fail(kind, customer_id, payload, e.to_string()).await,
        }
    }

    /// Validate and probe the webhook; a passing probe is reused for one rate window
    async fn reachable_url(&self, raw: &str) -> std::result::Result<Url, String> {
        let raw = raw.trim();

        let fresh = self
            .probed
            .lock()
            .as_ref()
            .is_some_and(|(url, at)| url == raw && at.elapsed() < self.config.rate_window);
        if fresh {
            return self.notifier.validate_url(raw).map_err(|e| e.to_string());
        }

        let url = self.notifier.probe(raw).await.map_err(|e| e.to_string())?;
        *self.probed.lock() = Some((raw.to_string(), Instant::now()));
        Ok(url)
    }

    async fn fail(
        &self,
        kind: AlertKind,
        customer_id: Option<i64>,
        message: serde_json::Value,
        reason: String,
    ) -> Result<DispatchOutcome> {
        self.alerts
            .append_alert(&AlertRecord::failed(kind, customer_id, message, reason.clone()))
            .await?;
        counter!("churnwatch_alerts_total", "kind" => kind.as_str(), "outcome" => "failed")
            .increment(1);
        Ok(DispatchOutcome::Failed(reason))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MemoryStore;

    fn dispatcher(store: Arc<MemoryStore>) -> AlertDispatcher {
        let config = AlertingConfig::default();
        let notifier = WebhookNotifier::new(config.clone()).unwrap();
        AlertDispatcher::new(notifier, store, config)
    }

    #[tokio::test]
    async fn test_disabled_skips_without_record() {
        let store = Arc::new(MemoryStore::new());
        let settings = AlertConfig {
            webhook_url: "https://discord.com/api/webhooks/1/abc".to_string(),
            is_enabled: false,
            ..Default::default()
        };

        let outcome = dispatcher(store.clone())
            .notify_summary(&settings, 10, 1, 0)
            .await
            .unwrap();

        assert_eq!(outcome, DispatchOutcome::Skipped);
        assert!(store.alert_records().is_empty());
    }

    #[tokio::test]
    async fn test_invalid_url_is_recorded() {
        let store = Arc::new(MemoryStore::new());
        let settings = AlertConfig {
            webhook_url: "https://example.com/not-discord".to_string(),
            is_enabled: true,
            ..Default::default()
        };

        let outcome = dispatcher(store.clone())
            .notify_summary(&settings, 10, 1, 0)
            .await
            .unwrap();

        assert!(matches!(outcome, DispatchOutcome::Failed(_)));
        let records = store.alert_records();
        assert_eq!(records.len(), 1);
        assert!(!records[0].was_sent);
        assert_eq!(records[0].kind, AlertKind::Summary);
        assert!(records[0].message.get("error").is_some());
    }
}
