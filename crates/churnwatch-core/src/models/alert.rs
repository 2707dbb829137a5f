//! Alert data models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Error, Result};

/// Default probability above which a customer counts as high-risk
pub const DEFAULT_HIGH_RISK_THRESHOLD: f64 = 0.7;

/// Default percentage increase that counts as significant
pub const DEFAULT_RISK_INCREASE_THRESHOLD: f64 = 20.0;

/// Kind of alert notification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AlertKind {
    /// Probability exceeded the high-risk threshold
    HighRisk,
    /// Probability rose by more than the increase threshold
    RiskIncrease,
    /// End-of-run summary
    Summary,
}

impl AlertKind {
    /// Database / wire representation
    pub fn as_str(self) -> &'static str {
        match self {
            AlertKind::HighRisk => "HIGH_RISK",
            AlertKind::RiskIncrease => "RISK_INCREASE",
            AlertKind::Summary => "SUMMARY",
        }
    }

    /// Parse the database / wire representation
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "HIGH_RISK" => Some(AlertKind::HighRisk),
            "RISK_INCREASE" => Some(AlertKind::RiskIncrease),
            "SUMMARY" => Some(AlertKind::Summary),
            _ => None,
        }
    }
}

impl std::fmt::Display for AlertKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Audit record for one attempted notification
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertRecord {
    /// Unique identifier
    pub id: Uuid,

    /// Customer the alert is about (None for summaries)
    pub customer_id: Option<i64>,

    /// Alert kind
    pub kind: AlertKind,

    /// Exact payload sent, or `{"error": ...}` when no payload was built
    pub message: serde_json::Value,

    /// When the attempt finished
    pub sent_at: DateTime<Utc>,

    /// Whether the webhook accepted the message
    pub was_sent: bool,

    /// Failure reason
    pub error_message: Option<String>,
}

impl AlertRecord {
    /// Record a delivered message
    pub fn delivered(kind: AlertKind, customer_id: Option<i64>, message: serde_json::Value) -> Self {
        Self {
            id: Uuid::new_v4(),
            customer_id,
            kind,
            message,
            sent_at: Utc::now(),
            was_sent: true,
            error_message: None,
        }
    }

    /// Record a failed attempt
    pub fn failed(
        kind: AlertKind,
        customer_id: Option<i64>,
        message: serde_json::Value,
        error: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            customer_id,
            kind,
            message,
            sent_at: Utc::now(),
            was_sent: false,
            error_message: Some(error.into()),
        }
    }
}

/// Runtime-editable alert settings (single row)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertConfig {
    /// Webhook target; empty when unset
    pub webhook_url: String,

    /// Master switch for all notifications
    pub is_enabled: bool,

    /// Probability above which a customer is high-risk
    pub high_risk_threshold: f64,

    /// Percentage increase above which a change is significant
    pub risk_increase_threshold: f64,

    /// When the row was created
    pub created_at: DateTime<Utc>,

    /// When the row was last written
    pub updated_at: DateTime<Utc>,
}

impl Default for AlertConfig {
    fn default() -> Self {
        let now = Utc::now();
        Self {
            webhook_url: String::new(),
            is_enabled: false,
            high_risk_threshold: DEFAULT_HIGH_RISK_THRESHOLD,
            risk_increase_threshold: DEFAULT_RISK_INCREASE_THRESHOLD,
            created_at: now,
            updated_at: now,
        }
    }
}

impl AlertConfig {
    /// Merge a validated update into this config
    pub fn apply(&mut self, input: &AlertConfigInput) {
        if let Some(url) = &input.webhook_url {
            self.webhook_url = url.trim().to_string();
        }
        if let Some(enabled) = input.is_enabled {
            self.is_enabled = enabled;
        }
        if let Some(threshold) = input.high_risk_threshold {
            self.high_risk_threshold = threshold;
        }
        if let Some(threshold) = input.risk_increase_threshold {
            self.risk_increase_threshold = threshold;
        }
        self.updated_at = Utc::now();
    }
}

/// Partial update for [`AlertConfig`]
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AlertConfigInput {
    pub webhook_url: Option<String>,
    pub is_enabled: Option<bool>,
    pub high_risk_threshold: Option<f64>,
    pub risk_increase_threshold: Option<f64>,
}

impl AlertConfigInput {
    /// Validate before commit
    pub fn validate(&self) -> Result<()> {
        if let Some(url) = &self.webhook_url {
            let url = url.trim();
            if !url.is_empty() {
                let parsed = url::Url::parse(url)
                    .map_err(|e| Error::validation(format!("webhook_url is not a valid URL: {e}")))?;
                if !matches!(parsed.scheme(), "http" | "https") || parsed.host_str().is_none() {
                    return Err(Error::validation("webhook_url must be an http(s) URL with a host"));
                }
            }
        }

        if let Some(threshold) = self.high_risk_threshold {
            if !threshold.is_finite() || !(0.0..=1.0).contains(&threshold) {
                return Err(Error::validation(
                    "high_risk_threshold must be a number between 0 and 1",
                ));
            }
        }

        if let Some(threshold) = self.risk_increase_threshold {
            if !threshold.is_finite() || threshold < 0.0 {
                return Err(Error::validation(
                    "risk_increase_threshold must be a non-negative number",
                ));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(AlertKind::HighRisk, "HIGH_RISK")]
    #[case(AlertKind::RiskIncrease, "RISK_INCREASE")]
    #[case(AlertKind::Summary, "SUMMARY")]
    fn test_kind_names(#[case] kind: AlertKind, #[case] name: &str) {
        assert_eq!(kind.as_str(), name);
        assert_eq!(AlertKind::parse(name), Some(kind));
        assert_eq!(serde_json::to_value(kind).unwrap(), serde_json::json!(name));
    }

    #[test]
    fn test_default_thresholds() {
        let config = AlertConfig::default();
        assert_eq!(config.high_risk_threshold, 0.7);
        assert_eq!(config.risk_increase_threshold, 20.0);
        assert!(!config.is_enabled);
    }

    #[rstest]
    #[case(Some("https://discord.com/api/webhooks/1/abc"), None, None, true)]
    #[case(Some(""), None, None, true)]
    #[case(Some("not a url"), None, None, false)]
    #[case(Some("ftp://example.com/hook"), None, None, false)]
    #[case(None, Some(0.8), Some(25.0), true)]
    #[case(None, Some(1.5), None, false)]
    #[case(None, Some(f64::NAN), None, false)]
    #[case(None, None, Some(-1.0), false)]
    fn test_input_validation(
        #[case] url: Option<&str>,
        #[case] high: Option<f64>,
        #[case] increase: Option<f64>,
        #[case] ok: bool,
    ) {
        let input = AlertConfigInput {
            webhook_url: url.map(String::from),
            is_enabled: None,
            high_risk_threshold: high,
            risk_increase_threshold: increase,
        };
        assert_eq!(input.validate().is_ok(), ok);
    }

    #[test]
    fn test_apply_merges_fields() {
        let mut config = AlertConfig::default();
        config.apply(&AlertConfigInput {
            webhook_url: Some(" https://discord.com/api/webhooks/new ".to_string()),
            is_enabled: Some(true),
            high_risk_threshold: Some(0.8),
            risk_increase_threshold: None,
        });

        assert_eq!(config.webhook_url, "https://discord.com/api/webhooks/new");
        assert!(config.is_enabled);
        assert_eq!(config.high_risk_threshold, 0.8);
        assert_eq!(config.risk_increase_threshold, 20.0);
    }
}
