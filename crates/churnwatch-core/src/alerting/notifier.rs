//! Webhook delivery with retries

use std::time::Duration;

use regex::Regex;
use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::{Client, StatusCode};
use tracing::{debug, info, warn};
use url::Url;

use crate::config::AlertingConfig;

const DISCORD_WEBHOOK_PATTERN: &str = r"^https://(?:discord|discordapp)\.com/api/webhooks/\S+$";

/// Notification errors
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum NotificationError {
    #[error("invalid webhook URL: {0}")]
    InvalidUrl(String),

    #[error("webhook unreachable: {0}")]
    Unreachable(String),

    #[error("webhook returned status {0}")]
    Status(u16),

    #[error("HTTP error: {0}")]
    Transport(String),

    #[error("webhook kept rate limiting after {0} retries")]
    RateLimited(u32),

    #[error("HTTP client error: {0}")]
    Client(String),
}

/// Posts JSON payloads to a webhook.
///
/// Only HTTP 204 counts as delivered. A 429 waits for the server's
/// `Retry-After` and does not use up an attempt; anything else waits
/// `retry_delay` and counts against `max_attempts`.
#[derive(Clone)]
pub struct WebhookNotifier {
    client: Client,
    config: AlertingConfig,
}

impl WebhookNotifier {
    /// Create a new notifier
    pub fn new(config: AlertingConfig) -> Result<Self, NotificationError> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| NotificationError::Client(e.to_string()))?;

        Ok(Self { client, config })
    }

    /// Check that a URL could be a webhook target
    pub fn validate_url(&self, raw: &str) -> Result<Url, NotificationError> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(NotificationError::InvalidUrl("no webhook URL configured".to_string()));
        }

        let url = Url::parse(raw).map_err(|e| NotificationError::InvalidUrl(e.to_string()))?;
        if !matches!(url.scheme(), "http" | "https") || url.host_str().is_none() {
            return Err(NotificationError::InvalidUrl(format!(
                "unsupported URL '{raw}'"
            )));
        }

        if self.config.require_discord_webhook {
            let pattern = Regex::new(DISCORD_WEBHOOK_PATTERN)
                .map_err(|e| NotificationError::InvalidUrl(e.to_string()))?;
            if !pattern.is_match(raw) {
                return Err(NotificationError::InvalidUrl(
                    "not a Discord webhook URL".to_string(),
                ));
            }
        }

        Ok(url)
    }

    /// Validate the URL and make a lightweight GET against it
    pub async fn probe(&self, raw: &str) -> Result<Url, NotificationError> {
        let url = self.validate_url(raw)?;

        let response = self
            .client
            .get(url.clone())
            .timeout(self.config.probe_timeout)
            .send()
            .await
            .map_err(|e| NotificationError::Unreachable(e.to_string()))?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(NotificationError::Unreachable(
                "webhook returned 404".to_string(),
            ));
        }

        debug!(status = %response.status(), "Webhook probe ok");
        Ok(url)
    }

    /// Deliver a payload
    pub async fn send(&self, url: &Url, payload: &serde_json::Value) -> Result<(), NotificationError> {
        let max_attempts = self.config.max_attempts.max(1);
        let mut attempts = 0;
        let mut rate_limited = 0;

        loop {
            let error = match self.client.post(url.clone()).json(payload).send().await {
                Ok(response) if response.status() == StatusCode::NO_CONTENT => {
                    info!(attempts = attempts + 1, "Webhook notification sent");
                    return Ok(());
                }
                Ok(response) if response.status() == StatusCode::TOO_MANY_REQUESTS => {
                    rate_limited += 1;
                    if rate_limited > self.config.max_rate_limited_retries {
                        return Err(NotificationError::RateLimited(rate_limited - 1));
                    }

                    let wait = retry_after(response.headers())
                        .unwrap_or(self.config.retry_delay)
                        .min(self.config.max_retry_after);
                    warn!(wait_ms = wait.as_millis() as u64, "Webhook rate limited, waiting");
                    tokio::time::sleep(wait).await;
                    continue;
                }
                Ok(response) => NotificationError::Status(response.status().as_u16()),
                Err(e) => NotificationError::Transport(e.to_string()),
            };

            attempts += 1;
            if attempts >= max_attempts {
                warn!(attempts, error = %error, "Webhook delivery failed");
                return Err(error);
            }

            debug!(attempt = attempts, error = %error, "Webhook attempt failed, retrying");
            tokio::time::sleep(self.config.retry_delay).await;
        }
    }
}

/// `Retry-After` in (possibly fractional) seconds
fn retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|secs| secs.is_finite() && *secs >= 0.0)
        .map(Duration::from_secs_f64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;
    use rstest::rstest;

    fn notifier(require_discord: bool) -> WebhookNotifier {
        WebhookNotifier::new(AlertingConfig {
            require_discord_webhook: require_discord,
            ..Default::default()
        })
        .unwrap()
    }

    #[rstest]
    #[case("https://discord.com/api/webhooks/123/abc-DEF", true, true)]
    #[case("https://discordapp.com/api/webhooks/123/abc", true, true)]
    #[case("https://example.com/api/webhooks/123/abc", true, false)]
    #[case("http://discord.com/api/webhooks/123/abc", true, false)]
    #[case("https://example.com/hook", false, true)]
    #[case("ftp://example.com/hook", false, false)]
    #[case("", false, false)]
    #[case("not a url", false, false)]
    fn test_validate_url(#[case] url: &str, #[case] require_discord: bool, #[case] ok: bool) {
        assert_eq!(notifier(require_discord).validate_url(url).is_ok(), ok);
    }

    #[rstest]
    #[case("2", Some(Duration::from_secs(2)))]
    #[case("0.5", Some(Duration::from_millis(500)))]
    #[case("soon", None)]
    #[case("-1", None)]
    fn test_retry_after(#[case] header: &str, #[case] expected: Option<Duration>) {
        let mut headers = HeaderMap::new();
        headers.insert(RETRY_AFTER, HeaderValue::from_str(header).unwrap());
        assert_eq!(retry_after(&headers), expected);
    }

    #[test]
    fn test_missing_retry_after() {
        assert_eq!(retry_after(&HeaderMap::new()), None);
    }
}
