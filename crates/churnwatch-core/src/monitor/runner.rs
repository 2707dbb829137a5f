//! One monitoring run: score, record, alert, summarize

use std::time::Instant;

use chrono::{DateTime, Utc};
use metrics::{counter, histogram};
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::alerting::{classify, AlertDispatcher, DispatchOutcome};
use crate::config::MonitorConfig;
use crate::db::{ConfigStore, CustomerStore, Stores};
use crate::error::{Error, Result};
use crate::models::{AlertConfig, Customer};
use crate::scoring::{ModelHandle, Scorer};

use super::history::RiskTracker;

/// Result of a monitoring run
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// Customers scored and recorded
    pub total_checked: usize,
    pub high_risk_count: usize,
    pub significant_increases: usize,
    /// Customers that failed to score or record
    pub skipped: usize,
    /// Customer alerts delivered
    pub alerts_sent: usize,
    /// Customer alerts attempted but not delivered
    pub alerts_failed: usize,
    /// The run hit its deadline before checking every customer
    pub timed_out: bool,
    pub summary_delivered: bool,
}

/// Outcome for one customer that was scored
struct CustomerCheck {
    high_risk: bool,
    significant_increase: bool,
    alert: Option<DispatchOutcome>,
}

/// Runs the scoring loop over every customer.
///
/// Runs never overlap; a trigger while one is in flight fails with
/// [`Error::RunInProgress`].
pub struct Monitor {
    stores: Stores,
    model: ModelHandle,
    tracker: RiskTracker,
    dispatcher: AlertDispatcher,
    config: MonitorConfig,
    run_lock: Mutex<()>,
}

impl Monitor {
    pub fn new(
        stores: Stores,
        model: ModelHandle,
        dispatcher: AlertDispatcher,
        config: MonitorConfig,
    ) -> Self {
        Self {
            tracker: RiskTracker::new(stores.snapshots.clone()),
            stores,
            model,
            dispatcher,
            config,
            run_lock: Mutex::new(()),
        }
    }

    pub fn tracker(&self) -> &RiskTracker {
        &self.tracker
    }

    /// Whether a run currently holds the lock
    pub fn is_running(&self) -> bool {
        self.run_lock.try_lock().is_err()
    }

    /// Reject webhook URLs the dispatcher would refuse to deliver to
    pub fn validate_webhook_url(&self, raw: &str) -> Result<()> {
        self.dispatcher
            .validate_webhook_url(raw)
            .map(|_| ())
            .map_err(|e| Error::validation(format!("webhook_url: {e}")))
    }

    /// Execute one run
    pub async fn run(&self) -> Result<RunSummary> {
        let _guard = self.run_lock.try_lock().map_err(|_| Error::RunInProgress)?;

        let result = self.run_locked().await;
        let outcome = if result.is_ok() { "completed" } else { "failed" };
        counter!("churnwatch_runs_total", "outcome" => outcome).increment(1);

        result
    }

    async fn run_locked(&self) -> Result<RunSummary> {
        let bundle = self
            .model
            .current()
            .ok_or_else(|| Error::model_unavailable("no churn model is loaded"))?;
        let scorer = Scorer::new(bundle);

        // One config snapshot for the whole run
        let settings = self.stores.config.load_config().await?;
        let customers = self.stores.customers.all().await?;

        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        let clock = Instant::now();
        info!(%run_id, customers = customers.len(), "Monitoring run started");

        let mut summary = RunSummary {
            run_id,
            started_at,
            finished_at: started_at,
            total_checked: 0,
            high_risk_count: 0,
            significant_increases: 0,
            skipped: 0,
            alerts_sent: 0,
            alerts_failed: 0,
            timed_out: false,
            summary_delivered: false,
        };

        for customer in &customers {
            if clock.elapsed() >= self.config.run_timeout {
                summary.timed_out = true;
                warn!(
                    %run_id,
                    remaining = customers.len() - summary.total_checked - summary.skipped,
                    "Monitoring run deadline reached, stopping early"
                );
                break;
            }

            match self.check_customer(&scorer, &settings, customer).await {
                Ok(check) => {
                    summary.total_checked += 1;
                    summary.high_risk_count += usize::from(check.high_risk);
                    summary.significant_increases += usize::from(check.significant_increase);
                    match check.alert {
                        Some(DispatchOutcome::Sent) => summary.alerts_sent += 1,
                        Some(DispatchOutcome::Failed(_)) => summary.alerts_failed += 1,
                        Some(DispatchOutcome::Skipped) | None => {}
                    }
                    counter!("churnwatch_customers_scored_total").increment(1);
                }
                Err(e) => {
                    summary.skipped += 1;
                    counter!("churnwatch_customers_skipped_total").increment(1);
                    warn!(%run_id, customer_id = customer.customer_id, error = %e, "Skipping customer");
                }
            }
        }

        summary.summary_delivered = match self
            .dispatcher
            .notify_summary(
                &settings,
                summary.total_checked,
                summary.high_risk_count,
                summary.significant_increases,
            )
            .await
        {
            Ok(outcome) => outcome.is_sent(),
            Err(e) => {
                error!(%run_id, error = %e, "Failed to record run summary alert");
                false
            }
        };

        summary.finished_at = Utc::now();
        histogram!("churnwatch_run_duration_seconds").record(clock.elapsed().as_secs_f64());
        info!(
            %run_id,
            checked = summary.total_checked,
            high_risk = summary.high_risk_count,
            increases = summary.significant_increases,
            skipped = summary.skipped,
            alerts_sent = summary.alerts_sent,
            alerts_failed = summary.alerts_failed,
            timed_out = summary.timed_out,
            "Monitoring run finished"
        );

        Ok(summary)
    }

    /// Score, record and possibly alert for one customer
    async fn check_customer(
        &self,
        scorer: &Scorer,
        settings: &AlertConfig,
        customer: &Customer,
    ) -> Result<CustomerCheck> {
        let probability = scorer.score_customer(customer)?;
        let snapshot = self
            .tracker
            .record(customer.customer_id, probability, settings.high_risk_threshold)
            .await?;

        let alert = match classify(&snapshot, settings, self.config.trigger_rule) {
            Some(kind) => Some(
                match self
                    .dispatcher
                    .notify_customer(settings, kind, customer, &snapshot)
                    .await
                {
                    Ok(outcome) => outcome,
                    // The snapshot is already stored, so the customer still counts as checked
                    Err(e) => {
                        error!(customer_id = customer.customer_id, error = %e, "Alert dispatch failed");
                        DispatchOutcome::Failed(e.to_string())
                    }
                },
            ),
            None => None,
        };

        Ok(CustomerCheck {
            high_risk: snapshot.is_high_risk,
            significant_increase: snapshot.is_significant_increase(settings.risk_increase_threshold),
            alert,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alerting::WebhookNotifier;
    use crate::config::AlertingConfig;
    use crate::db::{CustomerStore, MemoryStore};
    use crate::models::CustomerInput;
    use crate::scoring::constant_bundle;
    use std::sync::Arc;
    use std::time::Duration;

    async fn monitor(model: ModelHandle, config: MonitorConfig) -> (Monitor, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        for id in [1, 2] {
            store
                .insert(&Customer::from(CustomerInput {
                    customer_id: id,
                    geography: Some("Spain".to_string()),
                    ..Default::default()
                }))
                .await
                .unwrap();
        }

        let alerting = AlertingConfig::default();
        let dispatcher = AlertDispatcher::new(
            WebhookNotifier::new(alerting.clone()).unwrap(),
            store.clone(),
            alerting,
        );
        (
            Monitor::new(Stores::memory(store.clone()), model, dispatcher, config),
            store,
        )
    }

    #[tokio::test]
    async fn test_model_unavailable_fails_before_scoring() {
        let (monitor, store) = monitor(ModelHandle::empty(), MonitorConfig::default()).await;

        assert!(matches!(monitor.run().await, Err(Error::ModelUnavailable(_))));
        assert!(store.snapshots_for(1).is_empty());
    }

    #[tokio::test]
    async fn test_run_counts_high_risk_with_alerts_disabled() {
        let model = ModelHandle::new(constant_bundle(0.85));
        let (monitor, store) = monitor(model, MonitorConfig::default()).await;

        let summary = monitor.run().await.unwrap();

        assert_eq!(summary.total_checked, 2);
        assert_eq!(summary.high_risk_count, 2);
        assert_eq!(summary.alerts_sent + summary.alerts_failed, 0);
        assert!(!summary.summary_delivered);
        assert!(!summary.timed_out);
        assert_eq!(store.snapshots_for(2).len(), 1);
        assert!(store.alert_records().is_empty());
    }

    #[tokio::test]
    async fn test_zero_timeout_still_finishes_run() {
        let model = ModelHandle::new(constant_bundle(0.2));
        let config = MonitorConfig {
            run_timeout: Duration::ZERO,
            ..Default::default()
        };
        let (monitor, store) = monitor(model, config).await;

        let summary = monitor.run().await.unwrap();

        assert!(summary.timed_out);
        assert_eq!(summary.total_checked, 0);
        assert!(store.snapshots_for(1).is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_trigger_is_rejected() {
        let model = ModelHandle::new(constant_bundle(0.2));
        let (monitor, _store) = monitor(model, MonitorConfig::default()).await;

        let _held = monitor.run_lock.try_lock().unwrap();
        assert!(monitor.is_running());
        assert!(matches!(monitor.run().await, Err(Error::RunInProgress)));
    }
}
