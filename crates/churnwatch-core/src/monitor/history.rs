//! Risk history tracking

use std::sync::Arc;

use tracing::debug;

use crate::db::SnapshotStore;
use crate::error::{Error, Result};
use crate::models::RiskSnapshot;

/// Appends scored probabilities to each customer's risk history
#[derive(Clone)]
pub struct RiskTracker {
    snapshots: Arc<dyn SnapshotStore>,
}

impl RiskTracker {
    pub fn new(snapshots: Arc<dyn SnapshotStore>) -> Self {
        Self { snapshots }
    }

    /// Record a new probability and return the stored snapshot
    pub async fn record(
        &self,
        customer_id: i64,
        probability: f64,
        high_risk_threshold: f64,
    ) -> Result<RiskSnapshot> {
        if !(0.0..=1.0).contains(&probability) {
            return Err(Error::validation(format!(
                "probability {probability} is outside [0, 1]"
            )));
        }

        let snapshot = self
            .snapshots
            .record_probability(customer_id, probability, high_risk_threshold)
            .await?;

        debug!(
            customer_id,
            probability,
            risk_change = ?snapshot.risk_change,
            high_risk = snapshot.is_high_risk,
            "Risk snapshot recorded"
        );

        Ok(snapshot)
    }

    pub async fn latest(&self, customer_id: i64) -> Result<Option<RiskSnapshot>> {
        self.snapshots.latest(customer_id).await
    }

    /// Newest first
    pub async fn history(&self, customer_id: i64, limit: i64) -> Result<Vec<RiskSnapshot>> {
        self.snapshots.history(customer_id, limit).await
    }
}
