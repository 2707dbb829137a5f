//! Risk snapshot model

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One scored probability for one customer in one monitoring run.
///
/// Snapshots are append-only; the newest one (by `recorded_at`) is the
/// customer's current risk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct RiskSnapshot {
    /// Unique identifier
    pub id: Uuid,

    /// Customer this snapshot belongs to
    pub customer_id: i64,

    /// When the probability was recorded
    pub recorded_at: DateTime<Utc>,

    /// Churn probability in [0, 1]
    pub probability: f64,

    /// Probability from the previous snapshot, if any
    pub previous_probability: Option<f64>,

    /// Percentage change against the previous snapshot
    pub risk_change: Option<f64>,

    /// Whether the probability exceeded the high-risk threshold
    pub is_high_risk: bool,
}

impl RiskSnapshot {
    /// Build the snapshot that follows `previous`.
    ///
    /// `recorded_at` is forced strictly past the previous snapshot so the
    /// per-customer ordering survives clock skew between writers.
    pub fn next(
        customer_id: i64,
        previous: Option<&RiskSnapshot>,
        probability: f64,
        high_risk_threshold: f64,
        now: DateTime<Utc>,
    ) -> Self {
        let previous_probability = previous.map(|p| p.probability);
        let recorded_at = match previous {
            Some(p) if p.recorded_at >= now => p.recorded_at + Duration::microseconds(1),
            _ => now,
        };

        Self {
            id: Uuid::new_v4(),
            customer_id,
            recorded_at,
            probability,
            previous_probability,
            risk_change: risk_change(previous_probability, probability),
            is_high_risk: probability > high_risk_threshold,
        }
    }

    /// Whether the change exceeds a percentage threshold
    pub fn is_significant_increase(&self, risk_increase_threshold: f64) -> bool {
        self.risk_change
            .is_some_and(|change| change > risk_increase_threshold)
    }
}

/// Percentage change from `previous` to `current`; None without a usable baseline
pub fn risk_change(previous: Option<f64>, current: f64) -> Option<f64> {
    match previous {
        Some(p) if p != 0.0 => Some((current - p) / p * 100.0),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_first_snapshot_has_no_baseline() {
        let snap = RiskSnapshot::next(1, None, 0.85, 0.7, Utc::now());

        assert_eq!(snap.previous_probability, None);
        assert_eq!(snap.risk_change, None);
        assert!(snap.is_high_risk);
    }

    #[test]
    fn test_change_against_previous() {
        let first = RiskSnapshot::next(1, None, 0.30, 0.7, Utc::now());
        let second = RiskSnapshot::next(1, Some(&first), 0.50, 0.7, Utc::now());

        assert_eq!(second.previous_probability, Some(0.30));
        let change = second.risk_change.unwrap();
        assert!((change - 66.666_666).abs() < 1e-3);
        assert!(!second.is_high_risk);
        assert!(second.is_significant_increase(20.0));
        assert!(!second.is_significant_increase(70.0));
    }

    #[test]
    fn test_zero_baseline_has_no_change() {
        assert_eq!(risk_change(Some(0.0), 0.4), None);
        assert_eq!(risk_change(None, 0.4), None);
    }

    #[test]
    fn test_threshold_is_strict() {
        let snap = RiskSnapshot::next(1, None, 0.7, 0.7, Utc::now());
        assert!(!snap.is_high_risk);
    }

    #[test]
    fn test_timestamps_strictly_increase() {
        let now = Utc::now();
        let first = RiskSnapshot::next(1, None, 0.2, 0.7, now);
        // Same instant, and a clock that went backwards
        let second = RiskSnapshot::next(1, Some(&first), 0.3, 0.7, now);
        let third = RiskSnapshot::next(1, Some(&second), 0.4, 0.7, now - Duration::seconds(5));

        assert!(second.recorded_at > first.recorded_at);
        assert!(third.recorded_at > second.recorded_at);
    }

    proptest! {
        #[test]
        fn prop_risk_change_formula(prev in 0.0f64..=1.0, curr in 0.0f64..=1.0) {
            let change = risk_change(Some(prev), curr);
            if prev == 0.0 {
                prop_assert!(change.is_none());
            } else {
                let expected = (curr - prev) / prev * 100.0;
                prop_assert!((change.unwrap() - expected).abs() <= 1e-9 * expected.abs().max(1.0));
            }
        }

        #[test]
        fn prop_high_risk_iff_above_threshold(p in 0.0f64..=1.0, threshold in 0.0f64..=1.0) {
            let snap = RiskSnapshot::next(7, None, p, threshold, Utc::now());
            prop_assert_eq!(snap.is_high_risk, p > threshold);
        }
    }
}
