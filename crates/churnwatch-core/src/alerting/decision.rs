//! Which snapshots produce a customer alert

use crate::config::TriggerRule;
use crate::models::{AlertConfig, AlertKind, RiskSnapshot};

/// Alert kind for a snapshot, or None when it should not alert.
///
/// High risk always wins over a risk increase.
pub fn classify(snapshot: &RiskSnapshot, config: &AlertConfig, rule: TriggerRule) -> Option<AlertKind> {
    if snapshot.is_high_risk {
        return Some(AlertKind::HighRisk);
    }

    match rule {
        TriggerRule::Either if snapshot.is_significant_increase(config.risk_increase_threshold) => {
            Some(AlertKind::RiskIncrease)
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rstest::rstest;

    fn snapshot(previous: Option<f64>, current: f64) -> RiskSnapshot {
        let now = Utc::now();
        let prev = previous.map(|p| RiskSnapshot::next(1, None, p, 0.7, now));
        RiskSnapshot::next(1, prev.as_ref(), current, 0.7, now)
    }

    #[rstest]
    #[case(None, 0.85, TriggerRule::Either, Some(AlertKind::HighRisk))]
    #[case(Some(0.30), 0.50, TriggerRule::Either, Some(AlertKind::RiskIncrease))]
    #[case(Some(0.30), 0.50, TriggerRule::HighRiskOnly, None)]
    #[case(Some(0.60), 0.90, TriggerRule::Either, Some(AlertKind::HighRisk))]
    #[case(Some(0.50), 0.55, TriggerRule::Either, None)]
    #[case(None, 0.40, TriggerRule::Either, None)]
    #[case(Some(0.0), 0.40, TriggerRule::Either, None)]
    fn test_classify(
        #[case] previous: Option<f64>,
        #[case] current: f64,
        #[case] rule: TriggerRule,
        #[case] expected: Option<AlertKind>,
    ) {
        let config = AlertConfig::default();
        assert_eq!(classify(&snapshot(previous, current), &config, rule), expected);
    }
}
