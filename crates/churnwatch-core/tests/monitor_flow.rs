//! End-to-end monitoring runs over the in-memory store

mod common;

use std::time::Duration;

use churnwatch::db::{ConfigStore, SnapshotStore};
use churnwatch::models::{AlertConfigInput, AlertKind, Customer, CustomerInput};
use churnwatch::scoring::ModelHandle;
use pretty_assertions::assert_eq;
use wiremock::matchers::method;
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn webhook(post_status: u16) -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(405))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(post_status))
        .mount(&server)
        .await;
    server
}

fn close(a: f64, b: f64) -> bool {
    (a - b).abs() < 1e-9
}

#[tokio::test]
async fn test_first_high_risk_score_alerts() {
    let server = webhook(204).await;
    let store = common::store_with(&[common::customer(1)]).await;
    common::enable_alerts(&store, &format!("{}/hook", server.uri())).await;
    let monitor = common::monitor(store.clone(), ModelHandle::new(common::constant_bundle(0.85)));

    let summary = monitor.run().await.unwrap();

    assert_eq!(summary.total_checked, 1);
    assert_eq!(summary.high_risk_count, 1);
    assert_eq!(summary.alerts_sent, 1);
    assert!(summary.summary_delivered);

    let snapshots = store.snapshots_for(1);
    assert_eq!(snapshots.len(), 1);
    let snapshot = &snapshots[0];
    assert!(close(snapshot.probability, 0.85));
    assert_eq!(snapshot.previous_probability, None);
    assert_eq!(snapshot.risk_change, None);
    assert!(snapshot.is_high_risk);

    let records = store.alert_records();
    let kinds: Vec<AlertKind> = records.iter().map(|r| r.kind).collect();
    assert_eq!(kinds, vec![AlertKind::HighRisk, AlertKind::Summary]);
    assert_eq!(records[0].customer_id, Some(1));
    assert!(records.iter().all(|r| r.was_sent));
}

#[tokio::test]
async fn test_failed_delivery_is_recorded() {
    let server = webhook(500).await;
    let store = common::store_with(&[common::customer(1)]).await;
    common::enable_alerts(&store, &format!("{}/hook", server.uri())).await;
    let monitor = common::monitor(store.clone(), ModelHandle::new(common::constant_bundle(0.85)));

    let summary = monitor.run().await.unwrap();

    assert_eq!(summary.total_checked, 1);
    assert_eq!(summary.alerts_sent, 0);
    assert_eq!(summary.alerts_failed, 1);
    assert!(!summary.summary_delivered);

    let records = store.alert_records();
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].kind, AlertKind::HighRisk);
    assert!(!records[0].was_sent);
    assert!(records[0].error_message.is_some());
}

#[tokio::test]
async fn test_risk_increase_below_high_risk_alerts() {
    let server = webhook(204).await;
    let store = common::store_with(&[common::customer(7)]).await;
    common::enable_alerts(&store, &format!("{}/hook", server.uri())).await;
    let model = ModelHandle::new(common::constant_bundle(0.30));
    let monitor = common::monitor(store.clone(), model.clone());

    let first = monitor.run().await.unwrap();
    assert_eq!(first.alerts_sent, 0);
    assert_eq!(first.significant_increases, 0);

    model.replace(common::constant_bundle(0.50));
    let second = monitor.run().await.unwrap();

    assert_eq!(second.high_risk_count, 0);
    assert_eq!(second.significant_increases, 1);
    assert_eq!(second.alerts_sent, 1);

    let latest = store.latest(7).await.unwrap().unwrap();
    assert!(close(latest.probability, 0.50));
    assert!(latest.previous_probability.is_some_and(|p| close(p, 0.30)));
    assert!(latest.risk_change.is_some_and(|c| (c - 66.666_666).abs() < 1e-3));
    assert!(!latest.is_high_risk);

    let increases: Vec<_> = store
        .alert_records()
        .into_iter()
        .filter(|r| r.kind == AlertKind::RiskIncrease)
        .collect();
    assert_eq!(increases.len(), 1);
    assert_eq!(increases[0].customer_id, Some(7));
    assert!(increases[0].was_sent);
}

#[tokio::test]
async fn test_unseen_category_skips_only_that_customer() {
    let stranger = Customer::from(CustomerInput {
        customer_id: 2,
        geography: Some("Atlantis".to_string()),
        ..Default::default()
    });
    let store = common::store_with(&[common::customer(1), stranger]).await;
    let monitor = common::monitor(store.clone(), ModelHandle::new(common::constant_bundle(0.2)));

    let summary = monitor.run().await.unwrap();

    assert_eq!(summary.total_checked, 1);
    assert_eq!(summary.skipped, 1);
    assert_eq!(store.snapshots_for(1).len(), 1);
    assert!(store.snapshots_for(2).is_empty());
}

#[tokio::test]
async fn test_history_grows_one_snapshot_per_run() {
    let store = common::store_with(&[common::customer(3)]).await;
    let monitor = common::monitor(store.clone(), ModelHandle::new(common::constant_bundle(0.4)));

    for _ in 0..3 {
        monitor.run().await.unwrap();
    }

    let history = monitor.tracker().history(3, 10).await.unwrap();
    assert_eq!(history.len(), 3);
    // Newest first, each chained to the one before it
    assert!(history.windows(2).all(|w| w[0].recorded_at > w[1].recorded_at));
    assert!(history[0].previous_probability.is_some_and(|p| close(p, 0.4)));
    assert_eq!(history[2].previous_probability, None);
    assert!(store.alert_records().is_empty());
}

#[tokio::test]
async fn test_thresholds_are_fixed_for_the_whole_run() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(405))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(204).set_delay(Duration::from_millis(300)))
        .mount(&server)
        .await;

    let store =
        common::store_with(&[common::customer(1), common::customer(2), common::customer(3)]).await;
    common::enable_alerts(&store, &format!("{}/hook", server.uri())).await;
    let monitor = common::monitor(store.clone(), ModelHandle::new(common::constant_bundle(0.85)));

    // Raised while the first customer's alert is still being delivered
    let writer = {
        let store = store.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            store
                .update_config(&AlertConfigInput {
                    high_risk_threshold: Some(0.95),
                    ..Default::default()
                })
                .await
                .unwrap();
        })
    };

    let summary = monitor.run().await.unwrap();
    writer.await.unwrap();

    assert_eq!(summary.high_risk_count, 3);
    assert_eq!(summary.alerts_sent, 3);
    for customer_id in 1..=3 {
        let snapshots = store.snapshots_for(customer_id);
        assert_eq!(snapshots.len(), 1);
        assert!(snapshots[0].is_high_risk);
    }
    assert!(close(store.load_config().await.unwrap().high_risk_threshold, 0.95));
}
