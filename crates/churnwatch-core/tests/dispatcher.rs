//! Dispatcher gates against a mock webhook

mod common;

use std::sync::Arc;

use churnwatch::alerting::DispatchOutcome;
use churnwatch::config::AlertingConfig;
use churnwatch::db::{ConfigStore, MemoryStore};
use churnwatch::models::AlertKind;
use pretty_assertions::assert_eq;
use wiremock::matchers::method;
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn webhook(posts: u64) -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(405))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(204))
        .expect(posts)
        .mount(&server)
        .await;
    server
}

#[tokio::test]
async fn test_31st_message_in_window_is_rate_limited() {
    let server = webhook(30).await;
    let store = Arc::new(MemoryStore::new());
    common::enable_alerts(&store, &format!("{}/hook", server.uri())).await;
    let settings = store.load_config().await.unwrap();
    let dispatcher = common::dispatcher(store.clone(), common::alerting_config());

    for _ in 0..30 {
        let outcome = dispatcher.notify_summary(&settings, 5, 1, 0).await.unwrap();
        assert_eq!(outcome, DispatchOutcome::Sent);
    }

    let outcome = dispatcher.notify_summary(&settings, 5, 1, 0).await.unwrap();
    match outcome {
        DispatchOutcome::Failed(reason) => assert!(reason.contains("rate limit exceeded")),
        other => panic!("expected rate limit failure, got {other:?}"),
    }

    let records = store.alert_records();
    assert_eq!(records.len(), 31);
    assert_eq!(records.iter().filter(|r| r.was_sent).count(), 30);

    let last = records.last().unwrap();
    assert!(!last.was_sent);
    assert!(last
        .error_message
        .as_deref()
        .is_some_and(|e| e.contains("rate limit exceeded")));
}

#[tokio::test]
async fn test_oversize_message_is_recorded_not_sent() {
    let server = webhook(0).await;
    let store = Arc::new(MemoryStore::new());
    common::enable_alerts(&store, &format!("{}/hook", server.uri())).await;
    let settings = store.load_config().await.unwrap();
    let config = AlertingConfig {
        max_message_chars: 50,
        ..common::alerting_config()
    };

    let outcome = common::dispatcher(store.clone(), config)
        .notify_summary(&settings, 5, 1, 0)
        .await
        .unwrap();

    assert!(matches!(outcome, DispatchOutcome::Failed(_)));
    let records = store.alert_records();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].kind, AlertKind::Summary);
    assert!(!records[0].was_sent);
    assert!(records[0].message.get("embeds").is_some());
    assert!(records[0]
        .error_message
        .as_deref()
        .is_some_and(|e| e.contains("too long")));
}

#[tokio::test]
async fn test_customer_alert_is_delivered_and_recorded() {
    let server = webhook(1).await;
    let customer = common::customer(15634602);
    let store = common::store_with(&[customer.clone()]).await;
    common::enable_alerts(&store, &format!("{}/hook", server.uri())).await;
    let settings = store.load_config().await.unwrap();

    let snapshot = churnwatch::models::RiskSnapshot::next(
        customer.customer_id,
        None,
        0.85,
        settings.high_risk_threshold,
        chrono::Utc::now(),
    );
    let outcome = common::dispatcher(store.clone(), common::alerting_config())
        .notify_customer(&settings, AlertKind::HighRisk, &customer, &snapshot)
        .await
        .unwrap();

    assert_eq!(outcome, DispatchOutcome::Sent);
    let records = store.alert_records();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].customer_id, Some(15634602));
    assert_eq!(records[0].kind, AlertKind::HighRisk);
    assert!(records[0].was_sent);
    assert_eq!(records[0].error_message, None);
}
