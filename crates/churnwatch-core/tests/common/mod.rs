//! Fixtures shared by the integration tests

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use churnwatch::alerting::{AlertDispatcher, WebhookNotifier};
use churnwatch::config::{AlertingConfig, MonitorConfig};
use churnwatch::db::{ConfigStore, CustomerStore, MemoryStore, Stores};
use churnwatch::models::{AlertConfigInput, Customer, CustomerInput};
use churnwatch::monitor::Monitor;
use churnwatch::scoring::{
    LabelEncoder, LogisticRegression, ModelBundle, ModelHandle, StandardScaler,
    CATEGORICAL_FEATURES, NUMERICAL_FEATURES,
};

/// A bundle that scores every known customer at `probability`
pub fn constant_bundle(probability: f64) -> ModelBundle {
    ModelBundle {
        version: Some(format!("constant-{probability}")),
        numerical_features: NUMERICAL_FEATURES.iter().map(|s| s.to_string()).collect(),
        categorical_features: CATEGORICAL_FEATURES.iter().map(|s| s.to_string()).collect(),
        scaler: StandardScaler {
            mean: vec![0.0; NUMERICAL_FEATURES.len()],
            scale: vec![1.0; NUMERICAL_FEATURES.len()],
        },
        encoders: BTreeMap::from([
            (
                "geography".to_string(),
                LabelEncoder {
                    classes: vec!["France".into(), "Germany".into(), "Spain".into(), "Unknown".into()],
                },
            ),
            (
                "gender".to_string(),
                LabelEncoder {
                    classes: vec!["Female".into(), "Male".into(), "Unknown".into()],
                },
            ),
        ]),
        classifier: LogisticRegression {
            coefficients: vec![0.0; NUMERICAL_FEATURES.len() + CATEGORICAL_FEATURES.len()],
            intercept: (probability / (1.0 - probability)).ln(),
        },
        feature_importance: vec![],
    }
}

/// Delivery settings that accept local mock servers and retry quickly
pub fn alerting_config() -> AlertingConfig {
    AlertingConfig {
        require_discord_webhook: false,
        retry_delay: Duration::from_millis(10),
        request_timeout: Duration::from_secs(5),
        probe_timeout: Duration::from_secs(2),
        ..Default::default()
    }
}

pub fn customer(customer_id: i64) -> Customer {
    Customer::from(CustomerInput {
        customer_id,
        surname: Some(format!("Customer{customer_id}")),
        credit_score: Some(619),
        geography: Some("France".to_string()),
        gender: Some("Female".to_string()),
        age: Some(42),
        tenure: Some(2),
        balance: Some(0.0),
        num_of_products: Some(1),
        has_cr_card: true,
        is_active_member: true,
        estimated_salary: Some(101_348.88),
        ..Default::default()
    })
}

/// Turn alerting on against `webhook_url`
pub async fn enable_alerts(store: &MemoryStore, webhook_url: &str) {
    store
        .update_config(&AlertConfigInput {
            webhook_url: Some(webhook_url.to_string()),
            is_enabled: Some(true),
            ..Default::default()
        })
        .await
        .unwrap();
}

/// Store seeded with `customers`
pub async fn store_with(customers: &[Customer]) -> Arc<MemoryStore> {
    let store = Arc::new(MemoryStore::new());
    store.insert_many(customers).await.unwrap();
    store
}

pub fn dispatcher(store: Arc<MemoryStore>, config: AlertingConfig) -> AlertDispatcher {
    let notifier = WebhookNotifier::new(config.clone()).unwrap();
    AlertDispatcher::new(notifier, store, config)
}

pub fn monitor(store: Arc<MemoryStore>, model: ModelHandle) -> Monitor {
    let alerting = alerting_config();
    Monitor::new(
        Stores::memory(store.clone()),
        model,
        dispatcher(store, alerting),
        MonitorConfig::default(),
    )
}
