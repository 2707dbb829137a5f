//! Storage traits shared by the Postgres and in-memory backends

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::models::{
    AlertConfig, AlertConfigInput, AlertHistoryFilter, AlertRecord, AlertStats, Customer,
    CustomerFilter, Page, PageRequest, RiskSnapshot,
};

use super::memory::MemoryStore;

/// Customer records
#[async_trait]
pub trait CustomerStore: Send + Sync {
    /// Filtered, ordered page of customers
    async fn list(&self, filter: &CustomerFilter, page: PageRequest) -> Result<Page<Customer>>;

    /// Every customer, ordered by id
    async fn all(&self) -> Result<Vec<Customer>>;

    async fn get(&self, customer_id: i64) -> Result<Option<Customer>>;

    /// Insert a new customer; `Error::Conflict` if the id is taken
    async fn insert(&self, customer: &Customer) -> Result<()>;

    /// Insert all customers or none of them
    async fn insert_many(&self, customers: &[Customer]) -> Result<()>;

    /// Overwrite an existing customer; false if it does not exist
    async fn replace(&self, customer: &Customer) -> Result<bool>;

    /// Overwrite several customers in one transaction; fails on the first missing id
    async fn replace_many(&self, customers: &[Customer]) -> Result<()>;

    /// Delete a customer and its history; false if it does not exist
    async fn delete(&self, customer_id: i64) -> Result<bool>;

    /// Delete several customers, returning how many existed
    async fn delete_many(&self, customer_ids: &[i64]) -> Result<u64>;
}

/// Append-only risk history
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// Read the latest snapshot, compute the next one and append it.
    ///
    /// The read and the append happen atomically per customer, so two
    /// concurrent writers never compute their change against the same baseline.
    async fn record_probability(
        &self,
        customer_id: i64,
        probability: f64,
        high_risk_threshold: f64,
    ) -> Result<RiskSnapshot>;

    async fn latest(&self, customer_id: i64) -> Result<Option<RiskSnapshot>>;

    /// Newest first
    async fn history(&self, customer_id: i64, limit: i64) -> Result<Vec<RiskSnapshot>>;
}

/// Audit log of notification attempts
#[async_trait]
pub trait AlertLog: Send + Sync {
    async fn append_alert(&self, record: &AlertRecord) -> Result<()>;

    /// Delivered records with `sent_at >= since`
    async fn count_sent_since(&self, since: DateTime<Utc>) -> Result<i64>;

    /// Newest first
    async fn list_alerts(
        &self,
        filter: &AlertHistoryFilter,
        page: PageRequest,
    ) -> Result<Page<AlertRecord>>;

    async fn alert_stats(&self) -> Result<AlertStats>;
}

/// The single alert configuration row
#[async_trait]
pub trait ConfigStore: Send + Sync {
    /// Current config, created with defaults if absent
    async fn load_config(&self) -> Result<AlertConfig>;

    /// Validate and apply a partial update
    async fn update_config(&self, input: &AlertConfigInput) -> Result<AlertConfig>;
}

/// All stores behind trait objects
#[derive(Clone)]
pub struct Stores {
    pub customers: Arc<dyn CustomerStore>,
    pub snapshots: Arc<dyn SnapshotStore>,
    pub alerts: Arc<dyn AlertLog>,
    pub config: Arc<dyn ConfigStore>,
}

impl Stores {
    /// Every store backed by the same in-memory instance
    pub fn memory(store: Arc<MemoryStore>) -> Self {
        Self {
            customers: store.clone(),
            snapshots: store.clone(),
            alerts: store.clone(),
            config: store,
        }
    }
}
