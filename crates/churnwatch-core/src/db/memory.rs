//! In-memory storage backend
//!
//! Every operation holds its locks for its whole duration, which gives the
//! same per-customer atomicity as the row locks in Postgres. Locks are always
//! taken in field order.

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use crate::error::{Error, Result};
use crate::models::{
    AlertConfig, AlertConfigInput, AlertHistoryFilter, AlertRecord, AlertStats, Customer,
    CustomerFilter, CustomerOrdering, CustomerSortField, Page, PageRequest, RiskSnapshot,
};

use super::store::{AlertLog, ConfigStore, CustomerStore, SnapshotStore};

#[derive(Default)]
pub struct MemoryStore {
    customers: Mutex<BTreeMap<i64, Customer>>,
    snapshots: Mutex<HashMap<i64, Vec<RiskSnapshot>>>,
    alerts: Mutex<Vec<AlertRecord>>,
    config: Mutex<Option<AlertConfig>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every alert record, oldest first
    pub fn alert_records(&self) -> Vec<AlertRecord> {
        self.alerts.lock().clone()
    }

    /// Every snapshot of one customer, oldest first
    pub fn snapshots_for(&self, customer_id: i64) -> Vec<RiskSnapshot> {
        self.snapshots
            .lock()
            .get(&customer_id)
            .cloned()
            .unwrap_or_default()
    }
}

fn compare(a: &Customer, b: &Customer, ordering: CustomerOrdering) -> Ordering {
    fn opt_f64(a: Option<f64>, b: Option<f64>) -> Ordering {
        match (a, b) {
            (Some(a), Some(b)) => a.partial_cmp(&b).unwrap_or(Ordering::Equal),
            (a, b) => a.is_some().cmp(&b.is_some()),
        }
    }

    let primary = match ordering.field {
        CustomerSortField::CustomerId => Ordering::Equal,
        CustomerSortField::Age => a.age.cmp(&b.age),
        CustomerSortField::CreditScore => a.credit_score.cmp(&b.credit_score),
        CustomerSortField::Balance => opt_f64(a.balance, b.balance),
        CustomerSortField::EstimatedSalary => opt_f64(a.estimated_salary, b.estimated_salary),
    }
    .then(a.customer_id.cmp(&b.customer_id));

    if ordering.descending {
        primary.reverse()
    } else {
        primary
    }
}

fn paginate<T: Clone>(items: &[T], page: PageRequest) -> Page<T> {
    let results = items
        .iter()
        .skip(page.offset() as usize)
        .take(page.limit() as usize)
        .cloned()
        .collect();

    Page {
        count: items.len() as i64,
        page: page.page,
        page_size: page.page_size,
        results,
    }
}

#[async_trait]
impl CustomerStore for MemoryStore {
    async fn list(&self, filter: &CustomerFilter, page: PageRequest) -> Result<Page<Customer>> {
        let mut matching: Vec<Customer> = self
            .customers
            .lock()
            .values()
            .filter(|c| filter.matches(c))
            .cloned()
            .collect();
        matching.sort_by(|a, b| compare(a, b, filter.ordering));

        Ok(paginate(&matching, page))
    }

    async fn all(&self) -> Result<Vec<Customer>> {
        Ok(self.customers.lock().values().cloned().collect())
    }

    async fn get(&self, customer_id: i64) -> Result<Option<Customer>> {
        Ok(self.customers.lock().get(&customer_id).cloned())
    }

    async fn insert(&self, customer: &Customer) -> Result<()> {
        self.insert_many(std::slice::from_ref(customer)).await
    }

    async fn insert_many(&self, customers: &[Customer]) -> Result<()> {
        let mut table = self.customers.lock();

        let mut seen = std::collections::HashSet::new();
        for customer in customers {
            if table.contains_key(&customer.customer_id) || !seen.insert(customer.customer_id) {
                return Err(Error::Conflict(format!(
                    "customer {} already exists",
                    customer.customer_id
                )));
            }
        }
        for customer in customers {
            table.insert(customer.customer_id, customer.clone());
        }
        Ok(())
    }

    async fn replace(&self, customer: &Customer) -> Result<bool> {
        let mut table = self.customers.lock();
        match table.get_mut(&customer.customer_id) {
            Some(existing) => {
                *existing = customer.clone();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn replace_many(&self, customers: &[Customer]) -> Result<()> {
        let mut table = self.customers.lock();
        if let Some(missing) = customers.iter().find(|c| !table.contains_key(&c.customer_id)) {
            return Err(Error::not_found("Customer", missing.customer_id));
        }
        for customer in customers {
            table.insert(customer.customer_id, customer.clone());
        }
        Ok(())
    }

    async fn delete(&self, customer_id: i64) -> Result<bool> {
        Ok(self.delete_many(&[customer_id]).await? == 1)
    }

    async fn delete_many(&self, customer_ids: &[i64]) -> Result<u64> {
        let mut table = self.customers.lock();
        let mut snapshots = self.snapshots.lock();

        let mut deleted = 0;
        for id in customer_ids {
            if table.remove(id).is_some() {
                snapshots.remove(id);
                deleted += 1;
            }
        }
        Ok(deleted)
    }
}

#[async_trait]
impl SnapshotStore for MemoryStore {
    async fn record_probability(
        &self,
        customer_id: i64,
        probability: f64,
        high_risk_threshold: f64,
    ) -> Result<RiskSnapshot> {
        let customers = self.customers.lock();
        if !customers.contains_key(&customer_id) {
            return Err(Error::not_found("Customer", customer_id));
        }

        let mut snapshots = self.snapshots.lock();
        let history = snapshots.entry(customer_id).or_default();
        let snapshot = RiskSnapshot::next(
            customer_id,
            history.last(),
            probability,
            high_risk_threshold,
            Utc::now(),
        );
        history.push(snapshot.clone());

        Ok(snapshot)
    }

    async fn latest(&self, customer_id: i64) -> Result<Option<RiskSnapshot>> {
        Ok(self
            .snapshots
            .lock()
            .get(&customer_id)
            .and_then(|h| h.last().cloned()))
    }

    async fn history(&self, customer_id: i64, limit: i64) -> Result<Vec<RiskSnapshot>> {
        Ok(self
            .snapshots
            .lock()
            .get(&customer_id)
            .map(|h| {
                h.iter()
                    .rev()
                    .take(limit.max(0) as usize)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }
}

#[async_trait]
impl AlertLog for MemoryStore {
    async fn append_alert(&self, record: &AlertRecord) -> Result<()> {
        self.alerts.lock().push(record.clone());
        Ok(())
    }

    async fn count_sent_since(&self, since: DateTime<Utc>) -> Result<i64> {
        Ok(self
            .alerts
            .lock()
            .iter()
            .filter(|r| r.was_sent && r.sent_at >= since)
            .count() as i64)
    }

    async fn list_alerts(
        &self,
        filter: &AlertHistoryFilter,
        page: PageRequest,
    ) -> Result<Page<AlertRecord>> {
        let matching: Vec<AlertRecord> = self
            .alerts
            .lock()
            .iter()
            .rev()
            .filter(|r| filter.matches(r))
            .cloned()
            .collect();

        Ok(paginate(&matching, page))
    }

    async fn alert_stats(&self) -> Result<AlertStats> {
        let alerts = self.alerts.lock();

        let total = alerts.len() as i64;
        let successful = alerts.iter().filter(|r| r.was_sent).count() as i64;

        let mut by_type = BTreeMap::new();
        for record in alerts.iter() {
            *by_type.entry(record.kind.to_string()).or_insert(0) += 1;
        }

        let recent_failures = alerts
            .iter()
            .rev()
            .filter(|r| !r.was_sent)
            .take(AlertStats::RECENT_FAILURES)
            .cloned()
            .collect();

        Ok(AlertStats::new(total, successful, by_type, recent_failures))
    }
}

#[async_trait]
impl ConfigStore for MemoryStore {
    async fn load_config(&self) -> Result<AlertConfig> {
        Ok(self.config.lock().get_or_insert_with(AlertConfig::default).clone())
    }

    async fn update_config(&self, input: &AlertConfigInput) -> Result<AlertConfig> {
        input.validate()?;

        let mut slot = self.config.lock();
        let config = slot.get_or_insert_with(AlertConfig::default);
        config.apply(input);
        Ok(config.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AlertKind, CustomerInput};

    fn customer(id: i64, balance: f64) -> Customer {
        Customer::from(CustomerInput {
            customer_id: id,
            balance: Some(balance),
            ..Default::default()
        })
    }

    #[tokio::test]
    async fn test_insert_many_is_all_or_nothing() {
        let store = MemoryStore::new();
        store.insert(&customer(1, 0.0)).await.unwrap();

        let err = store
            .insert_many(&[customer(2, 0.0), customer(1, 0.0)])
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Conflict(_)));
        assert!(store.get(2).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_list_orders_and_paginates() {
        let store = MemoryStore::new();
        store
            .insert_many(&[customer(1, 50.0), customer(2, 300.0), customer(3, 10.0)])
            .await
            .unwrap();

        let filter = CustomerFilter {
            ordering: CustomerOrdering::parse("-balance").unwrap(),
            ..Default::default()
        };
        let page = store.list(&filter, PageRequest::new(Some(1), Some(2))).await.unwrap();

        assert_eq!(page.count, 3);
        let ids: Vec<i64> = page.results.iter().map(|c| c.customer_id).collect();
        assert_eq!(ids, vec![2, 1]);
    }

    #[tokio::test]
    async fn test_snapshots_chain_and_cascade() {
        let store = MemoryStore::new();
        store.insert(&customer(7, 0.0)).await.unwrap();

        store.record_probability(7, 0.30, 0.7).await.unwrap();
        let second = store.record_probability(7, 0.50, 0.7).await.unwrap();
        assert_eq!(second.previous_probability, Some(0.30));
        assert_eq!(store.latest(7).await.unwrap(), Some(second));
        assert_eq!(store.history(7, 1).await.unwrap().len(), 1);

        assert!(store.delete(7).await.unwrap());
        assert!(store.snapshots_for(7).is_empty());
        assert!(store.record_probability(7, 0.1, 0.7).await.is_err());
    }

    #[tokio::test]
    async fn test_alert_counts_and_stats() {
        let store = MemoryStore::new();
        let json = serde_json::json!({});
        store
            .append_alert(&AlertRecord::delivered(AlertKind::HighRisk, Some(1), json.clone()))
            .await
            .unwrap();
        store
            .append_alert(&AlertRecord::failed(AlertKind::Summary, None, json, "boom"))
            .await
            .unwrap();

        let since = Utc::now() - chrono::Duration::seconds(60);
        assert_eq!(store.count_sent_since(since).await.unwrap(), 1);

        let stats = store.alert_stats().await.unwrap();
        assert_eq!(stats.total_alerts, 2);
        assert_eq!(stats.alerts_by_type.get("SUMMARY"), Some(&1));
        assert_eq!(stats.recent_failures.len(), 1);
        assert!((stats.success_rate - 50.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_config_is_created_on_first_read() {
        let store = MemoryStore::new();
        let config = store.load_config().await.unwrap();
        assert!(!config.is_enabled);

        let bad = AlertConfigInput {
            high_risk_threshold: Some(2.0),
            ..Default::default()
        };
        assert!(store.update_config(&bad).await.is_err());
        assert_eq!(store.load_config().await.unwrap().high_risk_threshold, 0.7);
    }
}
