//! Query and response types shared between API and database layers

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::alert::{AlertKind, AlertRecord};
use super::customer::Customer;

/// Default page size for list endpoints
pub const DEFAULT_PAGE_SIZE: u32 = 10;

/// Largest page a client may request
pub const MAX_PAGE_SIZE: u32 = 100;

/// Pagination request (1-based pages)
#[derive(Debug, Clone, Copy, Deserialize, Serialize)]
pub struct PageRequest {
    pub page: u32,
    pub page_size: u32,
}

impl Default for PageRequest {
    fn default() -> Self {
        Self {
            page: 1,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

impl PageRequest {
    /// Build a page request, clamping out-of-range values
    pub fn new(page: Option<u32>, page_size: Option<u32>) -> Self {
        Self {
            page: page.unwrap_or(1).max(1),
            page_size: page_size
                .unwrap_or(DEFAULT_PAGE_SIZE)
                .clamp(1, MAX_PAGE_SIZE),
        }
    }

    /// Rows to skip
    pub fn offset(&self) -> i64 {
        i64::from(self.page - 1) * i64::from(self.page_size)
    }

    /// Rows to return
    pub fn limit(&self) -> i64 {
        i64::from(self.page_size)
    }
}

/// One page of results
#[derive(Debug, Clone, Serialize)]
pub struct Page<T> {
    pub count: i64,
    pub page: u32,
    pub page_size: u32,
    pub results: Vec<T>,
}

/// Sortable customer columns
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CustomerSortField {
    #[default]
    CustomerId,
    Age,
    CreditScore,
    Balance,
    EstimatedSalary,
}

impl CustomerSortField {
    /// Column name in the `customers` table
    pub fn column(self) -> &'static str {
        match self {
            CustomerSortField::CustomerId => "customer_id",
            CustomerSortField::Age => "age",
            CustomerSortField::CreditScore => "credit_score",
            CustomerSortField::Balance => "balance",
            CustomerSortField::EstimatedSalary => "estimated_salary",
        }
    }
}

/// Parsed `ordering` parameter, e.g. `-balance`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CustomerOrdering {
    pub field: CustomerSortField,
    pub descending: bool,
}

impl CustomerOrdering {
    /// Parse `field` or `-field`
    pub fn parse(value: &str) -> crate::Result<Self> {
        let (descending, name) = match value.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, value),
        };

        let field = match name {
            "customer_id" => CustomerSortField::CustomerId,
            "age" => CustomerSortField::Age,
            "credit_score" => CustomerSortField::CreditScore,
            "balance" => CustomerSortField::Balance,
            "estimated_salary" => CustomerSortField::EstimatedSalary,
            other => {
                return Err(crate::Error::validation(format!(
                    "cannot order by '{other}'"
                )))
            }
        };

        Ok(Self { field, descending })
    }
}

/// Filters for listing customers
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct CustomerFilter {
    pub geography: Option<String>,
    pub gender: Option<String>,
    pub exited: Option<bool>,
    pub has_cr_card: Option<bool>,
    pub is_active_member: Option<bool>,
    pub min_age: Option<i32>,
    pub max_age: Option<i32>,
    pub min_credit_score: Option<i32>,
    pub max_credit_score: Option<i32>,
    pub min_balance: Option<f64>,
    pub max_balance: Option<f64>,
    /// Case-insensitive substring match over surname, geography and gender
    pub search: Option<String>,
    #[serde(skip)]
    pub ordering: CustomerOrdering,
}

impl CustomerFilter {
    /// In-memory evaluation of the filter (mirrors the SQL in the Postgres store)
    pub fn matches(&self, c: &Customer) -> bool {
        fn eq_opt(want: &Option<String>, have: &Option<String>) -> bool {
            want.as_ref().map_or(true, |w| have.as_deref() == Some(w.as_str()))
        }
        fn in_range<T: PartialOrd + Copy>(v: Option<T>, min: Option<T>, max: Option<T>) -> bool {
            if min.is_none() && max.is_none() {
                return true;
            }
            let Some(v) = v else { return false };
            min.map_or(true, |m| v >= m) && max.map_or(true, |m| v <= m)
        }

        if !eq_opt(&self.geography, &c.geography) || !eq_opt(&self.gender, &c.gender) {
            return false;
        }
        if self.exited.is_some_and(|v| v != c.exited)
            || self.has_cr_card.is_some_and(|v| v != c.has_cr_card)
            || self.is_active_member.is_some_and(|v| v != c.is_active_member)
        {
            return false;
        }
        if !in_range(c.age, self.min_age, self.max_age)
            || !in_range(c.credit_score, self.min_credit_score, self.max_credit_score)
            || !in_range(c.balance, self.min_balance, self.max_balance)
        {
            return false;
        }
        if let Some(term) = self.search.as_deref().filter(|t| !t.is_empty()) {
            let term = term.to_lowercase();
            let hit = [&c.surname, &c.geography, &c.gender]
                .iter()
                .any(|f| f.as_deref().is_some_and(|v| v.to_lowercase().contains(&term)));
            if !hit {
                return false;
            }
        }
        true
    }
}

/// Filters for the alert audit log
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AlertHistoryFilter {
    pub kind: Option<AlertKind>,
    pub customer_id: Option<i64>,
    /// Only records that were delivered
    #[serde(default)]
    pub success_only: bool,
    /// Only records that were not delivered
    #[serde(default)]
    pub failed_only: bool,
    /// Inclusive start date (UTC)
    pub date_from: Option<NaiveDate>,
    /// Inclusive end date (UTC)
    pub date_to: Option<NaiveDate>,
}

impl AlertHistoryFilter {
    /// Lower bound as a timestamp
    pub fn from_ts(&self) -> Option<DateTime<Utc>> {
        self.date_from
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .map(|dt| dt.and_utc())
    }

    /// Exclusive upper bound as a timestamp (start of the following day)
    pub fn until_ts(&self) -> Option<DateTime<Utc>> {
        self.date_to
            .and_then(|d| d.succ_opt())
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .map(|dt| dt.and_utc())
    }

    pub fn matches(&self, record: &AlertRecord) -> bool {
        if self.kind.is_some_and(|k| k != record.kind) {
            return false;
        }
        if self.customer_id.is_some() && self.customer_id != record.customer_id {
            return false;
        }
        if self.success_only && !record.was_sent {
            return false;
        }
        if self.failed_only && record.was_sent {
            return false;
        }
        if self.from_ts().is_some_and(|from| record.sent_at < from) {
            return false;
        }
        if self.until_ts().is_some_and(|until| record.sent_at >= until) {
            return false;
        }
        true
    }
}

/// Aggregate delivery statistics
#[derive(Debug, Clone, Serialize)]
pub struct AlertStats {
    pub total_alerts: i64,
    pub successful_alerts: i64,
    /// Percentage of delivered alerts, 0 when there are none
    pub success_rate: f64,
    pub alerts_by_type: BTreeMap<String, i64>,
    pub recent_failures: Vec<AlertRecord>,
}

impl AlertStats {
    /// Number of failures listed in `recent_failures`
    pub const RECENT_FAILURES: usize = 10;

    pub fn new(
        total_alerts: i64,
        successful_alerts: i64,
        alerts_by_type: BTreeMap<String, i64>,
        recent_failures: Vec<AlertRecord>,
    ) -> Self {
        let success_rate = if total_alerts > 0 {
            successful_alerts as f64 / total_alerts as f64 * 100.0
        } else {
            0.0
        };
        Self {
            total_alerts,
            successful_alerts,
            success_rate,
            alerts_by_type,
            recent_failures,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::CustomerInput;

    fn customer(id: i64, surname: &str, geography: &str, age: i32, balance: f64) -> Customer {
        Customer::from(CustomerInput {
            customer_id: id,
            surname: Some(surname.to_string()),
            geography: Some(geography.to_string()),
            gender: Some("Female".to_string()),
            age: Some(age),
            balance: Some(balance),
            ..Default::default()
        })
    }

    #[test]
    fn test_page_request_clamps() {
        let page = PageRequest::new(Some(0), Some(500));
        assert_eq!(page.page, 1);
        assert_eq!(page.page_size, MAX_PAGE_SIZE);

        let page = PageRequest::new(Some(3), None);
        assert_eq!(page.offset(), 20);
        assert_eq!(page.limit(), 10);
    }

    #[test]
    fn test_ordering_parse() {
        let ordering = CustomerOrdering::parse("-balance").unwrap();
        assert_eq!(ordering.field, CustomerSortField::Balance);
        assert!(ordering.descending);

        assert!(CustomerOrdering::parse("surname").is_err());
    }

    #[test]
    fn test_filter_ranges_and_search() {
        let a = customer(1, "Onio", "Spain", 39, 0.0);
        let b = customer(2, "Hill", "Germany", 61, 125_000.0);

        let filter = CustomerFilter {
            min_age: Some(40),
            ..Default::default()
        };
        assert!(!filter.matches(&a));
        assert!(filter.matches(&b));

        let filter = CustomerFilter {
            search: Some("germ".to_string()),
            ..Default::default()
        };
        assert!(!filter.matches(&a));
        assert!(filter.matches(&b));

        let filter = CustomerFilter {
            max_balance: Some(10.0),
            geography: Some("Spain".to_string()),
            ..Default::default()
        };
        assert!(filter.matches(&a));
        assert!(!filter.matches(&b));
    }

    #[test]
    fn test_success_rate() {
        let stats = AlertStats::new(4, 3, BTreeMap::new(), vec![]);
        assert!((stats.success_rate - 75.0).abs() < 1e-9);

        let empty = AlertStats::new(0, 0, BTreeMap::new(), vec![]);
        assert_eq!(empty.success_rate, 0.0);
    }
}
