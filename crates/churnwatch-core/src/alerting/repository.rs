//! Alert repository for the audit log and the alert configuration row

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, QueryBuilder};
use uuid::Uuid;

use crate::db::{AlertLog, ConfigStore, PostgresPool};
use crate::error::{Error, Result};
use crate::models::{
    AlertConfig, AlertConfigInput, AlertHistoryFilter, AlertKind, AlertRecord, AlertStats, Page,
    PageRequest,
};

const RECORD_COLUMNS: &str = "id, customer_id, kind, message, sent_at, was_sent, error_message";

/// Repository for alert records and settings
#[derive(Clone)]
pub struct AlertRepository {
    pool: PgPool,
}

impl AlertRepository {
    /// Create a new alert repository
    pub fn new(pool: &PostgresPool) -> Self {
        Self {
            pool: pool.pool().clone(),
        }
    }

    async fn insert_default_config(&self) -> Result<()> {
        let defaults = AlertConfig::default();
        sqlx::query(
            r#"
            INSERT INTO alert_config (id, webhook_url, is_enabled, high_risk_threshold, risk_increase_threshold)
            VALUES (1, $1, $2, $3, $4)
            ON CONFLICT (id) DO NOTHING
            "#,
        )
        .bind(&defaults.webhook_url)
        .bind(defaults.is_enabled)
        .bind(defaults.high_risk_threshold)
        .bind(defaults.risk_increase_threshold)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

fn push_history_filter(qb: &mut QueryBuilder<'_, Postgres>, filter: &AlertHistoryFilter) {
    qb.push(" WHERE TRUE");

    if let Some(kind) = filter.kind {
        qb.push(" AND kind = ").push_bind(kind.as_str());
    }
    if let Some(customer_id) = filter.customer_id {
        qb.push(" AND customer_id = ").push_bind(customer_id);
    }
    if filter.success_only {
        qb.push(" AND was_sent");
    }
    if filter.failed_only {
        qb.push(" AND NOT was_sent");
    }
    if let Some(from) = filter.from_ts() {
        qb.push(" AND sent_at >= ").push_bind(from);
    }
    if let Some(until) = filter.until_ts() {
        qb.push(" AND sent_at < ").push_bind(until);
    }
}

#[async_trait]
impl AlertLog for AlertRepository {
    async fn append_alert(&self, record: &AlertRecord) -> Result<()> {
        sqlx::query(&format!(
            "INSERT INTO alert_records ({RECORD_COLUMNS}) VALUES ($1, $2, $3, $4, $5, $6, $7)"
        ))
        .bind(record.id)
        .bind(record.customer_id)
        .bind(record.kind.as_str())
        .bind(&record.message)
        .bind(record.sent_at)
        .bind(record.was_sent)
        .bind(&record.error_message)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn count_sent_since(&self, since: DateTime<Utc>) -> Result<i64> {
        let count = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM alert_records WHERE was_sent AND sent_at >= $1",
        )
        .bind(since)
        .fetch_one(&self.pool)
        .await?;

        Ok(count)
    }

    async fn list_alerts(
        &self,
        filter: &AlertHistoryFilter,
        page: PageRequest,
    ) -> Result<Page<AlertRecord>> {
        let mut count = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM alert_records");
        push_history_filter(&mut count, filter);
        let total = count.build_query_scalar::<i64>().fetch_one(&self.pool).await?;

        let mut select =
            QueryBuilder::<Postgres>::new(format!("SELECT {RECORD_COLUMNS} FROM alert_records"));
        push_history_filter(&mut select, filter);
        select
            .push(" ORDER BY sent_at DESC LIMIT ")
            .push_bind(page.limit())
            .push(" OFFSET ")
            .push_bind(page.offset());

        let rows = select
            .build_query_as::<AlertRecordRow>()
            .fetch_all(&self.pool)
            .await?;

        Ok(Page {
            count: total,
            page: page.page,
            page_size: page.page_size,
            results: rows
                .into_iter()
                .map(AlertRecord::try_from)
                .collect::<Result<_>>()?,
        })
    }

    async fn alert_stats(&self) -> Result<AlertStats> {
        let (total, successful): (i64, i64) = sqlx::query_as(
            "SELECT COUNT(*), COUNT(*) FILTER (WHERE was_sent) FROM alert_records",
        )
        .fetch_one(&self.pool)
        .await?;

        let by_type: Vec<(String, i64)> =
            sqlx::query_as("SELECT kind, COUNT(*) FROM alert_records GROUP BY kind")
                .fetch_all(&self.pool)
                .await?;

        let failures = sqlx::query_as::<_, AlertRecordRow>(&format!(
            "SELECT {RECORD_COLUMNS} FROM alert_records \
             WHERE NOT was_sent ORDER BY sent_at DESC LIMIT $1"
        ))
        .bind(AlertStats::RECENT_FAILURES as i64)
        .fetch_all(&self.pool)
        .await?;

        Ok(AlertStats::new(
            total,
            successful,
            by_type.into_iter().collect::<BTreeMap<_, _>>(),
            failures
                .into_iter()
                .map(AlertRecord::try_from)
                .collect::<Result<_>>()?,
        ))
    }
}

#[async_trait]
impl ConfigStore for AlertRepository {
    async fn load_config(&self) -> Result<AlertConfig> {
        self.insert_default_config().await?;

        let row = sqlx::query_as::<_, AlertConfigRow>(
            r#"
            SELECT webhook_url, is_enabled, high_risk_threshold, risk_increase_threshold,
                   created_at, updated_at
            FROM alert_config WHERE id = 1
            "#,
        )
        .fetch_one(&self.pool)
        .await?;

        Ok(row.into())
    }

    async fn update_config(&self, input: &AlertConfigInput) -> Result<AlertConfig> {
        input.validate()?;
        self.insert_default_config().await?;

        let row = sqlx::query_as::<_, AlertConfigRow>(
            r#"
            UPDATE alert_config SET
                webhook_url = COALESCE($1, webhook_url),
                is_enabled = COALESCE($2, is_enabled),
                high_risk_threshold = COALESCE($3, high_risk_threshold),
                risk_increase_threshold = COALESCE($4, risk_increase_threshold),
                updated_at = NOW()
            WHERE id = 1
            RETURNING webhook_url, is_enabled, high_risk_threshold, risk_increase_threshold,
                      created_at, updated_at
            "#,
        )
        .bind(input.webhook_url.as_deref().map(str::trim))
        .bind(input.is_enabled)
        .bind(input.high_risk_threshold)
        .bind(input.risk_increase_threshold)
        .fetch_one(&self.pool)
        .await?;

        Ok(row.into())
    }
}

#[derive(sqlx::FromRow)]
struct AlertRecordRow {
    id: Uuid,
    customer_id: Option<i64>,
    kind: String,
    message: serde_json::Value,
    sent_at: DateTime<Utc>,
    was_sent: bool,
    error_message: Option<String>,
}

impl TryFrom<AlertRecordRow> for AlertRecord {
    type Error = Error;

    fn try_from(row: AlertRecordRow) -> Result<Self> {
        let kind = AlertKind::parse(&row.kind)
            .ok_or_else(|| Error::internal(format!("unknown alert kind '{}'", row.kind)))?;

        Ok(AlertRecord {
            id: row.id,
            customer_id: row.customer_id,
            kind,
            message: row.message,
            sent_at: row.sent_at,
            was_sent: row.was_sent,
            error_message: row.error_message,
        })
    }
}

#[derive(sqlx::FromRow)]
struct AlertConfigRow {
    webhook_url: String,
    is_enabled: bool,
    high_risk_threshold: f64,
    risk_increase_threshold: f64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<AlertConfigRow> for AlertConfig {
    fn from(row: AlertConfigRow) -> Self {
        AlertConfig {
            webhook_url: row.webhook_url,
            is_enabled: row.is_enabled,
            high_risk_threshold: row.high_risk_threshold,
            risk_increase_threshold: row.risk_increase_threshold,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}
