//! PostgreSQL connection and queries

use async_trait::async_trait;
use chrono::{SubsecRound, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::{Postgres, QueryBuilder};

use crate::config::DatabaseConfig;
use crate::error::{Error, Result};
use crate::models::{Customer, CustomerFilter, Page, PageRequest, RiskSnapshot};

use super::store::{CustomerStore, SnapshotStore};

/// SQLSTATE for unique_violation
const UNIQUE_VIOLATION: &str = "23505";

const CUSTOMER_COLUMNS: &str = "customer_id, row_number, surname, credit_score, geography, \
    gender, age, tenure, balance, num_of_products, has_cr_card, is_active_member, \
    estimated_salary, exited";

const SNAPSHOT_COLUMNS: &str =
    "id, customer_id, recorded_at, probability, previous_probability, risk_change, is_high_risk";

/// PostgreSQL connection pool
#[derive(Clone)]
pub struct PostgresPool {
    pool: PgPool,
}

impl PostgresPool {
    /// Create a new PostgreSQL connection pool
    pub async fn new(config: &DatabaseConfig) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .connect(&config.url)
            .await?;

        Ok(Self { pool })
    }

    /// Run migrations
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("../../migrations").run(&self.pool).await?;
        Ok(())
    }

    /// Health check
    pub async fn health_check(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    /// Get the underlying pool
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

/// Map a unique violation to [`Error::Conflict`]
pub(crate) fn conflict_or_db(err: sqlx::Error, message: impl FnOnce() -> String) -> Error {
    match &err {
        sqlx::Error::Database(db) if db.code().as_deref() == Some(UNIQUE_VIOLATION) => {
            Error::Conflict(message())
        }
        _ => Error::Database(err),
    }
}

/// Repository for customer records
#[derive(Clone)]
pub struct CustomerRepository {
    pool: PgPool,
}

impl CustomerRepository {
    pub fn new(pool: &PostgresPool) -> Self {
        Self {
            pool: pool.pool.clone(),
        }
    }
}

fn push_customer_filter(qb: &mut QueryBuilder<'_, Postgres>, filter: &CustomerFilter) {
    qb.push(" WHERE TRUE");

    if let Some(geography) = &filter.geography {
        qb.push(" AND geography = ").push_bind(geography.clone());
    }
    if let Some(gender) = &filter.gender {
        qb.push(" AND gender = ").push_bind(gender.clone());
    }
    if let Some(exited) = filter.exited {
        qb.push(" AND exited = ").push_bind(exited);
    }
    if let Some(has_cr_card) = filter.has_cr_card {
        qb.push(" AND has_cr_card = ").push_bind(has_cr_card);
    }
    if let Some(active) = filter.is_active_member {
        qb.push(" AND is_active_member = ").push_bind(active);
    }
    if let Some(min) = filter.min_age {
        qb.push(" AND age >= ").push_bind(min);
    }
    if let Some(max) = filter.max_age {
        qb.push(" AND age <= ").push_bind(max);
    }
    if let Some(min) = filter.min_credit_score {
        qb.push(" AND credit_score >= ").push_bind(min);
    }
    if let Some(max) = filter.max_credit_score {
        qb.push(" AND credit_score <= ").push_bind(max);
    }
    if let Some(min) = filter.min_balance {
        qb.push(" AND balance >= ").push_bind(min);
    }
    if let Some(max) = filter.max_balance {
        qb.push(" AND balance <= ").push_bind(max);
    }
    if let Some(term) = filter.search.as_deref().filter(|t| !t.is_empty()) {
        let pattern = format!("%{}%", escape_like(term));
        qb.push(" AND (surname ILIKE ")
            .push_bind(pattern.clone())
            .push(" OR geography ILIKE ")
            .push_bind(pattern.clone())
            .push(" OR gender ILIKE ")
            .push_bind(pattern)
            .push(")");
    }
}

fn escape_like(term: &str) -> String {
    term.replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}

async fn update_customer<'e, E>(executor: E, customer: &Customer) -> Result<u64>
where
    E: sqlx::Executor<'e, Database = Postgres>,
{
    let result = sqlx::query(
        r#"
        UPDATE customers SET
            row_number = $2, surname = $3, credit_score = $4, geography = $5, gender = $6,
            age = $7, tenure = $8, balance = $9, num_of_products = $10, has_cr_card = $11,
            is_active_member = $12, estimated_salary = $13, exited = $14
        WHERE customer_id = $1
        "#,
    )
    .bind(customer.customer_id)
    .bind(customer.row_number)
    .bind(&customer.surname)
    .bind(customer.credit_score)
    .bind(&customer.geography)
    .bind(&customer.gender)
    .bind(customer.age)
    .bind(customer.tenure)
    .bind(customer.balance)
    .bind(customer.num_of_products)
    .bind(customer.has_cr_card)
    .bind(customer.is_active_member)
    .bind(customer.estimated_salary)
    .bind(customer.exited)
    .execute(executor)
    .await?;

    Ok(result.rows_affected())
}

#[async_trait]
impl CustomerStore for CustomerRepository {
    async fn list(&self, filter: &CustomerFilter, page: PageRequest) -> Result<Page<Customer>> {
        let mut count = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM customers");
        push_customer_filter(&mut count, filter);
        let total = count.build_query_scalar::<i64>().fetch_one(&self.pool).await?;

        let mut select =
            QueryBuilder::<Postgres>::new(format!("SELECT {CUSTOMER_COLUMNS} FROM customers"));
        push_customer_filter(&mut select, filter);

        let direction = if filter.ordering.descending { "DESC" } else { "ASC" };
        select
            .push(format!(
                " ORDER BY {} {direction} NULLS LAST, customer_id {direction}",
                filter.ordering.field.column()
            ))
            .push(" LIMIT ")
            .push_bind(page.limit())
            .push(" OFFSET ")
            .push_bind(page.offset());

        let results = select
            .build_query_as::<Customer>()
            .fetch_all(&self.pool)
            .await?;

        Ok(Page {
            count: total,
            page: page.page,
            page_size: page.page_size,
            results,
        })
    }

    async fn all(&self) -> Result<Vec<Customer>> {
        let customers = sqlx::query_as::<_, Customer>(&format!(
            "SELECT {CUSTOMER_COLUMNS} FROM customers ORDER BY customer_id"
        ))
        .fetch_all(&self.pool)
        .await?;

        Ok(customers)
    }

    async fn get(&self, customer_id: i64) -> Result<Option<Customer>> {
        let customer = sqlx::query_as::<_, Customer>(&format!(
            "SELECT {CUSTOMER_COLUMNS} FROM customers WHERE customer_id = $1"
        ))
        .bind(customer_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(customer)
    }

    async fn insert(&self, customer: &Customer) -> Result<()> {
        self.insert_many(std::slice::from_ref(customer)).await
    }

    async fn insert_many(&self, customers: &[Customer]) -> Result<()> {
        if customers.is_empty() {
            return Ok(());
        }

        let mut tx = self.pool.begin().await?;

        for customer in customers {
            sqlx::query(&format!(
                "INSERT INTO customers ({CUSTOMER_COLUMNS}) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)"
            ))
            .bind(customer.customer_id)
            .bind(customer.row_number)
            .bind(&customer.surname)
            .bind(customer.credit_score)
            .bind(&customer.geography)
            .bind(&customer.gender)
            .bind(customer.age)
            .bind(customer.tenure)
            .bind(customer.balance)
            .bind(customer.num_of_products)
            .bind(customer.has_cr_card)
            .bind(customer.is_active_member)
            .bind(customer.estimated_salary)
            .bind(customer.exited)
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                conflict_or_db(e, || {
                    format!("customer {} already exists", customer.customer_id)
                })
            })?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn replace(&self, customer: &Customer) -> Result<bool> {
        Ok(update_customer(&self.pool, customer).await? > 0)
    }

    async fn replace_many(&self, customers: &[Customer]) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        for customer in customers {
            if update_customer(&mut *tx, customer).await? == 0 {
                // Dropping the transaction rolls back earlier updates
                return Err(Error::not_found("Customer", customer.customer_id));
            }
        }

        tx.commit().await?;
        Ok(())
    }

    async fn delete(&self, customer_id: i64) -> Result<bool> {
        Ok(self.delete_many(&[customer_id]).await? == 1)
    }

    async fn delete_many(&self, customer_ids: &[i64]) -> Result<u64> {
        let result = sqlx::query("DELETE FROM customers WHERE customer_id = ANY($1)")
            .bind(customer_ids.to_vec())
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }
}

/// Repository for the append-only risk history
#[derive(Clone)]
pub struct SnapshotRepository {
    pool: PgPool,
}

impl SnapshotRepository {
    pub fn new(pool: &PostgresPool) -> Self {
        Self {
            pool: pool.pool.clone(),
        }
    }
}

#[async_trait]
impl SnapshotStore for SnapshotRepository {
    async fn record_probability(
        &self,
        customer_id: i64,
        probability: f64,
        high_risk_threshold: f64,
    ) -> Result<RiskSnapshot> {
        let mut tx = self.pool.begin().await?;

        // The customer row lock serializes writers for this customer
        let locked: Option<i64> =
            sqlx::query_scalar("SELECT customer_id FROM customers WHERE customer_id = $1 FOR UPDATE")
                .bind(customer_id)
                .fetch_optional(&mut *tx)
                .await?;
        if locked.is_none() {
            return Err(Error::not_found("Customer", customer_id));
        }

        let previous = sqlx::query_as::<_, RiskSnapshot>(&format!(
            "SELECT {SNAPSHOT_COLUMNS} FROM risk_snapshots \
             WHERE customer_id = $1 ORDER BY recorded_at DESC LIMIT 1"
        ))
        .bind(customer_id)
        .fetch_optional(&mut *tx)
        .await?;

        // TIMESTAMPTZ stores microseconds
        let now = Utc::now().trunc_subsecs(6);
        let snapshot = RiskSnapshot::next(
            customer_id,
            previous.as_ref(),
            probability,
            high_risk_threshold,
            now,
        );

        sqlx::query(&format!(
            "INSERT INTO risk_snapshots ({SNAPSHOT_COLUMNS}) VALUES ($1, $2, $3, $4, $5, $6, $7)"
        ))
        .bind(snapshot.id)
        .bind(snapshot.customer_id)
        .bind(snapshot.recorded_at)
        .bind(snapshot.probability)
        .bind(snapshot.previous_probability)
        .bind(snapshot.risk_change)
        .bind(snapshot.is_high_risk)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(snapshot)
    }

    async fn latest(&self, customer_id: i64) -> Result<Option<RiskSnapshot>> {
        let snapshot = sqlx::query_as::<_, RiskSnapshot>(&format!(
            "SELECT {SNAPSHOT_COLUMNS} FROM risk_snapshots \
             WHERE customer_id = $1 ORDER BY recorded_at DESC LIMIT 1"
        ))
        .bind(customer_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(snapshot)
    }

    async fn history(&self, customer_id: i64, limit: i64) -> Result<Vec<RiskSnapshot>> {
        let snapshots = sqlx::query_as::<_, RiskSnapshot>(&format!(
            "SELECT {SNAPSHOT_COLUMNS} FROM risk_snapshots \
             WHERE customer_id = $1 ORDER BY recorded_at DESC LIMIT $2"
        ))
        .bind(customer_id)
        .bind(limit.max(0))
        .fetch_all(&self.pool)
        .await?;

        Ok(snapshots)
    }
}
