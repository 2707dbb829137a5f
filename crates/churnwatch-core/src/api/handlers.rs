//! API handlers for the HTTP REST API

use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    extract::{FromRef, Path, Query, State},
    http::{header, StatusCode},
    response::IntoResponse,
    Json,
};
use chrono::NaiveDate;
use metrics_exporter_prometheus::PrometheusHandle;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::db::{AlertLog, ConfigStore, CustomerStore, PredictionCache, Stores};
use crate::error::{Error, Result};
use crate::models::{
    AlertConfig, AlertConfigInput, AlertHistoryFilter, AlertKind, AlertRecord, AlertStats,
    Customer, CustomerFilter, CustomerInput, CustomerOrdering, CustomerPatch, Page, PageRequest,
    RiskSnapshot,
};
use crate::monitor::{Monitor, RunSummary};
use crate::scoring::{FeatureImportance, ModelHandle, Scorer};

use super::auth::{AdminUser, AuthConfig};

/// Default and maximum number of snapshots returned by the risk endpoint
const DEFAULT_RISK_LIMIT: i64 = 50;
const MAX_RISK_LIMIT: i64 = 500;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub stores: Stores,
    pub model: ModelHandle,
    /// Where `POST /api/v1/model/reload` reads the bundle from
    pub model_path: PathBuf,
    pub monitor: Arc<Monitor>,
    pub cache: Option<PredictionCache>,
    pub auth: AuthConfig,
    pub metrics: Option<PrometheusHandle>,
}

impl FromRef<AppState> for AuthConfig {
    fn from_ref(state: &AppState) -> Self {
        state.auth.clone()
    }
}

// =========================================================================
// Health and metrics
// =========================================================================

/// Health check response
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub model_loaded: bool,
    pub monitor_running: bool,
}

/// Health check endpoint
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        model_loaded: state.model.is_loaded(),
        monitor_running: state.monitor.is_running(),
    })
}

/// Prometheus exposition
pub async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    match &state.metrics {
        Some(handle) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            handle.render(),
        )
            .into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

// =========================================================================
// Prediction
// =========================================================================

/// Features for an ad-hoc prediction; missing values fall back to defaults
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PredictRequest {
    pub credit_score: Option<i32>,
    pub geography: Option<String>,
    pub gender: Option<String>,
    pub age: Option<i32>,
    pub tenure: Option<i32>,
    pub balance: Option<f64>,
    pub num_of_products: Option<i32>,
    pub has_cr_card: Option<bool>,
    pub is_active_member: Option<bool>,
    pub estimated_salary: Option<f64>,
}

impl PredictRequest {
    fn to_customer(&self) -> Customer {
        Customer::from(CustomerInput {
            customer_id: 0,
            credit_score: self.credit_score,
            geography: Some(self.geography.clone().unwrap_or_else(|| "France".to_string())),
            gender: Some(self.gender.clone().unwrap_or_else(|| "Female".to_string())),
            age: self.age,
            tenure: self.tenure,
            balance: self.balance,
            num_of_products: self.num_of_products,
            has_cr_card: self.has_cr_card.unwrap_or(false),
            is_active_member: self.is_active_member.unwrap_or(false),
            estimated_salary: self.estimated_salary,
            ..Default::default()
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictResponse {
    pub churn_probability: f64,
    pub prediction: bool,
    pub feature_importance: Vec<FeatureImportance>,
}

/// Score a single feature set
pub async fn predict(
    State(state): State<AppState>,
    Json(req): Json<PredictRequest>,
) -> Result<Json<PredictResponse>> {
    let bundle = state
        .model
        .current()
        .ok_or_else(|| Error::model_unavailable("no churn model is loaded"))?;

    // Keyed by model version too, so a reload does not serve stale results
    let key = PredictionCache::key_for(&(bundle.version.as_deref(), &req))?;
    if let Some(cache) = &state.cache {
        if let Some(hit) = cache.get::<PredictResponse>(&key).await {
            debug!("Prediction cache hit");
            return Ok(Json(hit));
        }
    }

    let scorer = Scorer::new(bundle);
    let probability = scorer.score_customer(&req.to_customer())?;
    let response = PredictResponse {
        churn_probability: probability,
        prediction: probability >= 0.5,
        feature_importance: scorer.bundle().feature_importance.clone(),
    };

    if let Some(cache) = &state.cache {
        cache.put(&key, &response).await;
    }

    Ok(Json(response))
}

// =========================================================================
// Customers
// =========================================================================

/// Query parameters for listing customers
#[derive(Debug, Default, Deserialize)]
pub struct ListCustomersQuery {
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
    pub search: Option<String>,
    pub ordering: Option<String>,
    pub page: Option<u32>,
    pub page_size: Option<u32>,
}

impl ListCustomersQuery {
    fn into_parts(self) -> Result<(CustomerFilter, PageRequest)> {
        let ordering = match self.ordering.as_deref() {
            Some(value) if !value.is_empty() => CustomerOrdering::parse(value)?,
            _ => CustomerOrdering::default(),
        };

        let filter = CustomerFilter {
            geography: self.geography,
            gender: self.gender,
            exited: self.exited,
            has_cr_card: self.has_cr_card,
            is_active_member: self.is_active_member,
            min_age: self.min_age,
            max_age: self.max_age,
            min_credit_score: self.min_credit_score,
            max_credit_score: self.max_credit_score,
            min_balance: self.min_balance,
            max_balance: self.max_balance,
            search: self.search,
            ordering,
        };

        Ok((filter, PageRequest::new(self.page, self.page_size)))
    }
}

/// List customers
pub async fn list_customers(
    _admin: AdminUser,
    State(state): State<AppState>,
    Query(query): Query<ListCustomersQuery>,
) -> Result<Json<Page<Customer>>> {
    let (filter, page) = query.into_parts()?;
    Ok(Json(state.stores.customers.list(&filter, page).await?))
}

/// Create a customer
pub async fn create_customer(
    _admin: AdminUser,
    State(state): State<AppState>,
    Json(input): Json<CustomerInput>,
) -> Result<(StatusCode, Json<Customer>)> {
    input.validate()?;
    let customer = Customer::from(input);
    state.stores.customers.insert(&customer).await?;

    info!(customer_id = customer.customer_id, "Customer created");
    Ok((StatusCode::CREATED, Json(customer)))
}

/// Get a customer
pub async fn get_customer(
    _admin: AdminUser,
    State(state): State<AppState>,
    Path(customer_id): Path<i64>,
) -> Result<Json<Customer>> {
    state
        .stores
        .customers
        .get(customer_id)
        .await?
        .map(Json)
        .ok_or_else(|| Error::not_found("Customer", customer_id))
}

/// Replace a customer
pub async fn replace_customer(
    _admin: AdminUser,
    State(state): State<AppState>,
    Path(customer_id): Path<i64>,
    Json(mut input): Json<CustomerInput>,
) -> Result<Json<Customer>> {
    input.customer_id = customer_id;
    input.validate()?;

    let customer = Customer::from(input);
    if !state.stores.customers.replace(&customer).await? {
        return Err(Error::not_found("Customer", customer_id));
    }
    Ok(Json(customer))
}

/// Merge a partial update into a customer
pub async fn patch_customer(
    _admin: AdminUser,
    State(state): State<AppState>,
    Path(customer_id): Path<i64>,
    Json(patch): Json<CustomerPatch>,
) -> Result<Json<Customer>> {
    patch.validate()?;

    let mut customer = state
        .stores
        .customers
        .get(customer_id)
        .await?
        .ok_or_else(|| Error::not_found("Customer", customer_id))?;
    customer.apply(patch);

    if !state.stores.customers.replace(&customer).await? {
        return Err(Error::not_found("Customer", customer_id));
    }
    Ok(Json(customer))
}

/// Delete a customer and its risk history
pub async fn delete_customer(
    _admin: AdminUser,
    State(state): State<AppState>,
    Path(customer_id): Path<i64>,
) -> Result<StatusCode> {
    if !state.stores.customers.delete(customer_id).await? {
        return Err(Error::not_found("Customer", customer_id));
    }
    info!(customer_id, "Customer deleted");
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Serialize, Deserialize)]
pub struct BulkResponse {
    pub count: usize,
}

/// Create many customers, all or nothing
pub async fn bulk_create_customers(
    _admin: AdminUser,
    State(state): State<AppState>,
    Json(inputs): Json<Vec<CustomerInput>>,
) -> Result<(StatusCode, Json<BulkResponse>)> {
    for input in &inputs {
        input.validate()?;
    }
    let customers: Vec<Customer> = inputs.into_iter().map(Customer::from).collect();
    state.stores.customers.insert_many(&customers).await?;

    info!(count = customers.len(), "Customers created in bulk");
    Ok((
        StatusCode::CREATED,
        Json(BulkResponse {
            count: customers.len(),
        }),
    ))
}

/// Apply many patches, all or nothing
pub async fn bulk_update_customers(
    _admin: AdminUser,
    State(state): State<AppState>,
    Json(patches): Json<Vec<CustomerPatch>>,
) -> Result<Json<BulkResponse>> {
    let mut updated = Vec::with_capacity(patches.len());

    for patch in patches {
        patch.validate()?;
        let customer_id = patch
            .customer_id
            .ok_or_else(|| Error::validation("every bulk update needs a customer_id"))?;

        let mut customer = state
            .stores
            .customers
            .get(customer_id)
            .await?
            .ok_or_else(|| Error::not_found("Customer", customer_id))?;
        customer.apply(patch);
        updated.push(customer);
    }

    state.stores.customers.replace_many(&updated).await?;
    Ok(Json(BulkResponse {
        count: updated.len(),
    }))
}

#[derive(Debug, Deserialize)]
pub struct BulkDeleteRequest {
    pub customer_ids: Vec<i64>,
}

/// Delete many customers
pub async fn bulk_delete_customers(
    _admin: AdminUser,
    State(state): State<AppState>,
    Json(req): Json<BulkDeleteRequest>,
) -> Result<StatusCode> {
    let deleted = state.stores.customers.delete_many(&req.customer_ids).await?;
    info!(requested = req.customer_ids.len(), deleted, "Customers deleted in bulk");
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
pub struct RiskQuery {
    pub limit: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct RiskHistoryResponse {
    pub customer_id: i64,
    pub latest: Option<RiskSnapshot>,
    /// Newest first
    pub history: Vec<RiskSnapshot>,
}

/// Risk history of one customer
pub async fn customer_risk(
    _admin: AdminUser,
    State(state): State<AppState>,
    Path(customer_id): Path<i64>,
    Query(query): Query<RiskQuery>,
) -> Result<Json<RiskHistoryResponse>> {
    if state.stores.customers.get(customer_id).await?.is_none() {
        return Err(Error::not_found("Customer", customer_id));
    }

    let limit = query.limit.unwrap_or(DEFAULT_RISK_LIMIT).clamp(1, MAX_RISK_LIMIT);
    let history = state.monitor.tracker().history(customer_id, limit).await?;

    Ok(Json(RiskHistoryResponse {
        customer_id,
        latest: history.first().cloned(),
        history,
    }))
}

// =========================================================================
// Model
// =========================================================================

#[derive(Debug, Serialize)]
pub struct ModelInfo {
    pub loaded: bool,
    pub path: PathBuf,
    pub version: Option<String>,
    pub numerical_features: Vec<String>,
    pub categorical_features: Vec<String>,
    pub feature_importance: Vec<FeatureImportance>,
}

fn model_info(state: &AppState) -> ModelInfo {
    let bundle = state.model.current();
    ModelInfo {
        loaded: bundle.is_some(),
        path: state.model_path.clone(),
        version: bundle.as_ref().and_then(|b| b.version.clone()),
        numerical_features: bundle
            .as_ref()
            .map(|b| b.numerical_features.clone())
            .unwrap_or_default(),
        categorical_features: bundle
            .as_ref()
            .map(|b| b.categorical_features.clone())
            .unwrap_or_default(),
        feature_importance: bundle
            .as_ref()
            .map(|b| b.feature_importance.clone())
            .unwrap_or_default(),
    }
}

/// Describe the loaded model
pub async fn get_model(_admin: AdminUser, State(state): State<AppState>) -> Json<ModelInfo> {
    Json(model_info(&state))
}

/// Re-read the model bundle from disk
pub async fn reload_model(
    _admin: AdminUser,
    State(state): State<AppState>,
) -> Result<Json<ModelInfo>> {
    state.model.reload(&state.model_path)?;
    Ok(Json(model_info(&state)))
}

// =========================================================================
// Monitoring
// =========================================================================

/// Run the monitor now
pub async fn run_monitor(
    _admin: AdminUser,
    State(state): State<AppState>,
) -> Result<Json<RunSummary>> {
    // Spawned so a dropped request cannot stop a run partway through
    let monitor = Arc::clone(&state.monitor);
    let summary = tokio::spawn(async move { monitor.run().await })
        .await
        .map_err(|e| Error::internal(format!("monitoring run aborted: {e}")))??;
    Ok(Json(summary))
}

// =========================================================================
// Alerts
// =========================================================================

/// Current alert configuration
pub async fn get_alert_config(
    _admin: AdminUser,
    State(state): State<AppState>,
) -> Result<Json<AlertConfig>> {
    Ok(Json(state.stores.config.load_config().await?))
}

/// Partially update the alert configuration
pub async fn update_alert_config(
    _admin: AdminUser,
    State(state): State<AppState>,
    Json(input): Json<AlertConfigInput>,
) -> Result<Json<AlertConfig>> {
    input.validate()?;
    if let Some(url) = input.webhook_url.as_deref().filter(|url| !url.trim().is_empty()) {
        state.monitor.validate_webhook_url(url)?;
    }

    let config = state.stores.config.update_config(&input).await?;
    info!(enabled = config.is_enabled, "Alert configuration updated");
    Ok(Json(config))
}

/// Query parameters for alert history
#[derive(Debug, Default, Deserialize)]
pub struct AlertHistoryQuery {
    pub kind: Option<AlertKind>,
    pub customer_id: Option<i64>,
    pub success_only: Option<bool>,
    pub failed_only: Option<bool>,
    pub date_from: Option<NaiveDate>,
    pub date_to: Option<NaiveDate>,
    pub page: Option<u32>,
    pub page_size: Option<u32>,
}

/// Alert audit log
pub async fn alert_history(
    _admin: AdminUser,
    State(state): State<AppState>,
    Query(query): Query<AlertHistoryQuery>,
) -> Result<Json<Page<AlertRecord>>> {
    let filter = AlertHistoryFilter {
        kind: query.kind,
        customer_id: query.customer_id,
        success_only: query.success_only.unwrap_or(false),
        failed_only: query.failed_only.unwrap_or(false),
        date_from: query.date_from,
        date_to: query.date_to,
    };
    let page = PageRequest::new(query.page, query.page_size);

    Ok(Json(state.stores.alerts.list_alerts(&filter, page).await?))
}

/// Delivery statistics
pub async fn alert_stats(
    _admin: AdminUser,
    State(state): State<AppState>,
) -> Result<Json<AlertStats>> {
    Ok(Json(state.stores.alerts.alert_stats().await?))
}
