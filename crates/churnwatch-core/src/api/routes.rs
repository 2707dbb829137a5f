//! API routes

use axum::{
    routing::{get, post},
    Router,
};

use super::handlers::{self, AppState};

/// Create the API router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health
        .route("/health", get(handlers::health))
        .route("/metrics", get(handlers::metrics))

        // Prediction
        .route("/api/v1/predict", post(handlers::predict))

        // Customers
        .route(
            "/api/v1/customers",
            get(handlers::list_customers).post(handlers::create_customer),
        )
        .route("/api/v1/customers/bulk", post(handlers::bulk_create_customers))
        .route("/api/v1/customers/bulk/update", post(handlers::bulk_update_customers))
        .route("/api/v1/customers/bulk/delete", post(handlers::bulk_delete_customers))
        .route(
            "/api/v1/customers/:customer_id",
            get(handlers::get_customer)
                .put(handlers::replace_customer)
                .patch(handlers::patch_customer)
                .delete(handlers::delete_customer),
        )
        .route("/api/v1/customers/:customer_id/risk", get(handlers::customer_risk))

        // Model
        .route("/api/v1/model", get(handlers::get_model))
        .route("/api/v1/model/reload", post(handlers::reload_model))

        // Monitoring
        .route("/api/v1/monitor/run", post(handlers::run_monitor))

        // Alerts
        .route(
            "/api/v1/alerts/config",
            get(handlers::get_alert_config)
                .post(handlers::update_alert_config)
                .put(handlers::update_alert_config),
        )
        .route("/api/v1/alerts/history", get(handlers::alert_history))
        .route("/api/v1/alerts/stats", get(handlers::alert_stats))

        .with_state(state)
}
