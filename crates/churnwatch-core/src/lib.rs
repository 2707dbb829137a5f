//! # ChurnWatch
//!
//! Customer churn scoring and risk monitoring.
//!
//! ChurnWatch scores every customer with a fitted churn model on a schedule,
//! keeps a per-customer history of churn probabilities, and posts webhook
//! alerts when a customer crosses the high-risk threshold or their risk jumps.
//!
//! ## Architecture
//!
//! - **Scoring**: feature encoding and the logistic-regression model bundle
//! - **Monitor**: scoring loop, risk history tracker and scheduler
//! - **Alerting**: gated webhook dispatcher with an audit record per attempt
//! - **Storage**: PostgreSQL for customers, snapshots and alerts; Redis for cached predictions
//! - **API**: REST API for customers, predictions and alert administration
//!
//! ## Quick Start
//!
//! ```bash
//! # Apply migrations and start the API with the hourly monitor
//! churnwatch serve --migrate
//!
//! # Run one monitoring pass and print the summary
//! churnwatch monitor
//! ```

#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]

pub mod alerting;
pub mod api;
pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod monitor;
pub mod scoring;

pub use config::Config;
pub use error::{Error, Result};

/// Re-exports for convenience
pub mod prelude {
    pub use crate::alerting::{AlertDispatcher, WebhookNotifier};
    pub use crate::config::Config;
    pub use crate::db::{Database, MemoryStore, Stores};
    pub use crate::error::{Error, Result};
    pub use crate::models::*;
    pub use crate::monitor::{Monitor, MonitorScheduler, RunSummary};
    pub use crate::scoring::{ModelBundle, ModelHandle, Scorer};
}
