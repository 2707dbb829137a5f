//! Churn risk monitoring
//!
//! A run scores every customer with the loaded model, appends the result to
//! the customer's risk history and hands alert-worthy snapshots to the
//! dispatcher. Runs are triggered by the scheduler or on demand.

mod history;
mod runner;
mod scheduler;

pub use history::RiskTracker;
pub use runner::{Monitor, RunSummary};
pub use scheduler::MonitorScheduler;
