//! Periodic monitoring runs

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{error, info, warn};

use crate::error::Error;

use super::runner::Monitor;

/// Triggers a monitoring run every `period`, starting one period after launch
pub struct MonitorScheduler {
    monitor: Arc<Monitor>,
    period: Duration,
}

impl MonitorScheduler {
    pub fn new(monitor: Arc<Monitor>, period: Duration) -> Self {
        Self { monitor, period }
    }

    /// Run the loop on a background task
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(async move { self.start().await })
    }

    /// Start the scheduling loop; errors are logged and the loop keeps going
    pub async fn start(&self) {
        info!(period = %humantime::format_duration(self.period), "Starting monitor scheduler");

        let mut ticker = interval_at(Instant::now() + self.period, self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            ticker.tick().await;

            match self.monitor.run().await {
                Ok(summary) => info!(
                    run_id = %summary.run_id,
                    checked = summary.total_checked,
                    "Scheduled monitoring run complete"
                ),
                Err(Error::RunInProgress) => {
                    warn!("Previous monitoring run still in progress, skipping tick")
                }
                Err(e) => error!(error = %e, "Scheduled monitoring run failed"),
            }
        }
    }
}
