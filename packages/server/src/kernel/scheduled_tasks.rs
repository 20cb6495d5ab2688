//! Scheduled background tasks using tokio-cron-scheduler.
//!
//! The batch poller runs once at startup and then on a cron schedule
//! (every 15 minutes by default). Overlapping ticks are skipped by the
//! poller's own cycle guard, not by the scheduler.
//!
//! ```text
//! Scheduler (POLL_CRON)
//!     │
//!     └─► BatchPoller::run_cycle()
//!             └─► retrieve → reconcile → process_results
//! ```

use std::sync::Arc;

use anyhow::Result;
use tokio_cron_scheduler::{Job, JobScheduler};

use crate::domains::batches::{BatchPoller, CycleOutcome};

/// Run one poll cycle immediately, then schedule it on `cron`.
pub async fn start_scheduler(poller: Arc<BatchPoller>, cron: &str) -> Result<JobScheduler> {
    run_poll_cycle(&poller).await;

    let scheduler = JobScheduler::new().await?;

    let poll_poller = poller.clone();
    let poll_job = Job::new_async(cron, move |_uuid, _lock| {
        let poller = poll_poller.clone();
        Box::pin(async move {
            run_poll_cycle(&poller).await;
        })
    })?;

    scheduler.add(poll_job).await?;
    scheduler.start().await?;

    tracing::info!(cron = %cron, "Scheduled batch polling started");
    Ok(scheduler)
}

/// Run one cycle, logging instead of propagating failures.
pub async fn run_poll_cycle(poller: &BatchPoller) {
    match poller.run_cycle().await {
        Ok(CycleOutcome::Skipped) => {
            tracing::info!("Previous poll cycle still running");
        }
        Ok(CycleOutcome::Completed(report)) => {
            tracing::debug!(?report, "Poll cycle complete");
        }
        Err(e) => {
            tracing::error!("Batch poll cycle failed: {:#}", e);
        }
    }
}
