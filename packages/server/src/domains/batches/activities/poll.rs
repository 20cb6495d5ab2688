//! The poll cycle: select in-flight jobs, reconcile each against the provider
//! and process results for the ones that ended.
//!
//! ```text
//! run_cycle()
//!     ├─► expire_stale(now - lookback)
//!     ├─► find_pollable(now - lookback, batch_limit)
//!     └─► for each job (sequential)
//!             ├─► retrieve → reconcile → save
//!             └─► completed? → processing_results → process_results()
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anthropic_client::ProcessingStatus;
use anyhow::{Context, Result};
use chrono::Utc;
use tracing::{debug, error, info, warn};

use super::process_results::process_results;
use super::reconcile::{apply_progress, reconcile, ProviderProgress};
use crate::domains::batches::models::{BatchJob, BatchStatus};
use crate::kernel::ServerDeps;

/// Tunables for one poller instance.
#[derive(Debug, Clone)]
pub struct PollerConfig {
    /// Jobs submitted longer ago than this are expired instead of polled.
    pub lookback: chrono::Duration,
    /// Maximum jobs selected per cycle.
    pub batch_limit: i64,
    /// Pause after each job that did not process results.
    pub job_delay: Duration,
    /// Pause between result items.
    pub item_delay: Duration,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            lookback: chrono::Duration::hours(25),
            batch_limit: 50,
            job_delay: Duration::from_millis(500),
            item_delay: Duration::from_millis(100),
        }
    }
}

impl PollerConfig {
    /// Same selection rules, no pauses.
    pub fn without_delays() -> Self {
        Self {
            job_delay: Duration::ZERO,
            item_delay: Duration::ZERO,
            ..Self::default()
        }
    }
}

// =============================================================================
// Overlap guard
// =============================================================================

/// In-process "cycle in progress" flag. Clones share the flag.
#[derive(Debug, Clone, Default)]
pub struct CycleGuard {
    running: Arc<AtomicBool>,
}

impl CycleGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim the guard, or `None` if a cycle is already running.
    pub fn try_acquire(&self) -> Option<CycleToken> {
        self.running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| CycleToken {
                running: Arc::clone(&self.running),
            })
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }
}

/// Releases the guard when dropped.
#[derive(Debug)]
pub struct CycleToken {
    running: Arc<AtomicBool>,
}

impl Drop for CycleToken {
    fn drop(&mut self) {
        self.running.store(false, Ordering::Release);
    }
}

// =============================================================================
// Cycle results
// =============================================================================

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub selected: usize,
    /// Still running at the provider (submitted/polling/canceling).
    pub still_running: usize,
    /// Results were applied this cycle.
    pub processed: usize,
    /// Mirrored a provider failure/expiry/cancellation.
    pub stopped: usize,
    /// Marked failed locally after a per-job error.
    pub failed: usize,
    /// Dropped out of the lookback window and expired.
    pub expired_stale: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Another cycle held the guard.
    Skipped,
    Completed(CycleReport),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum JobOutcome {
    StillRunning,
    Processed(BatchStatus),
    Stopped(BatchStatus),
}

// =============================================================================
// Poller
// =============================================================================

pub struct BatchPoller {
    deps: Arc<ServerDeps>,
    config: PollerConfig,
    guard: CycleGuard,
}

impl BatchPoller {
    pub fn new(deps: Arc<ServerDeps>, config: PollerConfig) -> Self {
        Self::with_guard(deps, config, CycleGuard::new())
    }

    /// Share an existing guard, e.g. between a scheduler and a manual trigger.
    pub fn with_guard(deps: Arc<ServerDeps>, config: PollerConfig, guard: CycleGuard) -> Self {
        Self {
            deps,
            config,
            guard,
        }
    }

    pub fn guard(&self) -> &CycleGuard {
        &self.guard
    }

    /// Run one cycle unless another is already in progress.
    ///
    /// Only selection errors abort the cycle; per-job errors are recorded on
    /// the job and the loop continues.
    pub async fn run_cycle(&self) -> Result<CycleOutcome> {
        let Some(_token) = self.guard.try_acquire() else {
            info!("Poll cycle already in progress, skipping");
            return Ok(CycleOutcome::Skipped);
        };

        let since = Utc::now() - self.config.lookback;
        let mut report = CycleReport::default();

        report.expired_stale = self
            .deps
            .batch_jobs
            .expire_stale(
                since,
                "Batch exceeded the polling window without finishing",
            )
            .await
            .context("Failed to expire stale batch jobs")?;

        if report.expired_stale > 0 {
            warn!(count = report.expired_stale, "Expired batch jobs outside the polling window");
        }

        let jobs = self
            .deps
            .batch_jobs
            .find_pollable(since, self.config.batch_limit)
            .await
            .context("Failed to load pollable batch jobs")?;

        report.selected = jobs.len();
        if jobs.is_empty() {
            debug!("No batch jobs to poll");
            return Ok(CycleOutcome::Completed(report));
        }

        info!(count = jobs.len(), "Polling batch jobs");

        for mut job in jobs {
            let outcome = self.poll_job(&mut job).await;

            let processed = match outcome {
                Ok(JobOutcome::StillRunning) => {
                    report.still_running += 1;
                    false
                }
                Ok(JobOutcome::Processed(_)) => {
                    report.processed += 1;
                    true
                }
                Ok(JobOutcome::Stopped(status)) if status == BatchStatus::Failed => {
                    report.failed += 1;
                    false
                }
                Ok(JobOutcome::Stopped(_)) => {
                    report.stopped += 1;
                    false
                }
                Err(e) => {
                    self.mark_failed(&mut job, &e).await;
                    report.failed += 1;
                    false
                }
            };

            if !processed && !self.config.job_delay.is_zero() {
                tokio::time::sleep(self.config.job_delay).await;
            }
        }

        info!(
            selected = report.selected,
            still_running = report.still_running,
            processed = report.processed,
            stopped = report.stopped,
            failed = report.failed,
            "Poll cycle finished"
        );

        Ok(CycleOutcome::Completed(report))
    }

    async fn poll_job(&self, job: &mut BatchJob) -> Result<JobOutcome> {
        let deps = self.deps.as_ref();

        if job.status != BatchStatus::Completed {
            job.advance(BatchStatus::Polling)?;
            deps.batch_jobs.save(job).await?;
        }

        let batch = deps
            .batch_api
            .retrieve(&job.batch_id)
            .await
            .with_context(|| format!("Failed to retrieve batch {}", job.batch_id))?;

        let progress = ProviderProgress::from(&batch);
        if progress.status == ProcessingStatus::Unrecognized {
            warn!(batch_id = %job.batch_id, "Provider returned an unrecognized processing status");
        }

        let next = reconcile(job.status, progress.status);
        apply_progress(job, &progress, Utc::now());
        job.advance(next)?;

        if matches!(
            next,
            BatchStatus::Failed | BatchStatus::Expired | BatchStatus::Canceled
        ) {
            job.record_error_if_missing(&format!("Batch {} by provider", next));
        }

        deps.batch_jobs.save(job).await?;

        debug!(
            batch_id = %job.batch_id,
            provider_status = ?progress.status,
            status = %job.status,
            succeeded = job.succeeded_count,
            failed = job.failed_count,
            "Reconciled batch job"
        );

        match next {
            BatchStatus::Completed => {
                job.advance(BatchStatus::ProcessingResults)?;
                deps.batch_jobs.save(job).await?;
                let status = process_results(job, self.config.item_delay, deps).await?;
                Ok(JobOutcome::Processed(status))
            }
            status if status.is_terminal() => {
                info!(batch_id = %job.batch_id, status = %status, "Batch stopped by provider");
                Ok(JobOutcome::Stopped(status))
            }
            _ => Ok(JobOutcome::StillRunning),
        }
    }

    async fn mark_failed(&self, job: &mut BatchJob, err: &anyhow::Error) {
        error!(batch_id = %job.batch_id, error = %err, "Error polling batch job");

        // The in-memory copy may have moved past what was persisted (e.g. a
        // final save that errored), so fail the stored row instead.
        match self.deps.batch_jobs.find_by_batch_id(&job.batch_id).await {
            Ok(Some(mut stored)) => {
                stored.succeeded_count = job.succeeded_count;
                stored.failed_count = job.failed_count;
                *job = stored;
            }
            Ok(None) => {}
            Err(e) => {
                warn!(batch_id = %job.batch_id, error = %e, "Could not reload batch job before failing it");
            }
        }

        if job.status.is_terminal() {
            warn!(batch_id = %job.batch_id, status = %job.status, "Batch job already terminal, not marking failed");
            return;
        }

        if let Err(e) = job.fail(&format!("{:#}", err)) {
            error!(batch_id = %job.batch_id, error = %e, "Cannot mark batch job failed");
            return;
        }

        if let Err(e) = self.deps.batch_jobs.save(job).await {
            error!(batch_id = %job.batch_id, error = %e, "Failed to save failed batch job");
        }
    }
}
