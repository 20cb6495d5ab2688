//! Mapping provider batch status onto the local lifecycle.

use anthropic_client::{MessageBatch, ProcessingStatus};
use chrono::{DateTime, Utc};

use crate::domains::batches::models::{BatchJob, BatchStatus};

/// Snapshot of what the provider reported for one batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderProgress {
    pub status: ProcessingStatus,
    pub succeeded: i32,
    /// errored + expired + canceled
    pub failed: i32,
    pub results_url: Option<String>,
    pub ended_at: Option<DateTime<Utc>>,
}

impl From<&MessageBatch> for ProviderProgress {
    fn from(batch: &MessageBatch) -> Self {
        Self {
            status: batch.processing_status,
            succeeded: clamp_count(batch.request_counts.succeeded),
            failed: clamp_count(batch.request_counts.unsuccessful()),
            results_url: batch.results_url.clone(),
            ended_at: batch.ended_at,
        }
    }
}

fn clamp_count(count: u32) -> i32 {
    i32::try_from(count).unwrap_or(i32::MAX)
}

/// Next local status given the provider's view.
///
/// Ended/completed batches become `completed` unless the job is already at
/// or past that point. Provider failures are mirrored verbatim. Anything
/// still running keeps the job in `polling`.
pub fn reconcile(local: BatchStatus, provider: ProcessingStatus) -> BatchStatus {
    match provider {
        ProcessingStatus::Ended | ProcessingStatus::Completed => {
            if local.is_at_or_past_completed() {
                local
            } else {
                BatchStatus::Completed
            }
        }
        ProcessingStatus::Failed => BatchStatus::Failed,
        ProcessingStatus::Expired => BatchStatus::Expired,
        ProcessingStatus::Canceled => BatchStatus::Canceled,
        ProcessingStatus::Canceling => BatchStatus::Canceling,
        ProcessingStatus::InProgress | ProcessingStatus::Unrecognized => {
            if local.is_at_or_past_completed() {
                local
            } else {
                BatchStatus::Polling
            }
        }
    }
}

/// Overwrite counts and provider pointers on the job. Tallies are replaced, not added.
pub fn apply_progress(job: &mut BatchJob, progress: &ProviderProgress, polled_at: DateTime<Utc>) {
    job.succeeded_count = progress.succeeded;
    job.failed_count = progress.failed;
    if let Some(url) = &progress.results_url {
        job.results_url = Some(url.clone());
    }
    if let Some(ended_at) = progress.ended_at {
        job.completed_at = Some(ended_at);
    }
    job.last_polled_at = Some(polled_at);
}

#[cfg(test)]
mod tests {
    use super::*;
    use anthropic_client::RequestCounts;

    #[test]
    fn test_ended_becomes_completed() {
        assert_eq!(
            reconcile(BatchStatus::Polling, ProcessingStatus::Ended),
            BatchStatus::Completed
        );
        assert_eq!(
            reconcile(BatchStatus::Polling, ProcessingStatus::Completed),
            BatchStatus::Completed
        );
    }

    #[test]
    fn test_no_regression_past_completed() {
        for local in [
            BatchStatus::Completed,
            BatchStatus::ProcessingResults,
            BatchStatus::Processed,
            BatchStatus::ProcessedWithErrors,
        ] {
            assert_eq!(reconcile(local, ProcessingStatus::Ended), local);
            assert_eq!(reconcile(local, ProcessingStatus::InProgress), local);
        }
    }

    #[test]
    fn test_failures_mirrored() {
        let cases = [
            (ProcessingStatus::Failed, BatchStatus::Failed),
            (ProcessingStatus::Expired, BatchStatus::Expired),
            (ProcessingStatus::Canceled, BatchStatus::Canceled),
            (ProcessingStatus::Canceling, BatchStatus::Canceling),
        ];

        for (provider, expected) in cases {
            assert_eq!(reconcile(BatchStatus::Polling, provider), expected);
        }
    }

    #[test]
    fn test_running_stays_polling() {
        assert_eq!(
            reconcile(BatchStatus::Submitted, ProcessingStatus::InProgress),
            BatchStatus::Polling
        );
        assert_eq!(
            reconcile(BatchStatus::Polling, ProcessingStatus::Unrecognized),
            BatchStatus::Polling
        );
    }

    #[test]
    fn test_progress_overwrites_counts() {
        let mut job = BatchJob::builder()
            .batch_id("msgbatch_counts")
            .batch_type("outline")
            .succeeded_count(10)
            .failed_count(10)
            .build();

        let progress = ProviderProgress {
            status: ProcessingStatus::InProgress,
            succeeded: 3,
            failed: 1,
            results_url: None,
            ended_at: None,
        };
        let now = Utc::now();
        apply_progress(&mut job, &progress, now);

        assert_eq!(job.succeeded_count, 3);
        assert_eq!(job.failed_count, 1);
        assert_eq!(job.last_polled_at, Some(now));
        assert!(job.results_url.is_none());
    }

    #[test]
    fn test_failed_count_sums_unsuccessful() {
        let batch = MessageBatch {
            id: "msgbatch_sum".into(),
            processing_status: ProcessingStatus::Ended,
            request_counts: RequestCounts {
                processing: 0,
                succeeded: 5,
                errored: 1,
                canceled: 2,
                expired: 3,
            },
            created_at: None,
            ended_at: None,
            expires_at: None,
            results_url: Some("https://example.test/results".into()),
        };

        let progress = ProviderProgress::from(&batch);
        assert_eq!(progress.succeeded, 5);
        assert_eq!(progress.failed, 6);
    }
}
