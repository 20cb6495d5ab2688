//! Applying an ended batch's result stream to paper rows.
//!
//! Each line is turned into a `Result<Applied, ItemError>` and folded into a
//! [`ResultTally`]. Item failures never abort the batch; only a broken stream
//! does, in which case the job is marked `failed` with estimated tallies.

use std::time::Duration;

use anthropic_client::{BatchResult, BatchResultItem};
use anyhow::{Context, Result};
use chrono::Utc;
use futures::StreamExt;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::domains::batches::models::{BatchJob, BatchStatus, BatchType};
use crate::domains::papers::activities::{generate_paper_embedding, revalidate_paper};
use crate::domains::papers::models::GeneratedContent;
use crate::kernel::ServerDeps;

/// A result line that was written to its paper.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Applied {
    pub paper_id: String,
    pub kind: BatchType,
}

/// Why a result line did not count as a success.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ItemError {
    #[error("result line has no custom_id")]
    MissingId,

    #[error("paper {paper_id}: provider reported {kind}")]
    ProviderFailure { paper_id: String, kind: &'static str },

    #[error("paper {paper_id}: generated text is empty")]
    EmptyContent { paper_id: String },

    #[error("paper {paper_id}: unknown batch type '{batch_type}'")]
    UnknownBatchType { paper_id: String, batch_type: String },

    #[error("paper {paper_id}: write failed: {reason}")]
    WriteFailed { paper_id: String, reason: String },

    /// The summary was written; only the derived embedding is missing.
    #[error("paper {paper_id}: embedding generation failed")]
    EmbeddingFailed { paper_id: String },
}

/// Running totals for one pass over a result stream.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResultTally {
    pub succeeded: i32,
    pub failed: i32,
    pub errors: Vec<ItemError>,
}

impl ResultTally {
    pub fn record(&mut self, outcome: Result<Applied, ItemError>) {
        match outcome {
            Ok(_) => self.succeeded += 1,
            Err(e) => {
                self.failed += 1;
                self.errors.push(e);
            }
        }
    }

    pub fn total(&self) -> i32 {
        self.succeeded + self.failed
    }

    /// `processed` iff nothing failed.
    pub fn final_status(&self) -> BatchStatus {
        if self.failed == 0 {
            BatchStatus::Processed
        } else {
            BatchStatus::ProcessedWithErrors
        }
    }
}

/// Consume the results of a job in `processing_results` and persist the
/// final status and tallies. Returns the final status.
pub async fn process_results(
    job: &mut BatchJob,
    item_delay: Duration,
    deps: &ServerDeps,
) -> Result<BatchStatus> {
    info!(batch_id = %job.batch_id, batch_type = %job.batch_type, "Processing batch results");

    let batch_type = job.parsed_type().ok();
    let mut tally = ResultTally::default();

    let stream_error = match deps
        .batch_api
        .results(&job.batch_id, job.results_url.as_deref())
        .await
    {
        Ok(mut stream) => {
            let mut broken = None;
            while let Some(next) = stream.next().await {
                match next {
                    Ok(item) => {
                        let outcome = apply_item(item, batch_type, &job.batch_type, deps).await;
                        if let Err(e) = &outcome {
                            warn!(batch_id = %job.batch_id, error = %e, "Batch item not applied");
                        }
                        tally.record(outcome);
                    }
                    Err(e) => {
                        broken = Some(e);
                        break;
                    }
                }

                if !item_delay.is_zero() {
                    tokio::time::sleep(item_delay).await;
                }
            }
            broken
        }
        Err(e) => Some(e),
    };

    match stream_error {
        Some(e) => {
            error!(
                batch_id = %job.batch_id,
                succeeded = tally.succeeded,
                error = %e,
                "Result stream failed, marking batch failed"
            );
            let succeeded = tally.succeeded;
            let estimated_failed = job
                .total_requests
                .map(|total| (total - succeeded).max(0))
                .unwrap_or(0)
                .max(tally.failed);

            job.fail(&format!("Result stream failed: {:#}", e))?;
            job.succeeded_count = succeeded;
            job.failed_count = estimated_failed;
        }
        None => {
            job.advance(tally.final_status())?;
            job.succeeded_count = tally.succeeded;
            job.failed_count = tally.failed;
        }
    }

    job.processed_at = Some(Utc::now());
    deps.batch_jobs
        .save(job)
        .await
        .with_context(|| format!("Failed to save final status for batch {}", job.batch_id))?;

    info!(
        batch_id = %job.batch_id,
        status = %job.status,
        succeeded = job.succeeded_count,
        failed = job.failed_count,
        "Finished processing batch results"
    );

    Ok(job.status)
}

/// Apply one result line to its paper.
async fn apply_item(
    item: BatchResultItem,
    batch_type: Option<BatchType>,
    raw_batch_type: &str,
    deps: &ServerDeps,
) -> Result<Applied, ItemError> {
    let paper_id = item
        .custom_id
        .filter(|id| !id.trim().is_empty())
        .ok_or(ItemError::MissingId)?;

    let message = match item.result {
        BatchResult::Succeeded { message } => message,
        other => {
            return Err(ItemError::ProviderFailure {
                paper_id,
                kind: other.kind(),
            })
        }
    };

    let text = match message.first_text().map(str::trim) {
        Some(text) if !text.is_empty() => text.to_string(),
        _ => return Err(ItemError::EmptyContent { paper_id }),
    };

    let Some(kind) = batch_type else {
        return Err(ItemError::UnknownBatchType {
            paper_id,
            batch_type: raw_batch_type.to_string(),
        });
    };

    let content = GeneratedContent::new(kind, text);
    match deps.papers.apply_generated(&paper_id, &content).await {
        Ok(true) => {}
        Ok(false) => {
            return Err(ItemError::WriteFailed {
                paper_id,
                reason: "no paper with this id".to_string(),
            })
        }
        Err(e) => {
            return Err(ItemError::WriteFailed {
                paper_id,
                reason: format!("{:#}", e),
            })
        }
    }

    debug!(paper_id = %paper_id, kind = %kind, "Applied generated content");

    revalidate_paper(&paper_id, deps).await;

    if kind == BatchType::Summary
        && generate_paper_embedding(&paper_id, &content.text, deps)
            .await
            .is_none()
    {
        return Err(ItemError::EmbeddingFailed { paper_id });
    }

    Ok(Applied { paper_id, kind })
}
