//! Batch job model - one row per batch submitted to the generation provider.

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use typed_builder::TypedBuilder;
use uuid::Uuid;

use crate::common::utils::truncate_chars;
use crate::kernel::BaseBatchJobStore;

/// Upper bound for `error_message`, in characters.
pub const ERROR_MESSAGE_MAX_CHARS: usize = 1000;

// ============================================================================
// Enums
// ============================================================================

/// Local lifecycle of a batch job.
///
/// ```text
/// submitted → polling → completed → processing_results → processed | processed_with_errors
///        ↘ failed / expired / canceled / canceling
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type, Default)]
#[sqlx(type_name = "batch_job_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum BatchStatus {
    #[default]
    Submitted,
    Polling,
    Completed,
    ProcessingResults,
    Processed,
    ProcessedWithErrors,
    Failed,
    Expired,
    Canceled,
    Canceling,
}

impl BatchStatus {
    pub const ALL: [BatchStatus; 10] = [
        BatchStatus::Submitted,
        BatchStatus::Polling,
        BatchStatus::Completed,
        BatchStatus::ProcessingResults,
        BatchStatus::Processed,
        BatchStatus::ProcessedWithErrors,
        BatchStatus::Failed,
        BatchStatus::Expired,
        BatchStatus::Canceled,
        BatchStatus::Canceling,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            BatchStatus::Submitted => "submitted",
            BatchStatus::Polling => "polling",
            BatchStatus::Completed => "completed",
            BatchStatus::ProcessingResults => "processing_results",
            BatchStatus::Processed => "processed",
            BatchStatus::ProcessedWithErrors => "processed_with_errors",
            BatchStatus::Failed => "failed",
            BatchStatus::Expired => "expired",
            BatchStatus::Canceled => "canceled",
            BatchStatus::Canceling => "canceling",
        }
    }

    /// Terminal jobs are never selected or rewritten again.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            BatchStatus::Processed
                | BatchStatus::ProcessedWithErrors
                | BatchStatus::Failed
                | BatchStatus::Expired
                | BatchStatus::Canceled
        )
    }

    /// Statuses the poller selects each cycle.
    pub fn is_pollable(&self) -> bool {
        matches!(
            self,
            BatchStatus::Submitted | BatchStatus::Polling | BatchStatus::Completed
        )
    }

    /// Whether the provider has already finished this batch from our point of view.
    pub fn is_at_or_past_completed(&self) -> bool {
        matches!(
            self,
            BatchStatus::Completed
                | BatchStatus::ProcessingResults
                | BatchStatus::Processed
                | BatchStatus::ProcessedWithErrors
        )
    }

    /// Edges of the lifecycle graph.
    pub fn can_transition_to(&self, next: BatchStatus) -> bool {
        use BatchStatus::*;

        match self {
            Submitted => matches!(next, Polling | Failed | Expired | Canceled | Canceling),
            Polling => matches!(
                next,
                Polling | Completed | Failed | Expired | Canceled | Canceling
            ),
            Completed => matches!(next, Completed | ProcessingResults | Failed | Expired),
            ProcessingResults => matches!(next, Processed | ProcessedWithErrors | Failed),
            Canceling => matches!(next, Canceling | Canceled | Completed | Failed | Expired),
            Processed | ProcessedWithErrors | Failed | Expired | Canceled => false,
        }
    }
}

impl std::fmt::Display for BatchStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for BatchStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        BatchStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| anyhow!("Invalid batch status: {}", s))
    }
}

/// What a batch generates for each paper.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchType {
    Outline,
    Summary,
}

impl std::fmt::Display for BatchType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BatchType::Outline => write!(f, "outline"),
            BatchType::Summary => write!(f, "summary"),
        }
    }
}

impl std::str::FromStr for BatchType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "outline" => Ok(BatchType::Outline),
            "summary" => Ok(BatchType::Summary),
            _ => Err(anyhow!("Invalid batch type: {}", s)),
        }
    }
}

// ============================================================================
// Model
// ============================================================================

#[derive(FromRow, Debug, Clone, Serialize, Deserialize, TypedBuilder)]
#[builder(field_defaults(setter(into)))]
pub struct BatchJob {
    #[builder(default = Uuid::now_v7())]
    pub id: Uuid,

    // Provider identity
    pub batch_id: String,
    /// Stored as text; parsed into [`BatchType`] when results are applied.
    pub batch_type: String,

    #[builder(default)]
    pub status: BatchStatus,

    // Lifecycle timestamps
    #[builder(default = Utc::now())]
    pub submitted_at: DateTime<Utc>,
    #[builder(default, setter(strip_option))]
    pub last_polled_at: Option<DateTime<Utc>>,
    #[builder(default, setter(strip_option))]
    pub completed_at: Option<DateTime<Utc>>,
    #[builder(default, setter(strip_option))]
    pub processed_at: Option<DateTime<Utc>>,

    // Tallies, overwritten on every poll/process pass
    #[builder(default = 0)]
    pub succeeded_count: i32,
    #[builder(default = 0)]
    pub failed_count: i32,
    #[builder(default, setter(strip_option))]
    pub total_requests: Option<i32>,

    #[builder(default, setter(strip_option))]
    pub results_url: Option<String>,
    #[builder(default, setter(strip_option))]
    pub error_message: Option<String>,

    #[builder(default = Utc::now())]
    pub created_at: DateTime<Utc>,
    #[builder(default = Utc::now())]
    pub updated_at: DateTime<Utc>,
}

impl BatchJob {
    /// Local record for a freshly submitted batch.
    pub fn submitted(batch_id: impl Into<String>, batch_type: BatchType, total_requests: i32) -> Self {
        Self::builder()
            .batch_id(batch_id.into())
            .batch_type(batch_type.to_string())
            .total_requests(total_requests)
            .build()
    }

    /// Move along the lifecycle graph, refusing any other edge.
    pub fn advance(&mut self, next: BatchStatus) -> Result<()> {
        if !self.status.can_transition_to(next) {
            bail!(
                "illegal status transition for batch {}: {} -> {}",
                self.batch_id,
                self.status,
                next
            );
        }
        self.status = next;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Mark the job failed with a bounded diagnostic.
    pub fn fail(&mut self, message: &str) -> Result<()> {
        self.advance(BatchStatus::Failed)?;
        self.error_message = Some(truncate_chars(message, ERROR_MESSAGE_MAX_CHARS));
        Ok(())
    }

    /// Keep the first diagnostic; later ones are dropped.
    pub fn record_error_if_missing(&mut self, message: &str) {
        if self.error_message.is_none() {
            self.error_message = Some(truncate_chars(message, ERROR_MESSAGE_MAX_CHARS));
        }
    }

    pub fn parsed_type(&self) -> Result<BatchType> {
        self.batch_type.parse()
    }

    // =========================================================================
    // SQL Queries
    // =========================================================================

    pub async fn insert(&self, pool: &PgPool) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO batch_jobs (
                id, batch_id, batch_type, status, submitted_at, last_polled_at,
                completed_at, processed_at, succeeded_count, failed_count,
                total_requests, results_url, error_message, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
            "#,
        )
        .bind(self.id)
        .bind(&self.batch_id)
        .bind(&self.batch_type)
        .bind(self.status)
        .bind(self.submitted_at)
        .bind(self.last_polled_at)
        .bind(self.completed_at)
        .bind(self.processed_at)
        .bind(self.succeeded_count)
        .bind(self.failed_count)
        .bind(self.total_requests)
        .bind(&self.results_url)
        .bind(&self.error_message)
        .bind(self.created_at)
        .bind(self.updated_at)
        .execute(pool)
        .await?;

        Ok(())
    }

    pub async fn find_by_batch_id(batch_id: &str, pool: &PgPool) -> Result<Option<Self>> {
        let job = sqlx::query_as::<_, Self>("SELECT * FROM batch_jobs WHERE batch_id = $1")
            .bind(batch_id)
            .fetch_optional(pool)
            .await?;

        Ok(job)
    }

    /// Pollable jobs submitted at or after `since`, oldest first.
    pub async fn find_pollable(since: DateTime<Utc>, limit: i64, pool: &PgPool) -> Result<Vec<Self>> {
        let jobs = sqlx::query_as::<_, Self>(
            r#"
            SELECT * FROM batch_jobs
            WHERE status IN ('submitted', 'polling', 'completed')
              AND submitted_at >= $1
            ORDER BY submitted_at ASC
            LIMIT $2
            "#,
        )
        .bind(since)
        .bind(limit)
        .fetch_all(pool)
        .await?;

        Ok(jobs)
    }

    /// Expire pollable jobs submitted before `before`. Returns rows affected.
    pub async fn expire_stale(before: DateTime<Utc>, message: &str, pool: &PgPool) -> Result<u64> {
        let result = sqlx::query(
            r#"
            UPDATE batch_jobs
            SET status = 'expired',
                error_message = COALESCE(error_message, $2),
                updated_at = NOW()
            WHERE status IN ('submitted', 'polling', 'completed')
              AND submitted_at < $1
            "#,
        )
        .bind(before)
        .bind(truncate_chars(message, ERROR_MESSAGE_MAX_CHARS))
        .execute(pool)
        .await?;

        Ok(result.rows_affected())
    }

    /// Persist every mutable column. Rows already terminal are left alone.
    pub async fn update(&self, pool: &PgPool) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE batch_jobs
            SET status = $2,
                last_polled_at = $3,
                completed_at = $4,
                processed_at = $5,
                succeeded_count = $6,
                failed_count = $7,
                results_url = $8,
                error_message = $9,
                updated_at = NOW()
            WHERE id = $1
              AND status NOT IN ('processed', 'processed_with_errors', 'failed', 'expired', 'canceled')
            "#,
        )
        .bind(self.id)
        .bind(self.status)
        .bind(self.last_polled_at)
        .bind(self.completed_at)
        .bind(self.processed_at)
        .bind(self.succeeded_count)
        .bind(self.failed_count)
        .bind(&self.results_url)
        .bind(&self.error_message)
        .execute(pool)
        .await?;

        if result.rows_affected() == 0 {
            bail!("batch job {} is missing or already terminal", self.batch_id);
        }

        Ok(())
    }

    pub async fn list_recent(limit: i64, pool: &PgPool) -> Result<Vec<Self>> {
        let jobs = sqlx::query_as::<_, Self>(
            "SELECT * FROM batch_jobs ORDER BY submitted_at DESC LIMIT $1",
        )
        .bind(limit)
        .fetch_all(pool)
        .await?;

        Ok(jobs)
    }
}

// ============================================================================
// Store
// ============================================================================

/// Postgres-backed [`BaseBatchJobStore`].
#[derive(Clone)]
pub struct PostgresBatchJobStore {
    pool: PgPool,
}

impl PostgresBatchJobStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl BaseBatchJobStore for PostgresBatchJobStore {
    async fn insert(&self, job: &BatchJob) -> Result<()> {
        job.insert(&self.pool).await
    }

    async fn find_by_batch_id(&self, batch_id: &str) -> Result<Option<BatchJob>> {
        BatchJob::find_by_batch_id(batch_id, &self.pool).await
    }

    async fn find_pollable(&self, since: DateTime<Utc>, limit: i64) -> Result<Vec<BatchJob>> {
        BatchJob::find_pollable(since, limit, &self.pool).await
    }

    async fn expire_stale(&self, before: DateTime<Utc>, message: &str) -> Result<u64> {
        BatchJob::expire_stale(before, message, &self.pool).await
    }

    async fn save(&self, job: &BatchJob) -> Result<()> {
        job.update(&self.pool).await
    }

    async fn list_recent(&self, limit: i64) -> Result<Vec<BatchJob>> {
        BatchJob::list_recent(limit, &self.pool).await
    }
}
