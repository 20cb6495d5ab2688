// Trait definitions for dependency injection
//
// These are INFRASTRUCTURE traits only - no business logic.
// Business logic (polling, applying results) lives in domain activities that use these traits.
//
// Naming convention: Base* for trait names (e.g., BaseBatchApi, BaseEmbeddingService)

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::stream::BoxStream;

use anthropic_client::{BatchRequest, BatchResultItem, MessageBatch};

use crate::domains::batches::models::{BatchJob, BatchType};
use crate::domains::papers::models::{EmbeddingSource, GeneratedContent, PaperPrompt, PaperRoute};

/// Result lines of an ended batch. An `Err` item means the transport broke mid-stream.
pub type BatchResultItems = BoxStream<'static, Result<BatchResultItem>>;

// =============================================================================
// Batch Generation Provider Trait (Infrastructure)
// =============================================================================

#[async_trait]
pub trait BaseBatchApi: Send + Sync {
    /// Submit a batch of generation requests
    async fn create(&self, requests: Vec<BatchRequest>) -> Result<MessageBatch>;

    /// Current provider-side status of a batch
    async fn retrieve(&self, batch_id: &str) -> Result<MessageBatch>;

    /// Stream per-item results of an ended batch (order not guaranteed).
    /// `results_url` is the location from the last retrieve, when known.
    async fn results(&self, batch_id: &str, results_url: Option<&str>) -> Result<BatchResultItems>;
}

// =============================================================================
// Embedding Service Trait (Infrastructure)
// =============================================================================

#[async_trait]
pub trait BaseEmbeddingService: Send + Sync {
    /// Generate embedding for text (returns 1536-dimensional vector)
    async fn generate(&self, text: &str) -> Result<Vec<f32>>;
}

// =============================================================================
// Revalidation Trait (Infrastructure - front-end cache invalidation)
// =============================================================================

#[async_trait]
pub trait BaseRevalidator: Send + Sync {
    /// Ask the site to rebuild a page path. Returns whether it revalidated.
    async fn revalidate(&self, path: &str) -> Result<bool>;
}

// =============================================================================
// Storage Traits (Infrastructure)
// =============================================================================

#[async_trait]
pub trait BaseBatchJobStore: Send + Sync {
    async fn insert(&self, job: &BatchJob) -> Result<()>;

    async fn find_by_batch_id(&self, batch_id: &str) -> Result<Option<BatchJob>>;

    /// Pollable jobs submitted at or after `since`, oldest first, at most `limit`
    async fn find_pollable(&self, since: DateTime<Utc>, limit: i64) -> Result<Vec<BatchJob>>;

    /// Expire pollable jobs submitted before `before`, returning how many were expired
    async fn expire_stale(&self, before: DateTime<Utc>, message: &str) -> Result<u64>;

    /// Persist every mutable field. Fails if the stored row is already terminal.
    async fn save(&self, job: &BatchJob) -> Result<()>;

    async fn list_recent(&self, limit: i64) -> Result<Vec<BatchJob>>;
}

#[async_trait]
pub trait BasePaperStore: Send + Sync {
    /// Write generated text onto a paper. Returns false when the paper does not exist.
    async fn apply_generated(&self, paper_id: &str, content: &GeneratedContent) -> Result<bool>;

    async fn find_embedding_source(&self, paper_id: &str) -> Result<Option<EmbeddingSource>>;

    async fn set_embedding(&self, paper_id: &str, embedding: &[f32]) -> Result<()>;

    async fn find_route(&self, paper_id: &str) -> Result<Option<PaperRoute>>;

    async fn find_missing_generated(&self, kind: BatchType, limit: i64) -> Result<Vec<PaperPrompt>>;
}
