//! Server dependencies for activities (using traits for testability)
//!
//! This module provides the central dependency container used by the batch
//! tracker. All external services and both tables sit behind trait objects.

use anyhow::Result;
use async_trait::async_trait;
use futures::{StreamExt, TryStreamExt};
use sqlx::PgPool;
use std::sync::Arc;

use anthropic_client::{AnthropicClient, BatchRequest, MessageBatch};
use openai_client::OpenAIClient;

use crate::domains::batches::models::PostgresBatchJobStore;
use crate::domains::papers::models::PostgresPaperStore;
use crate::kernel::{
    BaseBatchApi, BaseBatchJobStore, BaseEmbeddingService, BasePaperStore, BaseRevalidator,
    BatchResultItems,
};

// =============================================================================
// AnthropicClient Adapter (implements BaseBatchApi trait)
// =============================================================================

/// Wrapper around AnthropicClient that implements BaseBatchApi trait
pub struct AnthropicBatchAdapter(pub Arc<AnthropicClient>);

impl AnthropicBatchAdapter {
    pub fn new(client: Arc<AnthropicClient>) -> Self {
        Self(client)
    }
}

#[async_trait]
impl BaseBatchApi for AnthropicBatchAdapter {
    async fn create(&self, requests: Vec<BatchRequest>) -> Result<MessageBatch> {
        Ok(self.0.create_batch(requests).await?)
    }

    async fn retrieve(&self, batch_id: &str) -> Result<MessageBatch> {
        Ok(self.0.retrieve_batch(batch_id).await?)
    }

    async fn results(&self, batch_id: &str, results_url: Option<&str>) -> Result<BatchResultItems> {
        let stream = match results_url {
            Some(url) => self.0.stream_results_url(url).await?,
            None => self.0.batch_results(batch_id).await?,
        };
        Ok(stream.map_err(anyhow::Error::from).boxed())
    }
}

// =============================================================================
// OpenAIClient Adapter (implements BaseEmbeddingService trait)
// =============================================================================

/// Wrapper around OpenAIClient bound to one embedding model
pub struct OpenAiEmbeddingAdapter {
    client: Arc<OpenAIClient>,
    model: String,
}

impl OpenAiEmbeddingAdapter {
    pub fn new(client: Arc<OpenAIClient>, model: impl Into<String>) -> Self {
        Self {
            client,
            model: model.into(),
        }
    }
}

#[async_trait]
impl BaseEmbeddingService for OpenAiEmbeddingAdapter {
    async fn generate(&self, text: &str) -> Result<Vec<f32>> {
        Ok(self.client.create_embedding(text, &self.model).await?)
    }
}

// =============================================================================
// ServerDeps
// =============================================================================

/// Server dependencies accessible to activities (using traits for testability)
#[derive(Clone)]
pub struct ServerDeps {
    pub batch_jobs: Arc<dyn BaseBatchJobStore>,
    pub papers: Arc<dyn BasePaperStore>,
    pub batch_api: Arc<dyn BaseBatchApi>,
    pub embedding_service: Arc<dyn BaseEmbeddingService>,
    /// Site cache invalidation; `None` disables the revalidation step
    pub revalidator: Option<Arc<dyn BaseRevalidator>>,
    /// Model used when submitting new generation batches
    pub generation_model: String,
}

impl ServerDeps {
    /// Create new ServerDeps with the given dependencies
    pub fn new(
        batch_jobs: Arc<dyn BaseBatchJobStore>,
        papers: Arc<dyn BasePaperStore>,
        batch_api: Arc<dyn BaseBatchApi>,
        embedding_service: Arc<dyn BaseEmbeddingService>,
        revalidator: Option<Arc<dyn BaseRevalidator>>,
        generation_model: impl Into<String>,
    ) -> Self {
        Self {
            batch_jobs,
            papers,
            batch_api,
            embedding_service,
            revalidator,
            generation_model: generation_model.into(),
        }
    }

    /// Postgres-backed stores with the given external services
    pub fn with_postgres(
        pool: PgPool,
        batch_api: Arc<dyn BaseBatchApi>,
        embedding_service: Arc<dyn BaseEmbeddingService>,
        revalidator: Option<Arc<dyn BaseRevalidator>>,
        generation_model: impl Into<String>,
    ) -> Self {
        Self::new(
            Arc::new(PostgresBatchJobStore::new(pool.clone())),
            Arc::new(PostgresPaperStore::new(pool)),
            batch_api,
            embedding_service,
            revalidator,
            generation_model,
        )
    }
}
