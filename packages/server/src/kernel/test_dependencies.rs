// TestDependencies - mock implementations for testing
//
// Provides mock services and in-memory stores that can be injected into
// ServerDeps for tests. Nothing here touches the network or a database.

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::StreamExt;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use anthropic_client::{
    BatchRequest, BatchResult, BatchResultItem, ContentBlock, MessageBatch, ProcessingStatus,
    RequestCounts, ResultMessage,
};

use super::{
    BaseBatchApi, BaseBatchJobStore, BaseEmbeddingService, BasePaperStore, BaseRevalidator,
    BatchResultItems, ServerDeps,
};
use crate::domains::batches::models::{BatchJob, BatchStatus, BatchType};
use crate::domains::papers::models::{
    EmbeddingSource, GeneratedContent, Paper, PaperPrompt, PaperRoute,
};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// =============================================================================
// Fixtures
// =============================================================================

/// Provider batch snapshot. Ended batches get a results URL.
pub fn batch_snapshot(
    batch_id: &str,
    status: ProcessingStatus,
    succeeded: u32,
    errored: u32,
) -> MessageBatch {
    let ended = matches!(status, ProcessingStatus::Ended | ProcessingStatus::Completed);

    MessageBatch {
        id: batch_id.to_string(),
        processing_status: status,
        request_counts: RequestCounts {
            succeeded,
            errored,
            ..Default::default()
        },
        created_at: Some(Utc::now()),
        ended_at: ended.then(Utc::now),
        expires_at: None,
        results_url: ended.then(|| format!("https://batches.test/{}/results", batch_id)),
    }
}

/// A successful result line carrying `text` as its first content block.
pub fn succeeded_result(custom_id: Option<&str>, text: &str) -> BatchResultItem {
    BatchResultItem {
        custom_id: custom_id.map(str::to_string),
        result: BatchResult::Succeeded {
            message: ResultMessage {
                content: vec![ContentBlock {
                    kind: Some("text".to_string()),
                    text: Some(text.to_string()),
                }],
            },
        },
    }
}

/// An errored result line.
pub fn errored_result(custom_id: &str) -> BatchResultItem {
    BatchResultItem {
        custom_id: Some(custom_id.to_string()),
        result: BatchResult::Errored {
            error: Some(serde_json::json!({"type": "overloaded_error"})),
        },
    }
}

// =============================================================================
// Mock Batch API
// =============================================================================

/// One scripted line of a results stream.
#[derive(Debug, Clone)]
pub enum MockResultLine {
    Item(BatchResultItem),
    /// The transport breaks at this point.
    Break(String),
}

pub struct MockBatchApi {
    batches: Arc<Mutex<HashMap<String, MessageBatch>>>,
    retrieve_errors: Arc<Mutex<HashMap<String, String>>>,
    results: Arc<Mutex<HashMap<String, Vec<MockResultLine>>>>,
    results_errors: Arc<Mutex<HashMap<String, String>>>,
    created: Arc<Mutex<Vec<Vec<BatchRequest>>>>,
    retrieve_calls: Arc<Mutex<Vec<String>>>,
    results_calls: Arc<Mutex<Vec<(String, Option<String>)>>>,
}

impl MockBatchApi {
    pub fn new() -> Self {
        Self {
            batches: Arc::new(Mutex::new(HashMap::new())),
            retrieve_errors: Arc::new(Mutex::new(HashMap::new())),
            results: Arc::new(Mutex::new(HashMap::new())),
            results_errors: Arc::new(Mutex::new(HashMap::new())),
            created: Arc::new(Mutex::new(Vec::new())),
            retrieve_calls: Arc::new(Mutex::new(Vec::new())),
            results_calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn with_batch(self, batch: MessageBatch) -> Self {
        self.set_batch(batch);
        self
    }

    /// Replace what `retrieve` reports for a batch (usable mid-test).
    pub fn set_batch(&self, batch: MessageBatch) {
        lock(&self.batches).insert(batch.id.clone(), batch);
    }

    pub fn with_retrieve_error(self, batch_id: &str, message: &str) -> Self {
        lock(&self.retrieve_errors).insert(batch_id.to_string(), message.to_string());
        self
    }

    pub fn with_results(self, batch_id: &str, items: Vec<BatchResultItem>) -> Self {
        self.set_results(batch_id, items);
        self
    }

    /// Replace the results stream of a batch (usable mid-test).
    pub fn set_results(&self, batch_id: &str, items: Vec<BatchResultItem>) {
        lock(&self.results).insert(
            batch_id.to_string(),
            items.into_iter().map(MockResultLine::Item).collect(),
        );
    }

    /// Results stream that yields `items` and then breaks.
    pub fn with_broken_results(
        self,
        batch_id: &str,
        items: Vec<BatchResultItem>,
        error: &str,
    ) -> Self {
        let mut lines: Vec<MockResultLine> = items.into_iter().map(MockResultLine::Item).collect();
        lines.push(MockResultLine::Break(error.to_string()));
        lock(&self.results).insert(batch_id.to_string(), lines);
        self
    }

    /// Opening the results stream fails.
    pub fn with_results_error(self, batch_id: &str, message: &str) -> Self {
        lock(&self.results_errors).insert(batch_id.to_string(), message.to_string());
        self
    }

    pub fn retrieve_calls(&self) -> Vec<String> {
        lock(&self.retrieve_calls).clone()
    }

    /// Batch ids whose results were requested.
    pub fn results_calls(&self) -> Vec<String> {
        lock(&self.results_calls).iter().map(|(id, _)| id.clone()).collect()
    }

    /// Results URL passed with each results request.
    pub fn results_urls(&self) -> Vec<Option<String>> {
        lock(&self.results_calls).iter().map(|(_, url)| url.clone()).collect()
    }

    /// Request lists passed to `create`, in call order.
    pub fn created_batches(&self) -> Vec<Vec<BatchRequest>> {
        lock(&self.created).clone()
    }
}

impl Default for MockBatchApi {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BaseBatchApi for MockBatchApi {
    async fn create(&self, requests: Vec<BatchRequest>) -> Result<MessageBatch> {
        let count = u32::try_from(requests.len())?;
        let mut created = lock(&self.created);
        created.push(requests);

        let mut batch = batch_snapshot(
            &format!("msgbatch_mock_{}", created.len()),
            ProcessingStatus::InProgress,
            0,
            0,
        );
        batch.request_counts.processing = count;
        lock(&self.batches).insert(batch.id.clone(), batch.clone());

        Ok(batch)
    }

    async fn retrieve(&self, batch_id: &str) -> Result<MessageBatch> {
        lock(&self.retrieve_calls).push(batch_id.to_string());

        if let Some(message) = lock(&self.retrieve_errors).get(batch_id) {
            bail!("{}", message);
        }

        lock(&self.batches)
            .get(batch_id)
            .cloned()
            .ok_or_else(|| anyhow!("batch {} not found", batch_id))
    }

    async fn results(&self, batch_id: &str, results_url: Option<&str>) -> Result<BatchResultItems> {
        lock(&self.results_calls).push((batch_id.to_string(), results_url.map(str::to_string)));

        if let Some(message) = lock(&self.results_errors).get(batch_id) {
            bail!("{}", message);
        }

        let lines = lock(&self.results).get(batch_id).cloned().unwrap_or_default();
        let items = lines.into_iter().map(|line| match line {
            MockResultLine::Item(item) => Ok(item),
            MockResultLine::Break(message) => Err(anyhow!(message)),
        });

        Ok(futures::stream::iter(items).boxed())
    }
}

// =============================================================================
// Mock Embedding Service
// =============================================================================

pub struct MockEmbeddingService {
    // Returns a fixed embedding vector for all inputs by default
    fixed_embedding: Vec<f32>,
    fail: bool,
    // Track all texts that embeddings were generated for
    calls: Arc<Mutex<Vec<String>>>,
}

impl MockEmbeddingService {
    pub fn new() -> Self {
        Self {
            fixed_embedding: vec![0.1; 1536],
            fail: false,
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn with_embedding(mut self, embedding: Vec<f32>) -> Self {
        self.fixed_embedding = embedding;
        self
    }

    /// Every call errors.
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::new()
        }
    }

    /// Get all texts that embeddings were generated for
    pub fn calls(&self) -> Vec<String> {
        lock(&self.calls).clone()
    }
}

impl Default for MockEmbeddingService {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BaseEmbeddingService for MockEmbeddingService {
    async fn generate(&self, text: &str) -> Result<Vec<f32>> {
        lock(&self.calls).push(text.to_string());

        if self.fail {
            bail!("embedding service unavailable");
        }
        Ok(self.fixed_embedding.clone())
    }
}

// =============================================================================
// Mock Revalidator
// =============================================================================

pub struct MockRevalidator {
    fail: bool,
    calls: Arc<Mutex<Vec<String>>>,
}

impl MockRevalidator {
    pub fn new() -> Self {
        Self {
            fail: false,
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::new()
        }
    }

    /// Paths that revalidation was requested for
    pub fn calls(&self) -> Vec<String> {
        lock(&self.calls).clone()
    }
}

impl Default for MockRevalidator {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BaseRevalidator for MockRevalidator {
    async fn revalidate(&self, path: &str) -> Result<bool> {
        lock(&self.calls).push(path.to_string());

        if self.fail {
            bail!("site returned 500");
        }
        Ok(true)
    }
}

// =============================================================================
// In-memory batch job store
// =============================================================================

/// Mirrors the Postgres store, including its refusal to overwrite terminal rows.
pub struct InMemoryBatchJobStore {
    jobs: Arc<Mutex<Vec<BatchJob>>>,
    saves: Arc<Mutex<Vec<(String, BatchStatus)>>>,
    failing_saves: Arc<Mutex<HashSet<String>>>,
    failing_statuses: Arc<Mutex<Vec<BatchStatus>>>,
}

impl InMemoryBatchJobStore {
    pub fn new() -> Self {
        Self {
            jobs: Arc::new(Mutex::new(Vec::new())),
            saves: Arc::new(Mutex::new(Vec::new())),
            failing_saves: Arc::new(Mutex::new(HashSet::new())),
            failing_statuses: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn with_job(self, job: BatchJob) -> Self {
        lock(&self.jobs).push(job);
        self
    }

    /// Every `save` for this batch errors.
    pub fn with_failing_saves(self, batch_id: &str) -> Self {
        lock(&self.failing_saves).insert(batch_id.to_string());
        self
    }

    /// Any `save` that would write `status` errors.
    pub fn with_failing_saves_to(self, status: BatchStatus) -> Self {
        lock(&self.failing_statuses).push(status);
        self
    }

    pub fn get(&self, batch_id: &str) -> Option<BatchJob> {
        lock(&self.jobs).iter().find(|j| j.batch_id == batch_id).cloned()
    }

    pub fn jobs(&self) -> Vec<BatchJob> {
        lock(&self.jobs).clone()
    }

    /// Statuses written by successful saves of one batch, in order.
    pub fn saved_statuses(&self, batch_id: &str) -> Vec<BatchStatus> {
        lock(&self.saves)
            .iter()
            .filter(|(id, _)| id == batch_id)
            .map(|(_, status)| *status)
            .collect()
    }
}

impl Default for InMemoryBatchJobStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BaseBatchJobStore for InMemoryBatchJobStore {
    async fn insert(&self, job: &BatchJob) -> Result<()> {
        let mut jobs = lock(&self.jobs);
        if jobs.iter().any(|j| j.batch_id == job.batch_id) {
            bail!("duplicate batch_id {}", job.batch_id);
        }
        jobs.push(job.clone());
        Ok(())
    }

    async fn find_by_batch_id(&self, batch_id: &str) -> Result<Option<BatchJob>> {
        Ok(self.get(batch_id))
    }

    async fn find_pollable(&self, since: DateTime<Utc>, limit: i64) -> Result<Vec<BatchJob>> {
        let mut jobs: Vec<BatchJob> = lock(&self.jobs)
            .iter()
            .filter(|j| j.status.is_pollable() && j.submitted_at >= since)
            .cloned()
            .collect();
        jobs.sort_by_key(|j| j.submitted_at);
        jobs.truncate(usize::try_from(limit).unwrap_or(0));
        Ok(jobs)
    }

    async fn expire_stale(&self, before: DateTime<Utc>, message: &str) -> Result<u64> {
        let mut expired = 0;
        for job in lock(&self.jobs)
            .iter_mut()
            .filter(|j| j.status.is_pollable() && j.submitted_at < before)
        {
            job.status = BatchStatus::Expired;
            job.error_message.get_or_insert_with(|| message.to_string());
            job.updated_at = Utc::now();
            expired += 1;
        }
        Ok(expired)
    }

    async fn save(&self, job: &BatchJob) -> Result<()> {
        if lock(&self.failing_saves).contains(&job.batch_id) {
            bail!("connection reset while saving {}", job.batch_id);
        }
        if lock(&self.failing_statuses).contains(&job.status) {
            bail!("connection reset while saving {} as {}", job.batch_id, job.status);
        }

        let mut jobs = lock(&self.jobs);
        let stored = jobs
            .iter_mut()
            .find(|j| j.id == job.id && !j.status.is_terminal())
            .ok_or_else(|| anyhow!("batch job {} is missing or already terminal", job.batch_id))?;

        *stored = job.clone();
        stored.updated_at = Utc::now();
        lock(&self.saves).push((job.batch_id.clone(), job.status));
        Ok(())
    }

    async fn list_recent(&self, limit: i64) -> Result<Vec<BatchJob>> {
        let mut jobs = self.jobs();
        jobs.sort_by(|a, b| b.submitted_at.cmp(&a.submitted_at));
        jobs.truncate(usize::try_from(limit).unwrap_or(0));
        Ok(jobs)
    }
}

// =============================================================================
// In-memory paper store
// =============================================================================

pub struct InMemoryPaperStore {
    papers: Arc<Mutex<HashMap<String, Paper>>>,
    embeddings: Arc<Mutex<HashMap<String, Vec<f32>>>>,
    failing_writes: Arc<Mutex<HashSet<String>>>,
}

impl InMemoryPaperStore {
    pub fn new() -> Self {
        Self {
            papers: Arc::new(Mutex::new(HashMap::new())),
            embeddings: Arc::new(Mutex::new(HashMap::new())),
            failing_writes: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    pub fn with_paper(self, paper: Paper) -> Self {
        lock(&self.papers).insert(paper.id.clone(), paper);
        self
    }

    /// Writes of generated content to this paper error.
    pub fn with_failing_writes(self, paper_id: &str) -> Self {
        lock(&self.failing_writes).insert(paper_id.to_string());
        self
    }

    pub fn get(&self, paper_id: &str) -> Option<Paper> {
        lock(&self.papers).get(paper_id).cloned()
    }

    pub fn embedding(&self, paper_id: &str) -> Option<Vec<f32>> {
        lock(&self.embeddings).get(paper_id).cloned()
    }
}

impl Default for InMemoryPaperStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BasePaperStore for InMemoryPaperStore {
    async fn apply_generated(&self, paper_id: &str, content: &GeneratedContent) -> Result<bool> {
        if lock(&self.failing_writes).contains(paper_id) {
            bail!("write to paper {} rejected", paper_id);
        }

        let mut papers = lock(&self.papers);
        let Some(paper) = papers.get_mut(paper_id) else {
            return Ok(false);
        };

        match content.kind {
            BatchType::Outline => {
                paper.generated_outline = Some(content.text.clone());
                paper.outline_generated_at = Some(content.generated_at);
            }
            BatchType::Summary => {
                paper.generated_summary = Some(content.text.clone());
                paper.summary_generated_at = Some(content.generated_at);
            }
        }
        paper.last_updated = Some(content.generated_at);
        Ok(true)
    }

    async fn find_embedding_source(&self, paper_id: &str) -> Result<Option<EmbeddingSource>> {
        Ok(lock(&self.papers).get(paper_id).map(EmbeddingSource::from))
    }

    async fn set_embedding(&self, paper_id: &str, embedding: &[f32]) -> Result<()> {
        let mut papers = lock(&self.papers);
        let paper = papers
            .get_mut(paper_id)
            .ok_or_else(|| anyhow!("paper {} not found", paper_id))?;
        paper.last_updated = Some(Utc::now());
        lock(&self.embeddings).insert(paper_id.to_string(), embedding.to_vec());
        Ok(())
    }

    async fn find_route(&self, paper_id: &str) -> Result<Option<PaperRoute>> {
        Ok(lock(&self.papers).get(paper_id).and_then(|p| {
            Some(PaperRoute {
                slug: p.slug.clone()?,
                platform: p.platform.clone()?,
            })
        }))
    }

    async fn find_missing_generated(&self, kind: BatchType, limit: i64) -> Result<Vec<PaperPrompt>> {
        let mut prompts: Vec<PaperPrompt> = lock(&self.papers)
            .values()
            .filter(|p| p.abstract_text.is_some())
            .filter(|p| match kind {
                BatchType::Outline => p.generated_outline.is_none(),
                BatchType::Summary => p.generated_summary.is_none(),
            })
            .map(|p| PaperPrompt {
                id: p.id.clone(),
                title: p.title.clone(),
                abstract_text: p.abstract_text.clone(),
            })
            .collect();
        prompts.sort_by(|a, b| a.id.cmp(&b.id));
        prompts.truncate(usize::try_from(limit).unwrap_or(0));
        Ok(prompts)
    }
}

// =============================================================================
// TestDependencies - Builder for test dependencies
// =============================================================================

#[derive(Clone)]
pub struct TestDependencies {
    pub batch_api: Arc<MockBatchApi>,
    pub embedding_service: Arc<MockEmbeddingService>,
    pub revalidator: Option<Arc<MockRevalidator>>,
    pub batch_jobs: Arc<InMemoryBatchJobStore>,
    pub papers: Arc<InMemoryPaperStore>,
}

impl TestDependencies {
    pub fn new() -> Self {
        Self {
            batch_api: Arc::new(MockBatchApi::new()),
            embedding_service: Arc::new(MockEmbeddingService::new()),
            revalidator: Some(Arc::new(MockRevalidator::new())),
            batch_jobs: Arc::new(InMemoryBatchJobStore::new()),
            papers: Arc::new(InMemoryPaperStore::new()),
        }
    }

    pub fn mock_batch_api(mut self, api: MockBatchApi) -> Self {
        self.batch_api = Arc::new(api);
        self
    }

    pub fn mock_embeddings(mut self, service: MockEmbeddingService) -> Self {
        self.embedding_service = Arc::new(service);
        self
    }

    pub fn mock_revalidator(mut self, revalidator: MockRevalidator) -> Self {
        self.revalidator = Some(Arc::new(revalidator));
        self
    }

    /// Run without a revalidation step
    pub fn without_revalidator(mut self) -> Self {
        self.revalidator = None;
        self
    }

    pub fn batch_jobs(mut self, store: InMemoryBatchJobStore) -> Self {
        self.batch_jobs = Arc::new(store);
        self
    }

    pub fn papers(mut self, store: InMemoryPaperStore) -> Self {
        self.papers = Arc::new(store);
        self
    }

    /// Build ServerDeps sharing these mocks, so tests can inspect them afterwards
    pub fn server_deps(&self) -> Arc<ServerDeps> {
        Arc::new(ServerDeps::new(
            self.batch_jobs.clone(),
            self.papers.clone(),
            self.batch_api.clone(),
            self.embedding_service.clone(),
            self.revalidator
                .clone()
                .map(|r| r as Arc<dyn BaseRevalidator>),
            "claude-test",
        ))
    }
}

impl Default for TestDependencies {
    fn default() -> Self {
        Self::new()
    }
}
