//! Submitting generation batches for papers that lack an outline or summary.

use anthropic_client::{BatchRequest, MessageParams};
use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::domains::batches::models::{BatchJob, BatchType};
use crate::domains::papers::models::PaperPrompt;
use crate::kernel::ServerDeps;

const OUTLINE_MAX_TOKENS: u32 = 2048;
const SUMMARY_MAX_TOKENS: u32 = 1024;

const OUTLINE_SYSTEM: &str = "You write structured outlines of research papers for a general \
technical audience. Respond in Markdown with headings and bullet points only.";

const SUMMARY_SYSTEM: &str = "You write plain-language summaries of research papers. \
Respond with two or three short paragraphs and no headings.";

/// User prompt for one paper.
pub fn build_prompt(kind: BatchType, paper: &PaperPrompt) -> String {
    let title = paper.title.as_deref().unwrap_or("Untitled").trim();
    let abstract_text = paper.abstract_text.as_deref().unwrap_or_default().trim();

    let task = match kind {
        BatchType::Outline => "Write an outline of the following paper.",
        BatchType::Summary => "Summarize the following paper.",
    };

    format!("{}\n\nTitle: {}\n\nAbstract:\n{}", task, title, abstract_text)
}

/// One provider request per paper, keyed by paper id.
pub fn build_requests(kind: BatchType, papers: &[PaperPrompt], model: &str) -> Vec<BatchRequest> {
    let (system, max_tokens) = match kind {
        BatchType::Outline => (OUTLINE_SYSTEM, OUTLINE_MAX_TOKENS),
        BatchType::Summary => (SUMMARY_SYSTEM, SUMMARY_MAX_TOKENS),
    };

    papers
        .iter()
        .map(|paper| BatchRequest {
            custom_id: paper.id.clone(),
            params: MessageParams::single_turn(model, max_tokens, build_prompt(kind, paper))
                .with_system(system),
        })
        .collect()
}

/// Submit one batch for up to `limit` papers missing `kind` content and
/// record it as `submitted`. Returns `None` when nothing needs generating.
pub async fn submit_batch(kind: BatchType, limit: i64, deps: &ServerDeps) -> Result<Option<BatchJob>> {
    let papers = deps
        .papers
        .find_missing_generated(kind, limit)
        .await
        .context("Failed to load papers for submission")?;

    if papers.is_empty() {
        info!(batch_type = %kind, "No papers need generation");
        return Ok(None);
    }

    let requests = build_requests(kind, &papers, &deps.generation_model);
    let total = i32::try_from(requests.len()).context("Too many requests for one batch")?;

    let batch = deps
        .batch_api
        .create(requests)
        .await
        .with_context(|| format!("Failed to create {} batch", kind))?;

    let job = BatchJob::submitted(batch.id, kind, total);
    if let Err(e) = deps.batch_jobs.insert(&job).await {
        // The provider batch exists but nothing will poll it.
        warn!(batch_id = %job.batch_id, error = %e, "Submitted batch could not be recorded");
        return Err(e.context(format!("Failed to record batch {}", job.batch_id)));
    }

    info!(
        batch_id = %job.batch_id,
        batch_type = %kind,
        total_requests = total,
        "Submitted generation batch"
    );

    Ok(Some(job))
}
