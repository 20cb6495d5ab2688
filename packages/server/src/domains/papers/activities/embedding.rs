//! Embedding generation for freshly summarized papers.

use anyhow::{anyhow, bail, Result};
use openai_client::truncate_to_char_boundary;
use tracing::{debug, warn};

use crate::kernel::ServerDeps;

/// Embedding input is cut to this many bytes (at a char boundary).
pub const MAX_EMBEDDING_INPUT_BYTES: usize = 8000;

/// Re-fetch the paper's descriptive fields, embed them together with the new
/// summary and store the vector.
///
/// Never fails: any problem is logged and reported as `None`.
pub async fn generate_paper_embedding(
    paper_id: &str,
    summary: &str,
    deps: &ServerDeps,
) -> Option<Vec<f32>> {
    match try_generate(paper_id, summary, deps).await {
        Ok(embedding) => {
            debug!(paper_id = %paper_id, dimensions = embedding.len(), "Stored paper embedding");
            Some(embedding)
        }
        Err(e) => {
            warn!(paper_id = %paper_id, error = %e, "Embedding generation failed");
            None
        }
    }
}

async fn try_generate(paper_id: &str, summary: &str, deps: &ServerDeps) -> Result<Vec<f32>> {
    let source = deps
        .papers
        .find_embedding_source(paper_id)
        .await?
        .ok_or_else(|| anyhow!("paper {} not found", paper_id))?;

    let text = source.embedding_text(summary);
    if text.is_empty() {
        bail!("no text to embed for paper {}", paper_id);
    }

    let input = truncate_to_char_boundary(&text, MAX_EMBEDDING_INPUT_BYTES);
    let embedding = deps.embedding_service.generate(input).await?;
    if embedding.is_empty() {
        bail!("embedding service returned an empty vector");
    }

    deps.papers.set_embedding(paper_id, &embedding).await?;

    Ok(embedding)
}
