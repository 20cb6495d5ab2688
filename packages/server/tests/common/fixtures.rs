//! Test fixtures for creating test data.
//!
//! Papers and batch jobs are built with the model builders so the same
//! values work for the in-memory stores and for Postgres.

#![allow(dead_code)]

use anyhow::Result;
use chrono::{Duration, Utc};
use enrichment_core::domains::batches::{BatchJob, BatchStatus, BatchType};
use enrichment_core::domains::papers::Paper;
use sqlx::PgPool;

/// Install a test-writer subscriber once. Run with RUST_LOG=debug to see logs.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// A paper with every descriptive field set and a site route.
pub fn paper(id: &str) -> Paper {
    Paper::builder()
        .id(id)
        .slug(format!("paper-{}", id))
        .platform("arxiv")
        .title(format!("Paper {}", id))
        .authors(vec!["Ada Lovelace".to_string(), "Alan Turing".to_string()])
        .abstract_text(format!("Abstract of paper {}.", id))
        .categories(vec!["cs.LG".to_string()])
        .build()
}

/// A paper without slug/platform, so it has no page to revalidate.
pub fn paper_without_route(id: &str) -> Paper {
    Paper::builder()
        .id(id)
        .title(format!("Paper {}", id))
        .abstract_text(format!("Abstract of paper {}.", id))
        .build()
}

/// A job submitted `age` ago in the given status.
pub fn job_submitted_ago(
    batch_id: &str,
    kind: BatchType,
    status: BatchStatus,
    age: Duration,
) -> BatchJob {
    let submitted_at = Utc::now() - age;
    BatchJob::builder()
        .batch_id(batch_id)
        .batch_type(kind.to_string())
        .status(status)
        .submitted_at(submitted_at)
        .created_at(submitted_at)
        .build()
}

/// A freshly submitted job expecting `total` results.
pub fn fresh_job(batch_id: &str, kind: BatchType, total: i32) -> BatchJob {
    let mut job = BatchJob::submitted(batch_id, kind, total);
    job.submitted_at = Utc::now() - Duration::minutes(5);
    job
}

// =============================================================================
// Postgres helpers
// =============================================================================

/// Seed a paper row. The table is owned elsewhere in production.
pub async fn insert_paper(paper: &Paper, pool: &PgPool) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO "arxivPapersData" (id, slug, platform, title, authors, "abstract", "arxivCategories", "lastUpdated")
        VALUES ($1, $2, $3, $4, $5, $6, $7, NOW())
        "#,
    )
    .bind(&paper.id)
    .bind(&paper.slug)
    .bind(&paper.platform)
    .bind(&paper.title)
    .bind(&paper.authors)
    .bind(&paper.abstract_text)
    .bind(&paper.categories)
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn load_paper(id: &str, pool: &PgPool) -> Result<Option<Paper>> {
    let paper = sqlx::query_as::<_, Paper>(
        r#"
        SELECT id, slug, platform, title, authors, "abstract", "arxivCategories",
               "generatedOutline", "outlineGeneratedAt", "generatedSummary",
               "summaryGeneratedAt", "lastUpdated"
        FROM "arxivPapersData"
        WHERE id = $1
        "#,
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;

    Ok(paper)
}

pub async fn paper_has_embedding(id: &str, pool: &PgPool) -> Result<bool> {
    let has: Option<bool> =
        sqlx::query_scalar(r#"SELECT embedding IS NOT NULL FROM "arxivPapersData" WHERE id = $1"#)
            .bind(id)
            .fetch_optional(pool)
            .await?;

    Ok(has.unwrap_or(false))
}
