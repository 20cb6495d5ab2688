use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use pgvector::Vector;
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use typed_builder::TypedBuilder;

use crate::domains::batches::models::BatchType;
use crate::kernel::BasePaperStore;

/// Paper row in `"arxivPapersData"`. The table belongs to the site; this crate
/// only touches the generated-content slice of it.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow, TypedBuilder)]
#[builder(field_defaults(setter(into)))]
pub struct Paper {
    pub id: String,
    #[builder(default, setter(strip_option))]
    pub slug: Option<String>,
    #[builder(default, setter(strip_option))]
    pub platform: Option<String>,
    #[builder(default, setter(strip_option))]
    pub title: Option<String>,
    #[builder(default, setter(strip_option))]
    pub authors: Option<Vec<String>>,
    #[builder(default, setter(strip_option))]
    #[sqlx(rename = "abstract")]
    #[serde(rename = "abstract")]
    pub abstract_text: Option<String>,
    #[builder(default, setter(strip_option))]
    #[sqlx(rename = "arxivCategories")]
    pub categories: Option<Vec<String>>,
    #[builder(default, setter(strip_option))]
    #[sqlx(rename = "generatedOutline")]
    pub generated_outline: Option<String>,
    #[builder(default, setter(strip_option))]
    #[sqlx(rename = "outlineGeneratedAt")]
    pub outline_generated_at: Option<DateTime<Utc>>,
    #[builder(default, setter(strip_option))]
    #[sqlx(rename = "generatedSummary")]
    pub generated_summary: Option<String>,
    #[builder(default, setter(strip_option))]
    #[sqlx(rename = "summaryGeneratedAt")]
    pub summary_generated_at: Option<DateTime<Utc>>,
    #[builder(default, setter(strip_option))]
    #[sqlx(rename = "lastUpdated")]
    pub last_updated: Option<DateTime<Utc>>,
}

/// Text produced by a batch item, ready to be written onto a paper.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedContent {
    pub kind: BatchType,
    pub text: String,
    pub generated_at: DateTime<Utc>,
}

impl GeneratedContent {
    pub fn new(kind: BatchType, text: impl Into<String>) -> Self {
        Self {
            kind,
            text: text.into(),
            generated_at: Utc::now(),
        }
    }
}

/// Descriptive fields concatenated into the embedding input.
#[derive(Debug, Clone, Default, sqlx::FromRow)]
pub struct EmbeddingSource {
    pub title: Option<String>,
    pub authors: Option<Vec<String>>,
    #[sqlx(rename = "abstract")]
    pub abstract_text: Option<String>,
    #[sqlx(rename = "arxivCategories")]
    pub categories: Option<Vec<String>>,
}

impl EmbeddingSource {
    /// Title, authors, categories, abstract and summary, blank parts skipped.
    pub fn embedding_text(&self, summary: &str) -> String {
        let authors = self.authors.as_ref().map(|a| a.join(", "));
        let categories = self.categories.as_ref().map(|c| c.join(", "));

        [
            self.title.as_deref(),
            authors.as_deref(),
            categories.as_deref(),
            self.abstract_text.as_deref(),
            Some(summary),
        ]
        .into_iter()
        .flatten()
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("\n\n")
    }
}

impl From<&Paper> for EmbeddingSource {
    fn from(paper: &Paper) -> Self {
        Self {
            title: paper.title.clone(),
            authors: paper.authors.clone(),
            abstract_text: paper.abstract_text.clone(),
            categories: paper.categories.clone(),
        }
    }
}

/// Where a paper lives on the site.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct PaperRoute {
    pub slug: String,
    pub platform: String,
}

impl PaperRoute {
    pub fn path(&self) -> String {
        format!("/papers/{}/{}", self.platform, self.slug)
    }
}

/// Minimal paper view used to build a generation prompt.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct PaperPrompt {
    pub id: String,
    pub title: Option<String>,
    #[sqlx(rename = "abstract")]
    pub abstract_text: Option<String>,
}

// =============================================================================
// SQL Queries
// =============================================================================

impl Paper {
    /// Write generated text plus its timestamp. Returns false when no row matched.
    pub async fn apply_generated(id: &str, content: &GeneratedContent, pool: &PgPool) -> Result<bool> {
        let query = match content.kind {
            BatchType::Outline => {
                r#"
                UPDATE "arxivPapersData"
                SET "generatedOutline" = $2,
                    "outlineGeneratedAt" = $3,
                    "lastUpdated" = $3
                WHERE id = $1
                "#
            }
            BatchType::Summary => {
                r#"
                UPDATE "arxivPapersData"
                SET "generatedSummary" = $2,
                    "summaryGeneratedAt" = $3,
                    "lastUpdated" = $3
                WHERE id = $1
                "#
            }
        };

        let result = sqlx::query(query)
            .bind(id)
            .bind(&content.text)
            .bind(content.generated_at)
            .execute(pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn find_embedding_source(id: &str, pool: &PgPool) -> Result<Option<EmbeddingSource>> {
        let source = sqlx::query_as::<_, EmbeddingSource>(
            r#"SELECT title, authors, "abstract", "arxivCategories" FROM "arxivPapersData" WHERE id = $1"#,
        )
        .bind(id)
        .fetch_optional(pool)
        .await?;

        Ok(source)
    }

    pub async fn update_embedding(id: &str, embedding: &[f32], pool: &PgPool) -> Result<()> {
        let vector = Vector::from(embedding.to_vec());
        let result = sqlx::query(
            r#"UPDATE "arxivPapersData" SET embedding = $2, "lastUpdated" = NOW() WHERE id = $1"#,
        )
        .bind(id)
        .bind(vector)
        .execute(pool)
        .await?;

        if result.rows_affected() == 0 {
            anyhow::bail!("paper {} not found", id);
        }

        Ok(())
    }

    /// Slug and platform, when both are set.
    pub async fn find_route(id: &str, pool: &PgPool) -> Result<Option<PaperRoute>> {
        let route = sqlx::query_as::<_, PaperRoute>(
            r#"
            SELECT slug, platform FROM "arxivPapersData"
            WHERE id = $1 AND slug IS NOT NULL AND platform IS NOT NULL
            "#,
        )
        .bind(id)
        .fetch_optional(pool)
        .await?;

        Ok(route)
    }

    /// Papers with an abstract but no generated content of the given kind.
    pub async fn find_missing_generated(
        kind: BatchType,
        limit: i64,
        pool: &PgPool,
    ) -> Result<Vec<PaperPrompt>> {
        let query = match kind {
            BatchType::Outline => {
                r#"
                SELECT id, title, "abstract" FROM "arxivPapersData"
                WHERE "generatedOutline" IS NULL AND "abstract" IS NOT NULL
                ORDER BY "lastUpdated" DESC NULLS LAST
                LIMIT $1
                "#
            }
            BatchType::Summary => {
                r#"
                SELECT id, title, "abstract" FROM "arxivPapersData"
                WHERE "generatedSummary" IS NULL AND "abstract" IS NOT NULL
                ORDER BY "lastUpdated" DESC NULLS LAST
                LIMIT $1
                "#
            }
        };

        let papers = sqlx::query_as::<_, PaperPrompt>(query)
            .bind(limit)
            .fetch_all(pool)
            .await?;

        Ok(papers)
    }
}

// =============================================================================
// Store
// =============================================================================

/// Postgres-backed [`BasePaperStore`].
#[derive(Clone)]
pub struct PostgresPaperStore {
    pool: PgPool,
}

impl PostgresPaperStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl BasePaperStore for PostgresPaperStore {
    async fn apply_generated(&self, paper_id: &str, content: &GeneratedContent) -> Result<bool> {
        Paper::apply_generated(paper_id, content, &self.pool).await
    }

    async fn find_embedding_source(&self, paper_id: &str) -> Result<Option<EmbeddingSource>> {
        Paper::find_embedding_source(paper_id, &self.pool).await
    }

    async fn set_embedding(&self, paper_id: &str, embedding: &[f32]) -> Result<()> {
        Paper::update_embedding(paper_id, embedding, &self.pool).await
    }

    async fn find_route(&self, paper_id: &str) -> Result<Option<PaperRoute>> {
        Paper::find_route(paper_id, &self.pool).await
    }

    async fn find_missing_generated(&self, kind: BatchType, limit: i64) -> Result<Vec<PaperPrompt>> {
        Paper::find_missing_generated(kind, limit, &self.pool).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_embedding_text_skips_blank_parts() {
        let source = EmbeddingSource {
            title: Some("Attention Is All You Need".into()),
            authors: Some(vec!["Vaswani".into(), "Shazeer".into()]),
            abstract_text: Some("   ".into()),
            categories: None,
        };

        let text = source.embedding_text("A transformer summary.");
        assert_eq!(
            text,
            "Attention Is All You Need\n\nVaswani, Shazeer\n\nA transformer summary."
        );
    }

    #[test]
    fn test_embedding_text_empty_source() {
        let source = EmbeddingSource::default();
        assert_eq!(source.embedding_text(""), "");
    }

    #[test]
    fn test_route_path() {
        let route = PaperRoute {
            slug: "attention-is-all-you-need".into(),
            platform: "arxiv".into(),
        };
        assert_eq!(route.path(), "/papers/arxiv/attention-is-all-you-need");
    }

    #[test]
    fn test_builder_defaults() {
        let paper = Paper::builder().id("42").title("Outline me").build();
        assert_eq!(paper.id, "42");
        assert_eq!(paper.title.as_deref(), Some("Outline me"));
        assert!(paper.generated_outline.is_none());
    }
}
