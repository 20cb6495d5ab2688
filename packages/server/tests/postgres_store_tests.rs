//! Postgres-backed store tests. Need Docker: `cargo test -- --ignored`.

mod common;

use chrono::{Duration, Utc};
use enrichment_core::domains::batches::{BatchJob, BatchStatus, BatchType, PostgresBatchJobStore};
use enrichment_core::domains::papers::{GeneratedContent, PostgresPaperStore};
use enrichment_core::kernel::{BaseBatchJobStore, BasePaperStore};
use test_context::test_context;
use uuid::Uuid;

use crate::common::{
    insert_paper, job_submitted_ago, load_paper, paper, paper_has_embedding, TestHarness,
};

fn unique(prefix: &str) -> String {
    format!("{}-{}", prefix, Uuid::new_v4())
}

#[test_context(TestHarness)]
#[tokio::test]
#[ignore = "requires Docker"]
async fn batch_job_round_trips(ctx: &TestHarness) {
    let store = PostgresBatchJobStore::new(ctx.db_pool.clone());
    let job = BatchJob::submitted(unique("msgbatch"), BatchType::Summary, 12);

    store.insert(&job).await.unwrap();
    let loaded = store.find_by_batch_id(&job.batch_id).await.unwrap().unwrap();

    assert_eq!(loaded.id, job.id);
    assert_eq!(loaded.status, BatchStatus::Submitted);
    assert_eq!(loaded.batch_type, "summary");
    assert_eq!(loaded.total_requests, Some(12));
}

#[test_context(TestHarness)]
#[tokio::test]
#[ignore = "requires Docker"]
async fn terminal_rows_are_not_overwritten(ctx: &TestHarness) {
    let store = PostgresBatchJobStore::new(ctx.db_pool.clone());
    let mut job = BatchJob::submitted(unique("msgbatch"), BatchType::Outline, 1);
    store.insert(&job).await.unwrap();

    job.advance(BatchStatus::Polling).unwrap();
    job.fail("provider said no").unwrap();
    store.save(&job).await.unwrap();

    // A stale in-memory copy tries to move the row again
    let mut stale = job.clone();
    stale.status = BatchStatus::Polling;
    assert!(store.save(&stale).await.is_err());

    let loaded = store.find_by_batch_id(&job.batch_id).await.unwrap().unwrap();
    assert_eq!(loaded.status, BatchStatus::Failed);
    assert_eq!(loaded.error_message.as_deref(), Some("provider said no"));
}

#[test_context(TestHarness)]
#[tokio::test]
#[ignore = "requires Docker"]
async fn stale_jobs_expire_and_fresh_ones_are_selected(ctx: &TestHarness) {
    let store = PostgresBatchJobStore::new(ctx.db_pool.clone());

    let fresh = job_submitted_ago(
        &unique("fresh"),
        BatchType::Outline,
        BatchStatus::Polling,
        Duration::hours(24) + Duration::minutes(59),
    );
    let stale = job_submitted_ago(
        &unique("stale"),
        BatchType::Outline,
        BatchStatus::Submitted,
        Duration::hours(25) + Duration::minutes(1),
    );
    store.insert(&fresh).await.unwrap();
    store.insert(&stale).await.unwrap();

    let since = Utc::now() - Duration::hours(25);
    let expired = store.expire_stale(since, "outside window").await.unwrap();
    assert!(expired >= 1);

    let pollable = store.find_pollable(since, 1000).await.unwrap();
    assert!(pollable.iter().any(|j| j.batch_id == fresh.batch_id));
    assert!(!pollable.iter().any(|j| j.batch_id == stale.batch_id));

    let stale = store.find_by_batch_id(&stale.batch_id).await.unwrap().unwrap();
    assert_eq!(stale.status, BatchStatus::Expired);
    assert_eq!(stale.error_message.as_deref(), Some("outside window"));
}

#[test_context(TestHarness)]
#[tokio::test]
#[ignore = "requires Docker"]
async fn generated_content_and_embedding_are_written(ctx: &TestHarness) {
    let store = PostgresPaperStore::new(ctx.db_pool.clone());
    let id = unique("paper");
    insert_paper(&paper(&id), &ctx.db_pool).await.unwrap();

    let applied = store
        .apply_generated(&id, &GeneratedContent::new(BatchType::Summary, "A summary."))
        .await
        .unwrap();
    assert!(applied);

    store.set_embedding(&id, &vec![0.25; 1536]).await.unwrap();

    let loaded = load_paper(&id, &ctx.db_pool).await.unwrap().unwrap();
    assert_eq!(loaded.generated_summary.as_deref(), Some("A summary."));
    assert!(loaded.summary_generated_at.is_some());
    assert!(paper_has_embedding(&id, &ctx.db_pool).await.unwrap());

    let route = store.find_route(&id).await.unwrap().unwrap();
    assert_eq!(route.path(), format!("/papers/arxiv/paper-{}", id));
}

#[test_context(TestHarness)]
#[tokio::test]
#[ignore = "requires Docker"]
async fn missing_paper_is_reported_not_written(ctx: &TestHarness) {
    let store = PostgresPaperStore::new(ctx.db_pool.clone());

    let applied = store
        .apply_generated(
            &unique("absent"),
            &GeneratedContent::new(BatchType::Outline, "Outline"),
        )
        .await
        .unwrap();

    assert!(!applied);
}
