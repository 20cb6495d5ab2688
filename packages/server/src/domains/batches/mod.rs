//! Batches domain - tracks provider batch jobs from submission to applied results

pub mod activities;
pub mod models;

pub use activities::{
    process_results, reconcile, submit_batch, BatchPoller, CycleGuard, CycleOutcome, CycleReport,
    ItemError, PollerConfig, ResultTally,
};
pub use models::{BatchJob, BatchStatus, BatchType, PostgresBatchJobStore};
