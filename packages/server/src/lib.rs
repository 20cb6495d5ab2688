// Paper Enrichment - Batch Tracker Core
//
// Tracks long-running LLM batch jobs that generate outlines and summaries for
// arXiv paper rows, applies their results, derives embeddings and pings the
// site's revalidation webhook.
//
// Domains live in domains/*, infrastructure seams in kernel/.

pub mod common;
pub mod config;
pub mod domains;
pub mod kernel;

pub use config::*;
