//! Kernel module - server infrastructure and dependencies.

pub mod deps;
pub mod scheduled_tasks;
pub mod test_dependencies;
pub mod traits;

pub use deps::{AnthropicBatchAdapter, OpenAiEmbeddingAdapter, ServerDeps};
pub use scheduled_tasks::{run_poll_cycle, start_scheduler};
pub use test_dependencies::TestDependencies;
pub use traits::*;
