pub mod batch_job;

pub use batch_job::*;
