// Business domains
pub mod batches;
pub mod papers;
