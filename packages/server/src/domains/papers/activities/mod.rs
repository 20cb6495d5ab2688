pub mod embedding;
pub mod revalidation;

pub use embedding::*;
pub use revalidation::*;
