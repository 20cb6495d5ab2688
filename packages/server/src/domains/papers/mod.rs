//! Papers domain - the slice of arXiv paper rows that batch results write to

pub mod activities;
pub mod models;

pub use activities::{generate_paper_embedding, revalidate_paper, HttpRevalidator};
pub use models::{EmbeddingSource, GeneratedContent, Paper, PaperPrompt, PaperRoute, PostgresPaperStore};
