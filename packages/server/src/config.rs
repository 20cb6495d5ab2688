use anyhow::{Context, Result};
use dotenvy::dotenv;
use std::env;

/// Fires at second 0 of every 15th minute.
pub const DEFAULT_POLL_CRON: &str = "0 */15 * * * *";

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub database_max_connections: u32,
    pub run_migrations: bool,
    pub anthropic_api_key: String,
    pub anthropic_base_url: Option<String>,
    pub generation_model: String,
    pub openai_api_key: String,
    pub embedding_model: String,
    pub site_url: Option<String>,
    pub revalidation_secret: Option<String>,
    pub poll_cron: String,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        // Load .env file if present (development)
        let _ = dotenv();

        Ok(Self {
            database_url: env::var("DATABASE_URL").context("DATABASE_URL must be set")?,
            database_max_connections: env::var("DATABASE_MAX_CONNECTIONS")
                .unwrap_or_else(|_| "5".to_string())
                .parse()
                .context("DATABASE_MAX_CONNECTIONS must be a valid number")?,
            run_migrations: env::var("RUN_MIGRATIONS")
                .unwrap_or_else(|_| "false".to_string())
                .parse()
                .context("RUN_MIGRATIONS must be true or false")?,
            anthropic_api_key: env::var("ANTHROPIC_API_KEY")
                .context("ANTHROPIC_API_KEY must be set")?,
            anthropic_base_url: non_empty_var("ANTHROPIC_BASE_URL"),
            generation_model: env::var("ANTHROPIC_MODEL")
                .unwrap_or_else(|_| "claude-3-5-sonnet-20241022".to_string()),
            openai_api_key: env::var("OPENAI_API_KEY").context("OPENAI_API_KEY must be set")?,
            embedding_model: env::var("EMBEDDING_MODEL")
                .unwrap_or_else(|_| openai_client::TEXT_EMBEDDING_3_SMALL.to_string()),
            site_url: non_empty_var("SITE_URL"),
            revalidation_secret: non_empty_var("REVALIDATION_SECRET"),
            poll_cron: env::var("POLL_CRON").unwrap_or_else(|_| DEFAULT_POLL_CRON.to_string()),
        })
    }

    /// Site URL and secret, when both are configured.
    pub fn revalidation(&self) -> Option<(&str, &str)> {
        match (&self.site_url, &self.revalidation_secret) {
            (Some(url), Some(secret)) => Some((url.as_str(), secret.as_str())),
            _ => None,
        }
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}
