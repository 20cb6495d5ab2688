//! Pure Anthropic Message Batches REST API client
//!
//! A minimal client for submitting message batches, checking their status and
//! streaming their results. No domain-specific logic lives here.
//!
//! # Example
//!
//! ```rust,ignore
//! use anthropic_client::{AnthropicClient, BatchRequest, MessageParams};
//! use futures::StreamExt;
//!
//! let client = AnthropicClient::from_env()?;
//!
//! let batch = client.create_batch(vec![BatchRequest {
//!     custom_id: "42".into(),
//!     params: MessageParams::single_turn("claude-3-5-sonnet-20241022", 1024, "Hello!"),
//! }]).await?;
//!
//! let status = client.retrieve_batch(&batch.id).await?;
//!
//! let mut results = client.batch_results(&batch.id).await?;
//! while let Some(item) = results.next().await {
//!     println!("{:?}", item?);
//! }
//! ```

pub mod error;
pub mod results;
pub mod types;

pub use error::{AnthropicError, Result};
pub use results::BatchResultStream;
pub use types::*;

use reqwest::{Client, RequestBuilder};
use tracing::{debug, warn};

const DEFAULT_BASE_URL: &str = "https://api.anthropic.com/v1";
const API_VERSION: &str = "2023-06-01";

/// Pure Anthropic API client.
#[derive(Clone)]
pub struct AnthropicClient {
    http_client: Client,
    api_key: String,
    base_url: String,
}

impl AnthropicClient {
    /// Create a new client with the given API key.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            http_client: Client::new(),
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }

    /// Create from environment variable `ANTHROPIC_API_KEY`.
    pub fn from_env() -> Result<Self> {
        let api_key = std::env::var("ANTHROPIC_API_KEY")
            .map_err(|_| AnthropicError::Config("ANTHROPIC_API_KEY not set".into()))?;
        Ok(Self::new(api_key))
    }

    /// Set a custom base URL (for proxies or gateways).
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn authorized(&self, builder: RequestBuilder) -> RequestBuilder {
        builder
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .header("content-type", "application/json")
    }

    /// Submit a batch of message requests.
    pub async fn create_batch(&self, requests: Vec<BatchRequest>) -> Result<MessageBatch> {
        let count = requests.len();
        let response = self
            .authorized(
                self.http_client
                    .post(format!("{}/messages/batches", self.base_url)),
            )
            .json(&CreateBatchRequest { requests })
            .send()
            .await
            .map_err(|e| {
                warn!(error = %e, "Batch create request failed");
                AnthropicError::Network(e.to_string())
            })?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            warn!(status = %status, error = %error_text, "Anthropic batch create error");
            return Err(AnthropicError::Api(format!(
                "Anthropic batch create error: {}",
                error_text
            )));
        }

        let batch: MessageBatch = response
            .json()
            .await
            .map_err(|e| AnthropicError::Parse(e.to_string()))?;

        debug!(batch_id = %batch.id, requests = count, "Created message batch");
        Ok(batch)
    }

    /// Fetch the current status of a batch.
    pub async fn retrieve_batch(&self, batch_id: &str) -> Result<MessageBatch> {
        let response = self
            .authorized(
                self.http_client
                    .get(format!("{}/messages/batches/{}", self.base_url, batch_id)),
            )
            .send()
            .await
            .map_err(|e| {
                warn!(batch_id = %batch_id, error = %e, "Batch retrieve request failed");
                AnthropicError::Network(e.to_string())
            })?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            warn!(status = %status, error = %error_text, "Anthropic batch retrieve error");
            return Err(AnthropicError::Api(format!(
                "Anthropic batch retrieve error ({}): {}",
                status, error_text
            )));
        }

        response
            .json()
            .await
            .map_err(|e| AnthropicError::Parse(e.to_string()))
    }

    /// Stream the results of an ended batch.
    ///
    /// Looks up the batch first to resolve its `results_url`; a batch that has
    /// not ended yet has none and yields an API error.
    pub async fn batch_results(&self, batch_id: &str) -> Result<BatchResultStream> {
        let batch = self.retrieve_batch(batch_id).await?;
        let results_url = batch.results_url.ok_or_else(|| {
            AnthropicError::Api(format!("Batch {} has no results available", batch_id))
        })?;

        self.stream_results_url(&results_url).await
    }

    /// Stream a results file from an explicit URL.
    pub async fn stream_results_url(&self, results_url: &str) -> Result<BatchResultStream> {
        let response = self
            .authorized(self.http_client.get(results_url))
            .send()
            .await
            .map_err(|e| {
                warn!(error = %e, "Batch results request failed");
                AnthropicError::Network(e.to_string())
            })?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            warn!(status = %status, error = %error_text, "Anthropic batch results error");
            return Err(AnthropicError::Api(format!(
                "Anthropic batch results error: {}",
                error_text
            )));
        }

        Ok(BatchResultStream::new(response.bytes_stream()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_builder() {
        let client = AnthropicClient::new("sk-ant-test").with_base_url("https://gateway.local/v1");

        assert_eq!(client.api_key, "sk-ant-test");
        assert_eq!(client.base_url(), "https://gateway.local/v1");
    }

    #[test]
    fn test_default_base_url() {
        let client = AnthropicClient::new("sk-ant-test");
        assert_eq!(client.base_url(), DEFAULT_BASE_URL);
    }
}
