//! Site cache revalidation after a paper changes.

use std::time::Duration;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::kernel::{BaseRevalidator, ServerDeps};

const REVALIDATE_TIMEOUT: Duration = Duration::from_secs(10);

/// Calls `GET {site_url}/api/revalidate?secret=..&path=..`.
pub struct HttpRevalidator {
    client: Client,
    site_url: String,
    secret: String,
}

#[derive(Debug, Deserialize)]
struct RevalidateResponse {
    #[serde(default)]
    revalidated: bool,
}

impl HttpRevalidator {
    pub fn new(site_url: impl Into<String>, secret: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .timeout(REVALIDATE_TIMEOUT)
            .build()
            .context("Failed to build revalidation HTTP client")?;

        Ok(Self {
            client,
            site_url: site_url.into().trim_end_matches('/').to_string(),
            secret: secret.into(),
        })
    }

    pub fn endpoint(&self) -> String {
        format!("{}/api/revalidate", self.site_url)
    }
}

#[async_trait]
impl BaseRevalidator for HttpRevalidator {
    async fn revalidate(&self, path: &str) -> Result<bool> {
        let response = self
            .client
            .get(self.endpoint())
            .query(&[("secret", self.secret.as_str()), ("path", path)])
            .send()
            .await
            .context("Revalidation request failed")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            bail!("Revalidation endpoint returned {}: {}", status, body);
        }

        let body: RevalidateResponse = response
            .json()
            .await
            .context("Invalid revalidation response")?;

        Ok(body.revalidated)
    }
}

/// Best-effort revalidation of a paper's page. Failures are logged only.
pub async fn revalidate_paper(paper_id: &str, deps: &ServerDeps) {
    let Some(revalidator) = &deps.revalidator else {
        return;
    };

    let route = match deps.papers.find_route(paper_id).await {
        Ok(Some(route)) => route,
        Ok(None) => {
            debug!(paper_id = %paper_id, "Paper has no slug/platform, skipping revalidation");
            return;
        }
        Err(e) => {
            warn!(paper_id = %paper_id, error = %e, "Failed to load paper route for revalidation");
            return;
        }
    };

    let path = route.path();
    match revalidator.revalidate(&path).await {
        Ok(true) => info!(paper_id = %paper_id, path = %path, "Revalidated paper page"),
        Ok(false) => warn!(paper_id = %paper_id, path = %path, "Site declined revalidation"),
        Err(e) => warn!(paper_id = %paper_id, path = %path, error = %e, "Revalidation failed"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_strips_trailing_slash() {
        let revalidator = HttpRevalidator::new("https://papers.example/", "s3cret").unwrap();
        assert_eq!(revalidator.endpoint(), "https://papers.example/api/revalidate");
    }

    #[test]
    fn test_response_defaults_to_not_revalidated() {
        let body: RevalidateResponse = serde_json::from_str("{}").unwrap();
        assert!(!body.revalidated);
    }

    #[tokio::test]
    async fn test_unreachable_site_is_an_error() {
        let revalidator = HttpRevalidator::new("http://127.0.0.1:9", "s3cret").unwrap();
        assert!(revalidator.revalidate("/papers/arxiv/x").await.is_err());
    }
}
