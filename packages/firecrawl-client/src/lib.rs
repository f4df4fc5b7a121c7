//! Pure Firecrawl REST API client.
//!
//! A minimal client for the Firecrawl `/v1/scrape` endpoint. Returns page
//! content as markdown with the metadata needed downstream (title,
//! published date). No crawl-job orchestration; callers decide which URLs
//! to fetch.
//!
//! # Example
//!
//! ```rust,ignore
//! use firecrawl_client::FirecrawlClient;
//!
//! let client = FirecrawlClient::from_env()?;
//! let page = client.scrape("https://example.com").await?;
//! println!("{}", page.markdown);
//! ```

pub mod error;
pub mod types;

pub use error::{FirecrawlError, Result};
pub use types::{PageMetadata, ScrapedPage, ScrapeRequest};

use chrono::Utc;
use reqwest::Client;
use std::time::Duration;
use types::{ScrapeData, ScrapeResponse};

const BASE_URL: &str = "https://api.firecrawl.dev/v1";

pub struct FirecrawlClient {
    client: Client,
    api_key: String,
    base_url: String,
}

impl FirecrawlClient {
    /// Create a new client with the given API key.
    pub fn new(api_key: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(120))
            .build()?;

        Ok(Self {
            client,
            api_key: api_key.into(),
            base_url: BASE_URL.to_string(),
        })
    }

    /// Create from the `FIRECRAWL_API_KEY` environment variable.
    pub fn from_env() -> Result<Self> {
        let api_key = std::env::var("FIRECRAWL_API_KEY").map_err(|_| FirecrawlError::Api {
            status: 0,
            message: "FIRECRAWL_API_KEY environment variable not set".to_string(),
        })?;
        Self::new(api_key)
    }

    /// Override the base URL (for proxies and tests).
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    /// Scrape a single URL, returning its main content as markdown.
    pub async fn scrape(&self, url: &str) -> Result<ScrapedPage> {
        let request = ScrapeRequest {
            url: url.to_string(),
            formats: vec!["markdown".to_string()],
            only_main_content: true,
        };

        tracing::debug!(url, "Scraping via Firecrawl");

        let endpoint = format!("{}/scrape", self.base_url);
        let response = self
            .client
            .post(&endpoint)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            // 402 = billing exhausted, 429 = rate quota; both mean stop calling.
            if status.as_u16() == 402 || status.as_u16() == 429 {
                return Err(FirecrawlError::Quota(format!("{}: {}", status, body)));
            }
            return Err(FirecrawlError::Api {
                status: status.as_u16(),
                message: body,
            });
        }

        let parsed: ScrapeResponse = response.json().await?;
        if !parsed.success {
            return Err(FirecrawlError::Scrape {
                url: url.to_string(),
                reason: parsed.error.unwrap_or_else(|| "success=false".to_string()),
            });
        }

        let data: ScrapeData = parsed.data.ok_or_else(|| FirecrawlError::Scrape {
            url: url.to_string(),
            reason: "no data in response".to_string(),
        })?;

        let markdown = data.markdown.unwrap_or_default();
        if markdown.trim().is_empty() {
            return Err(FirecrawlError::Scrape {
                url: url.to_string(),
                reason: "empty markdown content".to_string(),
            });
        }

        let metadata = data.metadata;
        let page = ScrapedPage {
            url: metadata
                .as_ref()
                .and_then(|m| m.source_url.clone())
                .unwrap_or_else(|| url.to_string()),
            markdown,
            title: metadata.as_ref().and_then(|m| m.title.clone()),
            description: metadata.as_ref().and_then(|m| m.description.clone()),
            published_date: metadata.as_ref().and_then(|m| m.published_date.clone()),
            fetched_at: Utc::now(),
        };

        tracing::debug!(
            url = %page.url,
            content_length = page.markdown.len(),
            "Scrape complete"
        );

        Ok(page)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_client() {
        let client = FirecrawlClient::new("test-key").unwrap();
        assert_eq!(client.base_url, BASE_URL);
    }

    #[test]
    fn test_base_url_override() {
        let client = FirecrawlClient::new("test-key")
            .unwrap()
            .with_base_url("http://localhost:3002/v1");
        assert_eq!(client.base_url, "http://localhost:3002/v1");
    }

    #[test]
    fn test_quota_detection() {
        let err = FirecrawlError::Quota("402: payment required".to_string());
        assert!(err.is_quota());

        let err = FirecrawlError::Api {
            status: 500,
            message: "server error".to_string(),
        };
        assert!(!err.is_quota());
    }
}
