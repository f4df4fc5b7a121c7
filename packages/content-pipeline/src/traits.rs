//! Capability seams consumed by the pipeline.
//!
//! Each external collaborator (scraper, semantic classifier, summarizer,
//! stream source) is a narrow trait so the pipeline can be driven against
//! real providers or mocks interchangeably.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};

use crate::error::CapabilityError;
use crate::types::{DateConfidence, EngagementMetrics};

/// A page fetched by the scraper, in markdown form.
#[derive(Debug, Clone)]
pub struct ScrapedContent {
    pub url: String,
    pub markdown: String,
    pub title: Option<String>,
    pub published_date: Option<String>,
}

/// Web scraping capability.
#[async_trait]
pub trait Scraper: Send + Sync {
    /// Fetch a page's main content as markdown (homepage discovery fetch).
    async fn fetch_markdown(&self, url: &str) -> Result<ScrapedContent, CapabilityError>;

    /// Fetch an article's full content (Stage 2 enrichment fetch).
    async fn fetch_full(&self, url: &str) -> Result<ScrapedContent, CapabilityError>;
}

/// A candidate put before the semantic classifier.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub headline: String,
    pub url: String,
    pub snippet: Option<String>,
}

/// Per-candidate classifier decision.
#[derive(Debug, Clone)]
pub struct Verdict {
    pub relevant: bool,
    pub date_confidence: DateConfidence,
    pub tags: Vec<String>,
}

/// Semantic relevance classification capability. One call per batch.
#[async_trait]
pub trait Classifier: Send + Sync {
    /// Classify a batch of candidates in a single external call.
    ///
    /// Implementations must return exactly one verdict per candidate, in
    /// order; anything else is a `Malformed` error and the caller treats
    /// the whole batch as failed.
    async fn classify_batch(
        &self,
        candidates: &[Candidate],
        window: NaiveDate,
    ) -> Result<Vec<Verdict>, CapabilityError>;
}

/// Summarization capability.
#[async_trait]
pub trait Summarizer: Send + Sync {
    /// Summarize a single document.
    async fn summarize(&self, headline: &str, content: &str) -> Result<String, CapabilityError>;

    /// Summarize a group of short texts by one author in a single call.
    ///
    /// Must return exactly one summary per input text, in order.
    async fn summarize_group(
        &self,
        author: &str,
        texts: &[String],
    ) -> Result<Vec<String>, CapabilityError>;
}

/// One post from a stream source, complete with metadata.
#[derive(Debug, Clone)]
pub struct StreamPost {
    /// Platform-native id, globally unique.
    pub id: String,
    pub author: String,
    pub text: String,
    pub url: String,
    /// Text of an embedded quoted post, already attributed.
    pub quoted: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub metrics: EngagementMetrics,
}

/// Stream (feed-like) source capability.
#[async_trait]
pub trait StreamSource: Send + Sync {
    /// Fetch recent original posts for a handle, restricted to the given
    /// collection-window date.
    async fn fetch_recent(
        &self,
        handle: &str,
        window: NaiveDate,
    ) -> Result<Vec<StreamPost>, CapabilityError>;
}
