use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Request body for the `/v1/scrape` endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct ScrapeRequest {
    pub url: String,
    pub formats: Vec<String>,
    #[serde(rename = "onlyMainContent")]
    pub only_main_content: bool,
}

#[derive(Debug, Deserialize)]
pub struct ScrapeResponse {
    pub success: bool,
    pub data: Option<ScrapeData>,
    pub error: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ScrapeData {
    pub markdown: Option<String>,
    pub metadata: Option<PageMetadata>,
}

#[derive(Debug, Deserialize)]
pub struct PageMetadata {
    pub title: Option<String>,
    pub description: Option<String>,
    #[serde(rename = "publishedDate")]
    pub published_date: Option<String>,
    #[serde(rename = "sourceURL")]
    pub source_url: Option<String>,
}

/// A successfully scraped page in markdown form.
#[derive(Debug, Clone)]
pub struct ScrapedPage {
    pub url: String,
    pub markdown: String,
    pub title: Option<String>,
    pub description: Option<String>,
    pub published_date: Option<String>,
    pub fetched_at: DateTime<Utc>,
}
