use thiserror::Error;

/// Result type for Firecrawl client operations.
pub type Result<T> = std::result::Result<T, FirecrawlError>;

/// Firecrawl client errors.
#[derive(Debug, Error)]
pub enum FirecrawlError {
    /// Network-level failure (connection, timeout, TLS)
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// Non-2xx API response
    #[error("Firecrawl API error {status}: {message}")]
    Api { status: u16, message: String },

    /// Billing or rate quota exhausted (HTTP 402/429)
    #[error("Firecrawl quota exceeded: {0}")]
    Quota(String),

    /// Scrape reported success=false or returned no usable content
    #[error("scrape failed for {url}: {reason}")]
    Scrape { url: String, reason: String },
}

impl FirecrawlError {
    /// Whether this error means the account cannot make further calls.
    pub fn is_quota(&self) -> bool {
        matches!(self, FirecrawlError::Quota(_))
    }
}
