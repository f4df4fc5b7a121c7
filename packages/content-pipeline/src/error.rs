//! Typed errors for the pipeline.
//!
//! Uses `thiserror` for library errors (not `anyhow`). Capability errors
//! (scraper, classifier, summarizer, stream source) are a separate enum so
//! implementations outside this crate can speak the same taxonomy.

use thiserror::Error;

/// Result type alias for pipeline operations.
pub type Result<T> = std::result::Result<T, PipelineError>;

/// Errors that can occur while driving the pipeline.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// A source could not be reached or fetched; the run continues.
    #[error("source '{name}' unavailable: {reason}")]
    SourceUnavailable { name: String, reason: String },

    /// A classifier batch call failed or returned a malformed response.
    /// Applies to the whole batch, never to individual candidates.
    #[error("batch classification failed: {0}")]
    BatchClassification(String),

    /// A full-content fetch for one item failed.
    #[error("content fetch failed for {url}: {reason}")]
    ItemFetch { url: String, reason: String },

    /// A summarization call for one item or group failed.
    #[error("summarization failed: {0}")]
    ItemSummarize(String),

    /// A capability's billing/rate quota is exhausted. Terminal for that
    /// capability for the remainder of the run.
    #[error("{capability} quota exceeded: {reason}")]
    QuotaExceeded { capability: String, reason: String },

    /// Storage operation failed.
    #[error("storage error: {0}")]
    Storage(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// A source row is malformed (e.g. stream source without a handle).
    #[error("invalid source '{name}': {reason}")]
    InvalidSource { name: String, reason: String },

    /// The run was cancelled; in-flight writes have completed.
    #[error("run cancelled")]
    Cancelled,
}

impl PipelineError {
    pub fn storage(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        PipelineError::Storage(Box::new(err))
    }

    pub fn is_quota(&self) -> bool {
        matches!(self, PipelineError::QuotaExceeded { .. })
    }
}

/// Errors surfaced by external capability implementations.
#[derive(Debug, Clone, Error)]
pub enum CapabilityError {
    /// The provider could not be reached or returned a server error.
    /// Retryable under the standard policy.
    #[error("capability unavailable: {0}")]
    Unavailable(String),

    /// Billing or rate quota exhausted. Not retryable this run.
    #[error("quota exceeded: {0}")]
    Quota(String),

    /// Response did not match the expected shape. Treated as a batch
    /// failure at the call site, never propagated as untyped data.
    #[error("malformed response: {0}")]
    Malformed(String),
}

impl CapabilityError {
    pub fn is_quota(&self) -> bool {
        matches!(self, CapabilityError::Quota(_))
    }
}
