use thiserror::Error;

/// Result type for twitterapi.io client operations.
pub type Result<T> = std::result::Result<T, TwitterApiError>;

/// twitterapi.io client errors.
#[derive(Debug, Error)]
pub enum TwitterApiError {
    /// Network-level failure (connection, timeout, TLS)
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// Non-2xx API response
    #[error("twitterapi.io error {status}: {message}")]
    Api { status: u16, message: String },

    /// Credit quota exhausted (HTTP 402/429)
    #[error("twitterapi.io quota exceeded: {0}")]
    Quota(String),

    /// API returned status != "success"
    #[error("fetch failed for @{handle}: {reason}")]
    Fetch { handle: String, reason: String },
}

impl TwitterApiError {
    /// Whether this error means the account cannot make further calls.
    pub fn is_quota(&self) -> bool {
        matches!(self, TwitterApiError::Quota(_))
    }
}
