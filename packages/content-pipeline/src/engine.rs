//! Stage-machine rules: retry policy and failure recording.
//!
//! Retry state lives on the entity (`retry_count` + `error_message`), not in
//! loop constructs, so a run interrupted mid-stage resumes cleanly from
//! storage. The policy itself is a pure function of the count.

use std::time::Duration;

use crate::config::PipelineConfig;
use crate::error::Result;
use crate::storage::Storage;
use crate::types::ContentItem;

/// Pure retry policy: how many in-place retries an item gets and how long
/// to wait between them.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub backoff_base: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &PipelineConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            backoff_base: Duration::from_millis(config.backoff_base_ms),
        }
    }

    /// Whether an item with `retry_count` failures so far gets another
    /// attempt.
    pub fn should_retry(&self, retry_count: u32) -> bool {
        retry_count < self.max_retries
    }

    /// Exponential backoff before retry number `attempt` (1-based).
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.backoff_base.saturating_mul(factor)
    }
}

/// Outcome of recording a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureOutcome {
    /// retry_count was incremented; the item stays in its stage.
    WillRetry { retry_count: u32 },
    /// The cap was exhausted; the item moved to `failed`.
    Exhausted,
}

/// Record a failed attempt for an item: retry in place while the policy
/// allows, otherwise move it to the `failed` absorbing state.
///
/// `retry_count` is the caller's current view of the item's count; callers
/// looping over attempts thread the returned count back in.
pub async fn record_failure<S: Storage>(
    storage: &S,
    item: &ContentItem,
    retry_count: u32,
    policy: &RetryPolicy,
    error: &str,
) -> Result<FailureOutcome> {
    if policy.should_retry(retry_count) {
        storage.record_retry(item.id, error).await?;
        tracing::warn!(
            item_id = %item.id.0,
            stage = item.stage.as_str(),
            retry_count = retry_count + 1,
            error,
            "Item attempt failed, will retry"
        );
        Ok(FailureOutcome::WillRetry {
            retry_count: retry_count + 1,
        })
    } else {
        storage.mark_failed(item.id, error).await?;
        tracing::error!(
            item_id = %item.id.0,
            stage = item.stage.as_str(),
            retry_count,
            error,
            "Retry cap exhausted, item marked failed"
        );
        Ok(FailureOutcome::Exhausted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_should_retry_under_cap() {
        let policy = RetryPolicy {
            max_retries: 3,
            backoff_base: Duration::from_millis(100),
        };
        assert!(policy.should_retry(0));
        assert!(policy.should_retry(2));
        assert!(!policy.should_retry(3));
        assert!(!policy.should_retry(10));
    }

    #[test]
    fn test_backoff_doubles() {
        let policy = RetryPolicy {
            max_retries: 3,
            backoff_base: Duration::from_millis(100),
        };
        assert_eq!(policy.backoff_delay(1), Duration::from_millis(100));
        assert_eq!(policy.backoff_delay(2), Duration::from_millis(200));
        assert_eq!(policy.backoff_delay(3), Duration::from_millis(400));
    }
}
