//! Stage 2: full-content enrichment.
//!
//! Drains the `pending_enrichment` queue with a bounded worker pool. Each
//! item is fetched independently; one item's failure never affects its
//! siblings. Stream items arrive with content already attached and pass
//! straight through to `pending_summary`.

use futures::future::join_all;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

use crate::config::PipelineConfig;
use crate::engine::{record_failure, FailureOutcome, RetryPolicy};
use crate::error::{CapabilityError, PipelineError, Result};
use crate::stages::{Capability, CapabilityGate};
use crate::storage::Storage;
use crate::traits::Scraper;
use crate::types::{ContentItem, ProcessingStage};

/// Tallies for one enrichment pass.
#[derive(Debug, Clone, Copy, Default)]
pub struct EnrichOutcome {
    /// Items advanced to `pending_summary`.
    pub enriched: usize,
    /// Items that exhausted their retries and were marked failed.
    pub failed: usize,
    /// Items left in `pending_enrichment` (cancellation or quota); they
    /// will be picked up by a later run.
    pub deferred: usize,
}

enum ItemResult {
    Enriched,
    Failed,
    Deferred,
}

/// Drain the `pending_enrichment` queue once.
///
/// Idempotent: operates only on items currently in `pending_enrichment`,
/// so re-running never touches completed work.
pub async fn run_enrichment<S, R>(
    storage: &S,
    scraper: &R,
    config: &PipelineConfig,
    gate: &CapabilityGate,
    cancel: &CancellationToken,
) -> Result<EnrichOutcome>
where
    S: Storage,
    R: Scraper,
{
    let policy = RetryPolicy::from_config(config);
    let items = storage
        .items_in_stage(ProcessingStage::PendingEnrichment, config.stage_queue_limit)
        .await?;

    if items.is_empty() {
        return Ok(EnrichOutcome::default());
    }
    tracing::info!(pending = items.len(), "Starting enrichment pass");

    let semaphore = Semaphore::new(config.enrich_concurrency);
    let futures = items.iter().map(|item| {
        let semaphore = &semaphore;
        async move {
            let _permit = semaphore.acquire().await.unwrap();
            if cancel.is_cancelled() {
                return Ok(ItemResult::Deferred);
            }
            enrich_item(item, storage, scraper, &policy, gate, cancel, config).await
        }
    });

    let mut outcome = EnrichOutcome::default();
    for result in join_all(futures).await {
        match result? {
            ItemResult::Enriched => outcome.enriched += 1,
            ItemResult::Failed => outcome.failed += 1,
            ItemResult::Deferred => outcome.deferred += 1,
        }
    }

    tracing::info!(
        enriched = outcome.enriched,
        failed = outcome.failed,
        deferred = outcome.deferred,
        "Enrichment pass complete"
    );
    Ok(outcome)
}

async fn enrich_item<S, R>(
    item: &ContentItem,
    storage: &S,
    scraper: &R,
    policy: &RetryPolicy,
    gate: &CapabilityGate,
    cancel: &CancellationToken,
    config: &PipelineConfig,
) -> Result<ItemResult>
where
    S: Storage,
    R: Scraper,
{
    // Stream items carry their content from discovery.
    if !item.needs_content_fetch() {
        storage
            .advance_stage(item.id, ProcessingStage::PendingSummary)
            .await?;
        return Ok(ItemResult::Enriched);
    }

    let mut retry_count = item.retry_count.max(0) as u32;
    loop {
        if cancel.is_cancelled() || !gate.is_open(Capability::Scraper) {
            return Ok(ItemResult::Deferred);
        }

        match scraper.fetch_full(&item.url).await {
            Ok(page) => {
                let content = truncate_chars(&page.markdown, config.max_content_chars);
                storage.complete_enrichment(item.id, &content).await?;
                tracing::debug!(
                    item_id = %item.id.0,
                    url = %item.url,
                    content_length = content.len(),
                    "Item enriched"
                );
                return Ok(ItemResult::Enriched);
            }
            Err(CapabilityError::Quota(reason)) => {
                gate.close(Capability::Scraper);
                tracing::warn!(
                    item_id = %item.id.0,
                    %reason,
                    "Scraper quota exhausted, deferring remaining enrichment"
                );
                return Ok(ItemResult::Deferred);
            }
            Err(error) => {
                let message = PipelineError::ItemFetch {
                    url: item.url.clone(),
                    reason: error.to_string(),
                }
                .to_string();

                match record_failure(storage, item, retry_count, policy, &message).await? {
                    FailureOutcome::WillRetry { retry_count: next } => {
                        retry_count = next;
                        tokio::time::sleep(policy.backoff_delay(retry_count)).await;
                    }
                    FailureOutcome::Exhausted => return Ok(ItemResult::Failed),
                }
            }
        }
    }
}

fn truncate_chars(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        text.to_string()
    } else {
        text.chars().take(max_chars).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStorage;
    use crate::testing::{fixtures, MockScraper};

    fn test_config() -> PipelineConfig {
        PipelineConfig::default().with_backoff_base_ms(1)
    }

    #[tokio::test]
    async fn test_pending_items_enriched() {
        let storage = MemoryStorage::new();
        let source = fixtures::document_source("Example", "https://ex.com");
        let a = fixtures::document_item(&source, "https://ex.com/a", "AI story A");
        let b = fixtures::document_item(&source, "https://ex.com/b", "AI story B");
        storage.upsert_item(&a).await.unwrap();
        storage.upsert_item(&b).await.unwrap();

        let scraper = MockScraper::new();
        let outcome = run_enrichment(
            &storage,
            &scraper,
            &test_config(),
            &CapabilityGate::new(),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

        assert_eq!(outcome.enriched, 2);
        assert_eq!(outcome.failed, 0);
        for item in storage.all_items() {
            assert_eq!(item.stage, ProcessingStage::PendingSummary);
            assert!(item.full_content.is_some());
        }
    }

    #[tokio::test]
    async fn test_stream_item_advances_without_fetch() {
        let storage = MemoryStorage::new();
        let source = fixtures::stream_source("Karpathy", "karpathy");
        let item = fixtures::stream_item(&source, "111", "karpathy", "LLM results");
        storage.upsert_item(&item).await.unwrap();

        let scraper = MockScraper::new();
        let outcome = run_enrichment(
            &storage,
            &scraper,
            &test_config(),
            &CapabilityGate::new(),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

        assert_eq!(outcome.enriched, 1);
        assert_eq!(scraper.call_count(), 0);
        let stored = storage.get_item(item.id).await.unwrap().unwrap();
        assert_eq!(stored.stage, ProcessingStage::PendingSummary);
        assert_eq!(stored.full_content.as_deref(), Some("LLM results"));
    }

    #[tokio::test]
    async fn test_transient_failures_then_success() {
        let storage = MemoryStorage::new();
        let source = fixtures::document_source("Example", "https://ex.com");
        let item = fixtures::document_item(&source, "https://ex.com/flaky", "AI story");
        storage.upsert_item(&item).await.unwrap();

        let scraper = MockScraper::new();
        scraper.fail_n_times(
            "https://ex.com/flaky",
            2,
            CapabilityError::Unavailable("503".into()),
        );

        let outcome = run_enrichment(
            &storage,
            &scraper,
            &test_config(),
            &CapabilityGate::new(),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

        assert_eq!(outcome.enriched, 1);
        assert_eq!(outcome.failed, 0);
        let stored = storage.get_item(item.id).await.unwrap().unwrap();
        assert_eq!(stored.stage, ProcessingStage::PendingSummary);
        assert_eq!(stored.retry_count, 2);
    }

    #[tokio::test]
    async fn test_retry_exhaustion_marks_failed() {
        let storage = MemoryStorage::new();
        let source = fixtures::document_source("Example", "https://ex.com");
        let item = fixtures::document_item(&source, "https://ex.com/broken", "AI story");
        storage.upsert_item(&item).await.unwrap();

        let scraper = MockScraper::new();
        scraper.fail_n_times(
            "https://ex.com/broken",
            10,
            CapabilityError::Unavailable("503".into()),
        );

        let config = test_config();
        let outcome = run_enrichment(
            &storage,
            &scraper,
            &config,
            &CapabilityGate::new(),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

        assert_eq!(outcome.failed, 1);
        let stored = storage.get_item(item.id).await.unwrap().unwrap();
        assert_eq!(stored.stage, ProcessingStage::Failed);
        // Never stuck past the cap.
        assert_eq!(stored.retry_count, config.max_retries as i32);
        assert!(stored.error_message.is_some());
    }

    #[tokio::test]
    async fn test_quota_defers_remaining_items() {
        let storage = MemoryStorage::new();
        let source = fixtures::document_source("Example", "https://ex.com");
        let a = fixtures::document_item(&source, "https://ex.com/a", "AI story A");
        let b = fixtures::document_item(&source, "https://ex.com/b", "AI story B");
        storage.upsert_item(&a).await.unwrap();
        storage.upsert_item(&b).await.unwrap();

        let scraper = MockScraper::new();
        scraper.exhaust_quota();

        let outcome = run_enrichment(
            &storage,
            &scraper,
            &test_config(),
            &CapabilityGate::new(),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

        assert_eq!(outcome.enriched, 0);
        assert_eq!(outcome.failed, 0);
        assert_eq!(outcome.deferred, 2);
        // Quota is not a retry: items stay resumable with a clean count.
        for item in storage.all_items() {
            assert_eq!(item.stage, ProcessingStage::PendingEnrichment);
            assert_eq!(item.retry_count, 0);
        }
    }

    #[tokio::test]
    async fn test_cancelled_run_defers_everything() {
        let storage = MemoryStorage::new();
        let source = fixtures::document_source("Example", "https://ex.com");
        let item = fixtures::document_item(&source, "https://ex.com/a", "AI story");
        storage.upsert_item(&item).await.unwrap();

        let cancel = CancellationToken::new();
        cancel.cancel();

        let scraper = MockScraper::new();
        let outcome = run_enrichment(
            &storage,
            &scraper,
            &test_config(),
            &CapabilityGate::new(),
            &cancel,
        )
        .await
        .unwrap();

        assert_eq!(outcome.deferred, 1);
        assert_eq!(scraper.call_count(), 0);
    }

    #[test]
    fn test_truncate_chars() {
        assert_eq!(truncate_chars("hello", 10), "hello");
        assert_eq!(truncate_chars("hello", 3), "hel");
    }
}
