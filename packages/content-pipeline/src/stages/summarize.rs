//! Stage 3: summarization.
//!
//! Drains the `pending_summary` queue. Stream items are grouped by author
//! so one call covers an author's posts; document items are summarized
//! individually (content length varies too much to batch reliably). Group
//! responses with the wrong item count are batch failures and retried
//! under the standard policy.

use futures::future::join_all;
use std::collections::HashMap;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

use crate::config::PipelineConfig;
use crate::engine::{record_failure, FailureOutcome, RetryPolicy};
use crate::error::{CapabilityError, PipelineError, Result};
use crate::stages::{Capability, CapabilityGate};
use crate::storage::Storage;
use crate::traits::Summarizer;
use crate::types::{ContentItem, ProcessingStage, SourceKind};

/// Tallies for one summarization pass.
#[derive(Debug, Clone, Copy, Default)]
pub struct SummarizeOutcome {
    /// Items advanced to `completed`.
    pub summarized: usize,
    /// Items that exhausted their retries and were marked failed.
    pub failed: usize,
    /// Items left in `pending_summary` for a later run.
    pub deferred: usize,
}

impl SummarizeOutcome {
    fn absorb(&mut self, other: SummarizeOutcome) {
        self.summarized += other.summarized;
        self.failed += other.failed;
        self.deferred += other.deferred;
    }
}

enum WorkUnit {
    Single(ContentItem),
    Group { author: String, items: Vec<ContentItem> },
}

/// Drain the `pending_summary` queue once.
///
/// Idempotent: operates only on items currently in `pending_summary`;
/// completed items are never re-summarized.
pub async fn run_summarization<S, M>(
    storage: &S,
    summarizer: &M,
    config: &PipelineConfig,
    gate: &CapabilityGate,
    cancel: &CancellationToken,
) -> Result<SummarizeOutcome>
where
    S: Storage,
    M: Summarizer,
{
    let policy = RetryPolicy::from_config(config);
    let items = storage
        .items_in_stage(ProcessingStage::PendingSummary, config.stage_queue_limit)
        .await?;

    if items.is_empty() {
        return Ok(SummarizeOutcome::default());
    }
    tracing::info!(pending = items.len(), "Starting summarization pass");

    let units = plan_work(items, config.group_summary_cap);

    let semaphore = Semaphore::new(config.enrich_concurrency);
    let futures = units.iter().map(|unit| {
        let semaphore = &semaphore;
        async move {
            let _permit = semaphore.acquire().await.unwrap();
            match unit {
                WorkUnit::Single(item) => {
                    summarize_single(item, storage, summarizer, &policy, gate, cancel).await
                }
                WorkUnit::Group { author, items } => {
                    summarize_group(author, items, storage, summarizer, &policy, gate, cancel)
                        .await
                }
            }
        }
    });

    let mut outcome = SummarizeOutcome::default();
    for result in join_all(futures).await {
        outcome.absorb(result?);
    }

    tracing::info!(
        summarized = outcome.summarized,
        failed = outcome.failed,
        deferred = outcome.deferred,
        "Summarization pass complete"
    );
    Ok(outcome)
}

/// Group stream items by author (chunked to the group cap); document items
/// stay individual. Order within each unit follows discovery order.
fn plan_work(items: Vec<ContentItem>, group_cap: usize) -> Vec<WorkUnit> {
    let mut units = Vec::new();
    let mut author_order: Vec<String> = Vec::new();
    let mut by_author: HashMap<String, Vec<ContentItem>> = HashMap::new();

    for item in items {
        let group_key = match (item.kind, &item.author) {
            (SourceKind::Stream, Some(author)) => Some(author.clone()),
            _ => None,
        };
        match group_key {
            Some(author) => {
                if !by_author.contains_key(&author) {
                    author_order.push(author.clone());
                }
                by_author.entry(author).or_default().push(item);
            }
            None => units.push(WorkUnit::Single(item)),
        }
    }

    for author in author_order {
        let items = by_author.remove(&author).unwrap_or_default();
        for chunk in items.chunks(group_cap.max(1)) {
            units.push(WorkUnit::Group {
                author: author.clone(),
                items: chunk.to_vec(),
            });
        }
    }

    units
}

fn item_text(item: &ContentItem) -> String {
    item.full_content
        .clone()
        .unwrap_or_else(|| item.headline.clone())
}

async fn summarize_single<S, M>(
    item: &ContentItem,
    storage: &S,
    summarizer: &M,
    policy: &RetryPolicy,
    gate: &CapabilityGate,
    cancel: &CancellationToken,
) -> Result<SummarizeOutcome>
where
    S: Storage,
    M: Summarizer,
{
    let mut outcome = SummarizeOutcome::default();
    let content = item_text(item);
    let mut retry_count = item.retry_count.max(0) as u32;

    loop {
        if cancel.is_cancelled() || !gate.is_open(Capability::Summarizer) {
            outcome.deferred += 1;
            return Ok(outcome);
        }

        match summarizer.summarize(&item.headline, &content).await {
            Ok(summary) => {
                storage.complete_summary(item.id, &summary).await?;
                outcome.summarized += 1;
                return Ok(outcome);
            }
            Err(CapabilityError::Quota(reason)) => {
                gate.close(Capability::Summarizer);
                tracing::warn!(
                    item_id = %item.id.0,
                    %reason,
                    "Summarizer quota exhausted, deferring remaining summaries"
                );
                outcome.deferred += 1;
                return Ok(outcome);
            }
            Err(error) => {
                let message = PipelineError::ItemSummarize(error.to_string()).to_string();
                match record_failure(storage, item, retry_count, policy, &message).await? {
                    FailureOutcome::WillRetry { retry_count: next } => {
                        retry_count = next;
                        tokio::time::sleep(policy.backoff_delay(retry_count)).await;
                    }
                    FailureOutcome::Exhausted => {
                        outcome.failed += 1;
                        return Ok(outcome);
                    }
                }
            }
        }
    }
}

async fn summarize_group<S, M>(
    author: &str,
    items: &[ContentItem],
    storage: &S,
    summarizer: &M,
    policy: &RetryPolicy,
    gate: &CapabilityGate,
    cancel: &CancellationToken,
) -> Result<SummarizeOutcome>
where
    S: Storage,
    M: Summarizer,
{
    let mut outcome = SummarizeOutcome::default();
    let texts: Vec<String> = items.iter().map(item_text).collect();
    // The whole group retries together; track the worst-off item.
    let mut retry_count = items
        .iter()
        .map(|i| i.retry_count.max(0) as u32)
        .max()
        .unwrap_or(0);

    loop {
        if cancel.is_cancelled() || !gate.is_open(Capability::Summarizer) {
            outcome.deferred += items.len();
            return Ok(outcome);
        }

        let response = match summarizer.summarize_group(author, &texts).await {
            Ok(summaries) if summaries.len() == texts.len() => Ok(summaries),
            Ok(summaries) => Err(CapabilityError::Malformed(format!(
                "expected {} summaries, got {}",
                texts.len(),
                summaries.len()
            ))),
            Err(error) => Err(error),
        };

        match response {
            Ok(summaries) => {
                for (item, summary) in items.iter().zip(summaries) {
                    storage.complete_summary(item.id, &summary).await?;
                    outcome.summarized += 1;
                }
                return Ok(outcome);
            }
            Err(CapabilityError::Quota(reason)) => {
                gate.close(Capability::Summarizer);
                tracing::warn!(
                    author,
                    %reason,
                    "Summarizer quota exhausted, deferring author group"
                );
                outcome.deferred += items.len();
                return Ok(outcome);
            }
            Err(error) => {
                let message = PipelineError::ItemSummarize(error.to_string()).to_string();
                if policy.should_retry(retry_count) {
                    for item in items {
                        storage.record_retry(item.id, &message).await?;
                    }
                    retry_count += 1;
                    tracing::warn!(
                        author,
                        group_size = items.len(),
                        retry_count,
                        %error,
                        "Author group summary failed, will retry"
                    );
                    tokio::time::sleep(policy.backoff_delay(retry_count)).await;
                } else {
                    for item in items {
                        storage.mark_failed(item.id, &message).await?;
                    }
                    outcome.failed += items.len();
                    tracing::error!(
                        author,
                        group_size = items.len(),
                        %error,
                        "Author group summary failed permanently"
                    );
                    return Ok(outcome);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStorage;
    use crate::testing::{fixtures, MockSummarizer};
    use crate::types::ProcessingStage;

    fn test_config() -> PipelineConfig {
        PipelineConfig::default().with_backoff_base_ms(1)
    }

    async fn seed_pending_summary(
        storage: &MemoryStorage,
        item: &mut crate::types::ContentItem,
        content: &str,
    ) {
        storage.upsert_item(item).await.unwrap();
        storage
            .complete_enrichment(item.id, content)
            .await
            .unwrap();
        item.stage = ProcessingStage::PendingSummary;
        item.full_content = Some(content.to_string());
    }

    #[tokio::test]
    async fn test_document_items_summarized_individually() {
        let storage = MemoryStorage::new();
        let source = fixtures::document_source("Example", "https://ex.com");
        let mut a = fixtures::document_item(&source, "https://ex.com/a", "AI story A");
        let mut b = fixtures::document_item(&source, "https://ex.com/b", "AI story B");
        seed_pending_summary(&storage, &mut a, "content a").await;
        seed_pending_summary(&storage, &mut b, "content b").await;

        let summarizer = MockSummarizer::new();
        let outcome = run_summarization(
            &storage,
            &summarizer,
            &test_config(),
            &CapabilityGate::new(),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

        assert_eq!(outcome.summarized, 2);
        assert_eq!(summarizer.single_calls().len(), 2);
        assert!(summarizer.group_calls().is_empty());
        for item in storage.all_items() {
            assert_eq!(item.stage, ProcessingStage::Completed);
            assert!(item.summary.is_some());
        }
    }

    #[tokio::test]
    async fn test_stream_items_grouped_by_author() {
        let storage = MemoryStorage::new();
        let source = fixtures::stream_source("Feed", "feed");
        let mut items = Vec::new();
        for (id, author) in [("1", "alice"), ("2", "alice"), ("3", "alice"), ("4", "bob")] {
            let item = fixtures::stream_item(&source, id, author, "post about LLMs");
            storage.upsert_item(&item).await.unwrap();
            storage
                .advance_stage(item.id, ProcessingStage::PendingSummary)
                .await
                .unwrap();
            items.push(item);
        }

        let summarizer = MockSummarizer::new();
        let outcome = run_summarization(
            &storage,
            &summarizer,
            &test_config(),
            &CapabilityGate::new(),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

        assert_eq!(outcome.summarized, 4);
        let mut group_calls = summarizer.group_calls();
        group_calls.sort();
        assert_eq!(
            group_calls,
            vec![("alice".to_string(), 3), ("bob".to_string(), 1)]
        );
        assert!(summarizer.single_calls().is_empty());
    }

    #[tokio::test]
    async fn test_large_author_group_chunks_at_cap() {
        let storage = MemoryStorage::new();
        let source = fixtures::stream_source("Feed", "feed");
        for i in 0..7 {
            let id = format!("{i}");
            let item = fixtures::stream_item(&source, &id, "alice", "post about LLMs");
            storage.upsert_item(&item).await.unwrap();
            storage
                .advance_stage(item.id, ProcessingStage::PendingSummary)
                .await
                .unwrap();
        }

        let summarizer = MockSummarizer::new();
        let outcome = run_summarization(
            &storage,
            &summarizer,
            &test_config(),
            &CapabilityGate::new(),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

        assert_eq!(outcome.summarized, 7);
        let mut sizes: Vec<usize> = summarizer.group_calls().iter().map(|(_, n)| *n).collect();
        sizes.sort();
        assert_eq!(sizes, vec![2, 5]);
    }

    #[tokio::test]
    async fn test_group_shape_mismatch_retries_then_succeeds() {
        let storage = MemoryStorage::new();
        let source = fixtures::stream_source("Feed", "feed");
        let a = fixtures::stream_item(&source, "1", "alice", "post one about LLMs");
        let b = fixtures::stream_item(&source, "2", "alice", "post two about LLMs");
        for item in [&a, &b] {
            storage.upsert_item(item).await.unwrap();
            storage
                .advance_stage(item.id, ProcessingStage::PendingSummary)
                .await
                .unwrap();
        }

        let summarizer = MockSummarizer::new();
        summarizer.wrong_count_next(1);

        let outcome = run_summarization(
            &storage,
            &summarizer,
            &test_config(),
            &CapabilityGate::new(),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

        assert_eq!(outcome.summarized, 2);
        for item in storage.all_items() {
            assert_eq!(item.stage, ProcessingStage::Completed);
            assert_eq!(item.retry_count, 1);
        }
    }

    #[tokio::test]
    async fn test_group_failure_is_atomic() {
        let storage = MemoryStorage::new();
        let source = fixtures::stream_source("Feed", "feed");
        for id in ["1", "2", "3"] {
            let item = fixtures::stream_item(&source, id, "alice", "post about LLMs");
            storage.upsert_item(&item).await.unwrap();
            storage
                .advance_stage(item.id, ProcessingStage::PendingSummary)
                .await
                .unwrap();
        }

        let summarizer = MockSummarizer::new();
        // Wrong shape on every attempt the policy allows.
        summarizer.wrong_count_next(10);

        let outcome = run_summarization(
            &storage,
            &summarizer,
            &test_config(),
            &CapabilityGate::new(),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

        assert_eq!(outcome.summarized, 0);
        assert_eq!(outcome.failed, 3);
        let items = storage.all_items();
        let shared_error = items[0].error_message.clone().unwrap();
        for item in &items {
            assert_eq!(item.stage, ProcessingStage::Failed);
            assert_eq!(item.error_message.as_deref(), Some(shared_error.as_str()));
        }
    }

    #[tokio::test]
    async fn test_quota_defers_group() {
        let storage = MemoryStorage::new();
        let source = fixtures::stream_source("Feed", "feed");
        let item = fixtures::stream_item(&source, "1", "alice", "post about LLMs");
        storage.upsert_item(&item).await.unwrap();
        storage
            .advance_stage(item.id, ProcessingStage::PendingSummary)
            .await
            .unwrap();

        let summarizer = MockSummarizer::new();
        summarizer.exhaust_quota();

        let outcome = run_summarization(
            &storage,
            &summarizer,
            &test_config(),
            &CapabilityGate::new(),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

        assert_eq!(outcome.deferred, 1);
        let stored = storage.get_item(item.id).await.unwrap().unwrap();
        assert_eq!(stored.stage, ProcessingStage::PendingSummary);
        assert_eq!(stored.retry_count, 0);
    }
}
