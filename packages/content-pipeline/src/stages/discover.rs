//! Stage 1: discovery and relevance filtering.
//!
//! One invocation per source. Document sources get a homepage fetch, local
//! link extraction, the keyword pre-filter, then batched semantic
//! classification; stream sources get a feed fetch, the pre-filter, then
//! the same batched classification. Survivors are written in discovery
//! order as `pending_enrichment`, deduplicated by fingerprint on the way
//! in.

use chrono::{Duration, NaiveDate, Utc};
use regex::Regex;
use std::collections::HashSet;
use std::sync::LazyLock;
use url::Url;

use crate::config::PipelineConfig;
use crate::engine::RetryPolicy;
use crate::error::{CapabilityError, PipelineError, Result};
use crate::filter;
use crate::fingerprint::{headline_similarity, Fingerprint};
use crate::stages::{Capability, CapabilityGate};
use crate::storage::{Storage, UpsertOutcome};
use crate::traits::{Candidate, Classifier, Scraper, StreamPost, StreamSource, Verdict};
use crate::types::{
    BatchId, ContentItem, DateConfidence, ItemId, ProcessingStage, Source, SourceKind,
};

/// Per-source tallies for one discovery pass.
#[derive(Debug, Clone, Copy, Default)]
pub struct DiscoveryOutcome {
    /// Candidate links/posts seen before any filtering.
    pub checked: usize,
    /// Items newly persisted as `pending_enrichment`.
    pub discovered: usize,
    /// Candidates rejected by the pre-filter, the classifier, or the
    /// date-confidence rule. Not persisted.
    pub filtered_out: usize,
    /// Candidates already known by fingerprint or headline similarity.
    pub duplicates: usize,
    /// Candidates persisted as `failed` after a permanent batch
    /// classification failure.
    pub failed: usize,
    /// Full-content fetches avoided by filtering before Stage 2.
    pub scrape_calls_saved: usize,
}

/// A link candidate pulled from homepage markdown.
#[derive(Debug, Clone)]
struct LinkCandidate {
    title: String,
    url: String,
}

static MARKDOWN_LINK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[([^\]]+)\]\(([^)]+)\)").unwrap());

const SKIP_EXTENSIONS: &[&str] = &[
    ".jpg", ".jpeg", ".png", ".gif", ".svg", ".webp", ".ico", ".css", ".js", ".pdf",
];
const SKIP_PATH_PATTERNS: &[&str] = &["_next/image", "/images/", "/static/", "/assets/", "/favicon"];
const SOCIAL_DOMAINS: &[&str] = &[
    "twitter.com",
    "x.com",
    "facebook.com",
    "linkedin.com",
    "youtube.com",
    "instagram.com",
];
const ARTICLE_PATH_HINTS: &[&str] = &["/blog/", "/news/", "/article/", "/post/", "/story/"];

/// Extract article-looking links from homepage markdown.
///
/// Keeps links with substantive anchor text that resolve to the same
/// domain or carry an article-style path, skipping assets and social
/// profiles. Order follows appearance on the page.
fn extract_article_links(markdown: &str, base_url: &str) -> Vec<LinkCandidate> {
    let base = Url::parse(base_url).ok();
    let mut seen = HashSet::new();
    let mut links = Vec::new();

    for captures in MARKDOWN_LINK.captures_iter(markdown) {
        let title = captures[1].trim().to_string();
        let href = captures[2].trim();

        // Short anchor text is navigation, not a headline.
        if title.len() < 10 {
            continue;
        }

        let absolute = match &base {
            Some(base) => match base.join(href) {
                Ok(url) => url,
                Err(_) => continue,
            },
            None => match Url::parse(href) {
                Ok(url) => url,
                Err(_) => continue,
            },
        };

        let rendered = absolute.to_string();
        let lowered = rendered.to_lowercase();
        if SKIP_EXTENSIONS.iter().any(|ext| lowered.contains(ext)) {
            continue;
        }
        if SKIP_PATH_PATTERNS.iter().any(|p| lowered.contains(p)) {
            continue;
        }

        let Some(host) = absolute.host_str() else {
            continue;
        };
        if SOCIAL_DOMAINS.iter().any(|d| host.ends_with(d)) {
            continue;
        }

        let same_domain = base
            .as_ref()
            .and_then(|b| b.host_str())
            .map_or(false, |base_host| base_host == host);
        let article_path = ARTICLE_PATH_HINTS.iter().any(|hint| lowered.contains(hint));
        if !same_domain && !article_path {
            continue;
        }
        if absolute.path().len() <= 1 {
            continue;
        }

        if seen.insert(rendered.clone()) {
            links.push(LinkCandidate {
                title,
                url: rendered,
            });
        }
    }

    links
}

/// Headline shown for a stream item: author prefix plus the first 100
/// characters of the post, newlines collapsed.
fn derive_stream_headline(author: &str, text: &str) -> String {
    let flattened = text.replace('\n', " ");
    let flattened = flattened.trim();
    let headline = if flattened.chars().count() > 100 {
        let cut: String = flattened.chars().take(100).collect();
        format!("{}...", cut.trim_end())
    } else {
        flattened.to_string()
    };
    format!("@{author}: {headline}")
}

async fn classify_once<C: Classifier>(
    classifier: &C,
    chunk: &[Candidate],
    window: NaiveDate,
) -> std::result::Result<Vec<Verdict>, CapabilityError> {
    let verdicts = classifier.classify_batch(chunk, window).await?;
    if verdicts.len() != chunk.len() {
        return Err(CapabilityError::Malformed(format!(
            "expected {} verdicts, got {}",
            chunk.len(),
            verdicts.len()
        )));
    }
    Ok(verdicts)
}

/// One classifier call per batch, retried once with backoff. A quota error
/// is returned as-is and never retried.
async fn classify_with_retry<C: Classifier>(
    classifier: &C,
    chunk: &[Candidate],
    window: NaiveDate,
    policy: &RetryPolicy,
) -> std::result::Result<Vec<Verdict>, CapabilityError> {
    match classify_once(classifier, chunk, window).await {
        Ok(verdicts) => Ok(verdicts),
        Err(error) if error.is_quota() => Err(error),
        Err(error) => {
            tracing::warn!(
                batch_size = chunk.len(),
                %error,
                "Classifier batch failed, retrying once"
            );
            tokio::time::sleep(policy.backoff_delay(1)).await;
            classify_once(classifier, chunk, window).await
        }
    }
}

/// Discover one document-kind source.
pub async fn discover_document_source<S, R, C>(
    source: &Source,
    window: NaiveDate,
    batch_id: BatchId,
    storage: &S,
    scraper: &R,
    classifier: &C,
    gate: &CapabilityGate,
    config: &PipelineConfig,
) -> Result<DiscoveryOutcome>
where
    S: Storage,
    R: Scraper,
    C: Classifier,
{
    let policy = RetryPolicy::from_config(config);
    let mut outcome = DiscoveryOutcome::default();
    let today = Utc::now().date_naive();

    if !gate.is_open(Capability::Scraper) {
        return Err(PipelineError::QuotaExceeded {
            capability: "scraper".to_string(),
            reason: "quota exhausted earlier in this run".to_string(),
        });
    }

    let homepage = match scraper.fetch_markdown(&source.locator).await {
        Ok(page) => page,
        Err(CapabilityError::Quota(reason)) => {
            gate.close(Capability::Scraper);
            return Err(PipelineError::QuotaExceeded {
                capability: "scraper".to_string(),
                reason,
            });
        }
        Err(error) => {
            return Err(PipelineError::SourceUnavailable {
                name: source.name.clone(),
                reason: error.to_string(),
            });
        }
    };

    let links = extract_article_links(&homepage.markdown, &source.locator);
    outcome.checked = links.len();
    tracing::info!(
        source = %source.name,
        links = links.len(),
        "Homepage scraped, links extracted"
    );

    // Keyword pre-filter before any classifier spend.
    let mut candidates: Vec<LinkCandidate> = Vec::new();
    for link in links {
        if filter::pre_filter(&link.title, None) {
            candidates.push(link);
        } else {
            outcome.filtered_out += 1;
        }
    }

    // Dedup against persisted items and the recent headline window.
    let since = Utc::now() - Duration::days(config.dedup_window_days);
    let recent = storage.recent_headlines(source.id, since).await?;
    let mut batch_fingerprints: HashSet<String> = HashSet::new();
    let mut survivors: Vec<(LinkCandidate, Fingerprint)> = Vec::new();

    for link in candidates {
        let fingerprint = Fingerprint::for_document(&link.url);
        if !batch_fingerprints.insert(fingerprint.as_str().to_string()) {
            outcome.duplicates += 1;
            continue;
        }
        if storage.find_by_fingerprint(&fingerprint).await?.is_some() {
            outcome.duplicates += 1;
            continue;
        }
        let republished = recent
            .iter()
            .any(|h| headline_similarity(h, &link.title) >= config.dedup_similarity_threshold);
        if republished {
            tracing::debug!(source = %source.name, headline = %link.title, "Republished headline, skipping");
            outcome.duplicates += 1;
            continue;
        }
        survivors.push((link, fingerprint));
    }

    let mut admitted = 0usize;

    for chunk in survivors.chunks(config.classifier_batch_size) {
        if !gate.is_open(Capability::Classifier) {
            break;
        }

        let batch: Vec<Candidate> = chunk
            .iter()
            .map(|(link, _)| Candidate {
                headline: link.title.clone(),
                url: link.url.clone(),
                snippet: None,
            })
            .collect();

        let verdicts = match classify_with_retry(classifier, &batch, window, &policy).await {
            Ok(verdicts) => verdicts,
            Err(CapabilityError::Quota(reason)) => {
                gate.close(Capability::Classifier);
                tracing::warn!(source = %source.name, %reason, "Classifier quota exhausted mid-source");
                break;
            }
            Err(error) => {
                // Permanent batch failure: every candidate in the batch is
                // persisted as failed with the shared error.
                let message = PipelineError::BatchClassification(error.to_string()).to_string();
                for (link, fingerprint) in chunk {
                    let item = failed_document_item(
                        source, batch_id, window, link, fingerprint, &message,
                    );
                    storage.upsert_item(&item).await?;
                }
                outcome.failed += chunk.len();
                tracing::error!(
                    source = %source.name,
                    batch_size = chunk.len(),
                    %error,
                    "Classifier batch failed permanently, candidates marked failed"
                );
                continue;
            }
        };

        for ((link, fingerprint), verdict) in chunk.iter().zip(verdicts) {
            if !verdict.relevant {
                outcome.filtered_out += 1;
                continue;
            }

            let local = filter::local_date_confidence(&link.url, &link.title, None, window, today);
            let confidence = filter::merge_confidence(local, verdict.date_confidence);
            if confidence == DateConfidence::None {
                outcome.filtered_out += 1;
                continue;
            }

            if admitted >= config.max_items_per_source {
                outcome.filtered_out += 1;
                continue;
            }

            let item = ContentItem {
                id: ItemId::new(),
                source_id: source.id,
                kind: SourceKind::Document,
                fingerprint: fingerprint.clone(),
                headline: link.title.clone(),
                url: link.url.clone(),
                author: None,
                published_at: window,
                discovered_at: Utc::now(),
                full_content: None,
                relevant: Some(true),
                summary: None,
                tags: verdict.tags,
                stage: ProcessingStage::PendingEnrichment,
                batch_id,
                date_confidence: confidence,
                error_message: None,
                retry_count: 0,
                engagement: None,
            };

            match storage.upsert_item(&item).await? {
                UpsertOutcome::Inserted => {
                    admitted += 1;
                    outcome.discovered += 1;
                }
                UpsertOutcome::DuplicateUpdated => outcome.duplicates += 1,
            }
        }
    }

    outcome.scrape_calls_saved = outcome.checked.saturating_sub(outcome.discovered);
    tracing::info!(
        source = %source.name,
        checked = outcome.checked,
        discovered = outcome.discovered,
        filtered_out = outcome.filtered_out,
        duplicates = outcome.duplicates,
        "Document source discovery complete"
    );

    Ok(outcome)
}

fn failed_document_item(
    source: &Source,
    batch_id: BatchId,
    window: NaiveDate,
    link: &LinkCandidate,
    fingerprint: &Fingerprint,
    error: &str,
) -> ContentItem {
    ContentItem {
        id: ItemId::new(),
        source_id: source.id,
        kind: SourceKind::Document,
        fingerprint: fingerprint.clone(),
        headline: link.title.clone(),
        url: link.url.clone(),
        author: None,
        published_at: window,
        discovered_at: Utc::now(),
        full_content: None,
        relevant: None,
        summary: None,
        tags: Vec::new(),
        stage: ProcessingStage::Failed,
        batch_id,
        date_confidence: DateConfidence::None,
        error_message: Some(error.to_string()),
        retry_count: 0,
        engagement: None,
    }
}

/// Discover one stream-kind source.
pub async fn discover_stream_source<S, T, C>(
    source: &Source,
    window: NaiveDate,
    batch_id: BatchId,
    storage: &S,
    stream: &T,
    classifier: &C,
    gate: &CapabilityGate,
    config: &PipelineConfig,
) -> Result<DiscoveryOutcome>
where
    S: Storage,
    T: StreamSource,
    C: Classifier,
{
    let policy = RetryPolicy::from_config(config);
    let mut outcome = DiscoveryOutcome::default();

    if !gate.is_open(Capability::Stream) {
        return Err(PipelineError::QuotaExceeded {
            capability: "stream".to_string(),
            reason: "quota exhausted earlier in this run".to_string(),
        });
    }

    let posts = match stream.fetch_recent(&source.locator, window).await {
        Ok(posts) => posts,
        Err(CapabilityError::Quota(reason)) => {
            gate.close(Capability::Stream);
            return Err(PipelineError::QuotaExceeded {
                capability: "stream".to_string(),
                reason,
            });
        }
        Err(error) => {
            return Err(PipelineError::SourceUnavailable {
                name: source.name.clone(),
                reason: error.to_string(),
            });
        }
    };

    outcome.checked = posts.len();
    tracing::info!(
        source = %source.name,
        posts = posts.len(),
        window = %window,
        "Stream posts fetched"
    );

    let mut survivors: Vec<StreamPost> = Vec::new();
    for post in posts {
        if filter::pre_filter(&post.text, None) {
            survivors.push(post);
        } else {
            outcome.filtered_out += 1;
        }
    }

    for chunk in survivors.chunks(config.classifier_batch_size) {
        if !gate.is_open(Capability::Classifier) {
            break;
        }

        let batch: Vec<Candidate> = chunk
            .iter()
            .map(|post| Candidate {
                headline: derive_stream_headline(&post.author, &post.text),
                url: post.url.clone(),
                snippet: Some(post.text.clone()),
            })
            .collect();

        let verdicts = match classify_with_retry(classifier, &batch, window, &policy).await {
            Ok(verdicts) => verdicts,
            Err(CapabilityError::Quota(reason)) => {
                gate.close(Capability::Classifier);
                tracing::warn!(source = %source.name, %reason, "Classifier quota exhausted mid-source");
                break;
            }
            Err(error) => {
                let message = PipelineError::BatchClassification(error.to_string()).to_string();
                for post in chunk {
                    let mut item = stream_item_from_post(source, batch_id, window, post, Vec::new());
                    item.stage = ProcessingStage::Failed;
                    item.relevant = None;
                    item.error_message = Some(message.clone());
                    storage.upsert_item(&item).await?;
                }
                outcome.failed += chunk.len();
                tracing::error!(
                    source = %source.name,
                    batch_size = chunk.len(),
                    %error,
                    "Classifier batch failed permanently, posts marked failed"
                );
                continue;
            }
        };

        for (post, verdict) in chunk.iter().zip(verdicts) {
            if !verdict.relevant {
                outcome.filtered_out += 1;
                continue;
            }

            let item = stream_item_from_post(source, batch_id, window, post, verdict.tags);
            match storage.upsert_item(&item).await? {
                UpsertOutcome::Inserted => outcome.discovered += 1,
                UpsertOutcome::DuplicateUpdated => outcome.duplicates += 1,
            }
        }
    }

    tracing::info!(
        source = %source.name,
        checked = outcome.checked,
        discovered = outcome.discovered,
        filtered_out = outcome.filtered_out,
        duplicates = outcome.duplicates,
        "Stream source discovery complete"
    );

    Ok(outcome)
}

fn stream_item_from_post(
    source: &Source,
    batch_id: BatchId,
    window: NaiveDate,
    post: &StreamPost,
    tags: Vec<String>,
) -> ContentItem {
    let mut full_content = post.text.clone();
    if let Some(quoted) = &post.quoted {
        full_content.push_str("\n\n");
        full_content.push_str(quoted);
    }

    ContentItem {
        id: ItemId::new(),
        source_id: source.id,
        kind: SourceKind::Stream,
        fingerprint: Fingerprint::for_stream(&post.id),
        headline: derive_stream_headline(&post.author, &post.text),
        url: post.url.clone(),
        author: Some(post.author.clone()),
        published_at: window,
        discovered_at: Utc::now(),
        full_content: Some(full_content),
        relevant: Some(true),
        summary: None,
        tags,
        stage: ProcessingStage::PendingEnrichment,
        batch_id,
        // The platform timestamp already pinned the post to the window.
        date_confidence: DateConfidence::High,
        error_message: None,
        retry_count: 0,
        engagement: Some(post.metrics),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStorage;
    use crate::testing::{fixtures, MockClassifier, MockScraper, MockStreamSource};

    const HOMEPAGE: &str = r#"
[OpenAI ships new reasoning model](https://ex.com/2024/08/21/openai-model)
[Anthropic research on AI safety published](/2024/08/21/anthropic-safety)
[Local bakery wins regional award](/2024/08/21/bakery)
[About](/about)
[Logo](/images/logo.png)
[AI startup raises funding round](https://twitter.com/someai/status/1)
"#;

    fn window() -> NaiveDate {
        Utc::now().date_naive()
    }

    #[test]
    fn test_extract_article_links_filters_noise() {
        let links = extract_article_links(HOMEPAGE, "https://ex.com");
        let urls: Vec<&str> = links.iter().map(|l| l.url.as_str()).collect();

        assert!(urls.contains(&"https://ex.com/2024/08/21/openai-model"));
        assert!(urls.contains(&"https://ex.com/2024/08/21/anthropic-safety"));
        assert!(urls.contains(&"https://ex.com/2024/08/21/bakery"));
        // Nav link text too short, asset path, social domain: all skipped.
        assert!(!urls.iter().any(|u| u.contains("/about")));
        assert!(!urls.iter().any(|u| u.contains("logo.png")));
        assert!(!urls.iter().any(|u| u.contains("twitter.com")));
    }

    #[test]
    fn test_stream_headline_derivation() {
        let short = derive_stream_headline("karpathy", "Short take\non models");
        assert_eq!(short, "@karpathy: Short take on models");

        let long_text = "x".repeat(150);
        let long = derive_stream_headline("karpathy", &long_text);
        assert!(long.starts_with("@karpathy: "));
        assert!(long.ends_with("..."));
        assert!(long.chars().count() < 120 + "@karpathy: ".len());
    }

    #[tokio::test]
    async fn test_document_discovery_inserts_relevant_items() {
        let storage = MemoryStorage::new();
        let source = fixtures::document_source("Example", "https://ex.com");
        let scraper = MockScraper::new().with_page("https://ex.com", HOMEPAGE);
        let classifier = MockClassifier::new();
        let gate = CapabilityGate::new();
        let config = PipelineConfig::default();

        let outcome = discover_document_source(
            &source,
            window(),
            BatchId::new(),
            &storage,
            &scraper,
            &classifier,
            &gate,
            &config,
        )
        .await
        .unwrap();

        // Bakery headline dies at the pre-filter; both AI stories survive.
        assert_eq!(outcome.discovered, 2);
        assert_eq!(outcome.filtered_out, 1);
        assert_eq!(classifier.batch_sizes(), vec![2]);

        for item in storage.all_items() {
            assert_eq!(item.stage, ProcessingStage::PendingEnrichment);
            assert_eq!(item.relevant, Some(true));
            assert!(item.full_content.is_none());
        }
    }

    #[tokio::test]
    async fn test_tracking_params_collapse_to_one_item() {
        let storage = MemoryStorage::new();
        let source = fixtures::document_source("Example", "https://ex.com");
        let page = "[OpenAI ships new model](https://ex.com/a?utm_source=1)\n\
                    [OpenAI ships new model](https://ex.com/a?utm_source=2)";
        let scraper = MockScraper::new().with_page("https://ex.com", page);
        let classifier = MockClassifier::new();
        let gate = CapabilityGate::new();
        let config = PipelineConfig::default();

        let outcome = discover_document_source(
            &source,
            window(),
            BatchId::new(),
            &storage,
            &scraper,
            &classifier,
            &gate,
            &config,
        )
        .await
        .unwrap();

        assert_eq!(outcome.discovered, 1);
        assert_eq!(outcome.duplicates, 1);
        assert_eq!(storage.item_count(), 1);
        assert_eq!(
            storage.all_items()[0].fingerprint.as_str(),
            "https://ex.com/a"
        );
    }

    #[tokio::test]
    async fn test_undatable_item_dropped_not_failed() {
        let storage = MemoryStorage::new();
        let source = fixtures::document_source("Example", "https://ex.com");
        // No date in the URL, so confidence rides on the classifier alone.
        let page = "[OpenAI ships a new model, date unclear](https://ex.com/undated-story)";
        let scraper = MockScraper::new().with_page("https://ex.com", page);
        let classifier =
            MockClassifier::new().with_undated("OpenAI ships a new model, date unclear");
        let gate = CapabilityGate::new();
        let config = PipelineConfig::default();

        let outcome = discover_document_source(
            &source,
            window(),
            BatchId::new(),
            &storage,
            &scraper,
            &classifier,
            &gate,
            &config,
        )
        .await
        .unwrap();

        assert_eq!(outcome.discovered, 0);
        assert_eq!(outcome.filtered_out, 1);
        // Dropped, not failed: the item never entered the table.
        assert_eq!(storage.item_count(), 0);
    }

    #[tokio::test]
    async fn test_permanent_batch_failure_marks_all_failed() {
        let storage = MemoryStorage::new();
        let source = fixtures::document_source("Example", "https://ex.com");
        let scraper = MockScraper::new().with_page("https://ex.com", HOMEPAGE);
        let classifier = MockClassifier::new();
        classifier.fail_next(2); // first call and its one retry
        let gate = CapabilityGate::new();
        let config = PipelineConfig::default().with_backoff_base_ms(1);

        let outcome = discover_document_source(
            &source,
            window(),
            BatchId::new(),
            &storage,
            &scraper,
            &classifier,
            &gate,
            &config,
        )
        .await
        .unwrap();

        assert_eq!(outcome.discovered, 0);
        assert_eq!(outcome.failed, 2);

        let items = storage.all_items();
        assert_eq!(items.len(), 2);
        let first_error = items[0].error_message.clone().unwrap();
        for item in &items {
            assert_eq!(item.stage, ProcessingStage::Failed);
            assert_eq!(item.error_message.as_deref(), Some(first_error.as_str()));
        }
    }

    #[tokio::test]
    async fn test_rerun_dedups_and_discovers_nothing_new() {
        let storage = MemoryStorage::new();
        let source = fixtures::document_source("Example", "https://ex.com");
        let scraper = MockScraper::new().with_page("https://ex.com", HOMEPAGE);
        let classifier = MockClassifier::new();
        let gate = CapabilityGate::new();
        let config = PipelineConfig::default();

        let first = discover_document_source(
            &source,
            window(),
            BatchId::new(),
            &storage,
            &scraper,
            &classifier,
            &gate,
            &config,
        )
        .await
        .unwrap();
        let second = discover_document_source(
            &source,
            window(),
            BatchId::new(),
            &storage,
            &scraper,
            &classifier,
            &gate,
            &config,
        )
        .await
        .unwrap();

        assert_eq!(first.discovered, 2);
        assert_eq!(second.discovered, 0);
        assert_eq!(second.duplicates, 2);
        assert_eq!(storage.item_count(), 2);
        // Known fingerprints never reach the classifier again.
        assert_eq!(classifier.batch_sizes(), vec![2]);
    }

    #[tokio::test]
    async fn test_stream_discovery_stores_complete_posts() {
        let storage = MemoryStorage::new();
        let source = fixtures::stream_source("Karpathy", "karpathy");
        let stream = MockStreamSource::new().with_post(
            "karpathy",
            fixtures::stream_post("111", "karpathy", "New LLM training run results are wild"),
        );
        let classifier = MockClassifier::new();
        let gate = CapabilityGate::new();
        let config = PipelineConfig::default();

        let outcome = discover_stream_source(
            &source,
            window(),
            BatchId::new(),
            &storage,
            &stream,
            &classifier,
            &gate,
            &config,
        )
        .await
        .unwrap();

        assert_eq!(outcome.discovered, 1);
        let items = storage.all_items();
        let item = &items[0];
        assert_eq!(item.kind, SourceKind::Stream);
        assert_eq!(item.stage, ProcessingStage::PendingEnrichment);
        assert_eq!(item.fingerprint.as_str(), "stream:111");
        assert!(item.headline.starts_with("@karpathy: "));
        // Stream content arrives complete at discovery.
        assert!(item.full_content.is_some());
        assert_eq!(item.engagement.unwrap().likes, 5);
    }

    #[tokio::test]
    async fn test_stream_redelivery_updates_engagement() {
        let storage = MemoryStorage::new();
        let source = fixtures::stream_source("Karpathy", "karpathy");
        let mut post = fixtures::stream_post("111", "karpathy", "New LLM training results");
        let stream = MockStreamSource::new().with_post("karpathy", post.clone());
        let classifier = MockClassifier::new();
        let gate = CapabilityGate::new();
        let config = PipelineConfig::default();

        discover_stream_source(
            &source,
            window(),
            BatchId::new(),
            &storage,
            &stream,
            &classifier,
            &gate,
            &config,
        )
        .await
        .unwrap();

        // Same post surfaces again with more likes.
        post.metrics.likes = 50;
        let stream = MockStreamSource::new().with_post("karpathy", post);
        let outcome = discover_stream_source(
            &source,
            window(),
            BatchId::new(),
            &storage,
            &stream,
            &classifier,
            &gate,
            &config,
        )
        .await
        .unwrap();

        assert_eq!(outcome.discovered, 0);
        assert_eq!(outcome.duplicates, 1);
        let items = storage.all_items();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].engagement.unwrap().likes, 50);
    }
}
