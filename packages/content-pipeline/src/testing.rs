//! Testing utilities: mock capability implementations and entity fixtures.
//!
//! The mocks return deterministic, configurable responses and record their
//! calls so tests can assert on batching and retry behavior without real
//! network traffic.

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use std::collections::{HashMap, VecDeque};
use std::sync::RwLock;

use crate::error::CapabilityError;
use crate::traits::{
    Candidate, Classifier, ScrapedContent, Scraper, StreamPost, StreamSource, Summarizer, Verdict,
};
use crate::types::DateConfidence;

/// A mock scraper with per-URL fixtures and failure injection.
///
/// Unknown URLs succeed with synthesized markdown so tests only need to
/// configure what they assert on.
#[derive(Default)]
pub struct MockScraper {
    pages: RwLock<HashMap<String, String>>,
    failures: RwLock<HashMap<String, VecDeque<CapabilityError>>>,
    quota_exhausted: RwLock<bool>,
    calls: RwLock<Vec<String>>,
}

impl MockScraper {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fix the markdown returned for a URL.
    pub fn with_page(self, url: impl Into<String>, markdown: impl Into<String>) -> Self {
        self.pages.write().unwrap().insert(url.into(), markdown.into());
        self
    }

    /// Queue a failure for the next fetch of `url`; later fetches succeed.
    pub fn fail_once(&self, url: impl Into<String>, error: CapabilityError) {
        self.failures
            .write()
            .unwrap()
            .entry(url.into())
            .or_default()
            .push_back(error);
    }

    /// Queue `n` consecutive failures for `url`.
    pub fn fail_n_times(&self, url: impl Into<String>, n: usize, error: CapabilityError) {
        let url = url.into();
        let mut failures = self.failures.write().unwrap();
        let queue = failures.entry(url).or_default();
        for _ in 0..n {
            queue.push_back(error.clone());
        }
    }

    /// All further calls return a quota error.
    pub fn exhaust_quota(&self) {
        *self.quota_exhausted.write().unwrap() = true;
    }

    pub fn call_count(&self) -> usize {
        self.calls.read().unwrap().len()
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.read().unwrap().clone()
    }

    fn fetch(&self, url: &str) -> Result<ScrapedContent, CapabilityError> {
        self.calls.write().unwrap().push(url.to_string());

        if *self.quota_exhausted.read().unwrap() {
            return Err(CapabilityError::Quota("mock quota exhausted".into()));
        }

        if let Some(queue) = self.failures.write().unwrap().get_mut(url) {
            if let Some(error) = queue.pop_front() {
                return Err(error);
            }
        }

        let markdown = self
            .pages
            .read()
            .unwrap()
            .get(url)
            .cloned()
            .unwrap_or_else(|| format!("Full content for {url}"));

        Ok(ScrapedContent {
            url: url.to_string(),
            markdown,
            title: None,
            published_date: None,
        })
    }
}

#[async_trait]
impl Scraper for MockScraper {
    async fn fetch_markdown(&self, url: &str) -> Result<ScrapedContent, CapabilityError> {
        self.fetch(url)
    }

    async fn fetch_full(&self, url: &str) -> Result<ScrapedContent, CapabilityError> {
        self.fetch(url)
    }
}

/// A mock classifier. Defaults to relevant with high date confidence.
#[derive(Default)]
pub struct MockClassifier {
    verdicts: RwLock<HashMap<String, Verdict>>,
    fail_next: RwLock<u32>,
    quota_exhausted: RwLock<bool>,
    batch_sizes: RwLock<Vec<usize>>,
}

impl MockClassifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fix the verdict for a headline.
    pub fn with_verdict(self, headline: impl Into<String>, verdict: Verdict) -> Self {
        self.verdicts
            .write()
            .unwrap()
            .insert(headline.into(), verdict);
        self
    }

    /// Shorthand: mark a headline irrelevant.
    pub fn with_irrelevant(self, headline: impl Into<String>) -> Self {
        self.with_verdict(
            headline,
            Verdict {
                relevant: false,
                date_confidence: DateConfidence::High,
                tags: Vec::new(),
            },
        )
    }

    /// Shorthand: relevant but undatable.
    pub fn with_undated(self, headline: impl Into<String>) -> Self {
        self.with_verdict(
            headline,
            Verdict {
                relevant: true,
                date_confidence: DateConfidence::None,
                tags: Vec::new(),
            },
        )
    }

    /// The next `n` classify calls fail with a transport error.
    pub fn fail_next(&self, n: u32) {
        *self.fail_next.write().unwrap() = n;
    }

    pub fn exhaust_quota(&self) {
        *self.quota_exhausted.write().unwrap() = true;
    }

    pub fn call_count(&self) -> usize {
        self.batch_sizes.read().unwrap().len()
    }

    /// Sizes of the batches received, in call order.
    pub fn batch_sizes(&self) -> Vec<usize> {
        self.batch_sizes.read().unwrap().clone()
    }
}

#[async_trait]
impl Classifier for MockClassifier {
    async fn classify_batch(
        &self,
        candidates: &[Candidate],
        _window: NaiveDate,
    ) -> Result<Vec<Verdict>, CapabilityError> {
        self.batch_sizes.write().unwrap().push(candidates.len());

        if *self.quota_exhausted.read().unwrap() {
            return Err(CapabilityError::Quota("mock quota exhausted".into()));
        }

        {
            let mut fail_next = self.fail_next.write().unwrap();
            if *fail_next > 0 {
                *fail_next -= 1;
                return Err(CapabilityError::Unavailable(
                    "mock classifier outage".into(),
                ));
            }
        }

        let verdicts = self.verdicts.read().unwrap();
        Ok(candidates
            .iter()
            .map(|c| {
                verdicts.get(&c.headline).cloned().unwrap_or(Verdict {
                    relevant: true,
                    date_confidence: DateConfidence::High,
                    tags: Vec::new(),
                })
            })
            .collect())
    }
}

/// A mock summarizer with failure and shape-mismatch injection.
#[derive(Default)]
pub struct MockSummarizer {
    fail_next: RwLock<u32>,
    wrong_count_next: RwLock<u32>,
    quota_exhausted: RwLock<bool>,
    single_calls: RwLock<Vec<String>>,
    group_calls: RwLock<Vec<(String, usize)>>,
}

impl MockSummarizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// The next `n` summarize calls fail with a transport error.
    pub fn fail_next(&self, n: u32) {
        *self.fail_next.write().unwrap() = n;
    }

    /// The next `n` group calls return one summary too few.
    pub fn wrong_count_next(&self, n: u32) {
        *self.wrong_count_next.write().unwrap() = n;
    }

    pub fn exhaust_quota(&self) {
        *self.quota_exhausted.write().unwrap() = true;
    }

    pub fn single_calls(&self) -> Vec<String> {
        self.single_calls.read().unwrap().clone()
    }

    /// (author, group size) per group call, in call order.
    pub fn group_calls(&self) -> Vec<(String, usize)> {
        self.group_calls.read().unwrap().clone()
    }

    fn take_failure(&self) -> Option<CapabilityError> {
        if *self.quota_exhausted.read().unwrap() {
            return Some(CapabilityError::Quota("mock quota exhausted".into()));
        }
        let mut fail_next = self.fail_next.write().unwrap();
        if *fail_next > 0 {
            *fail_next -= 1;
            return Some(CapabilityError::Unavailable("mock summarizer outage".into()));
        }
        None
    }
}

#[async_trait]
impl Summarizer for MockSummarizer {
    async fn summarize(&self, headline: &str, _content: &str) -> Result<String, CapabilityError> {
        self.single_calls.write().unwrap().push(headline.to_string());
        if let Some(error) = self.take_failure() {
            return Err(error);
        }
        Ok(format!("Summary: {headline}"))
    }

    async fn summarize_group(
        &self,
        author: &str,
        texts: &[String],
    ) -> Result<Vec<String>, CapabilityError> {
        self.group_calls
            .write()
            .unwrap()
            .push((author.to_string(), texts.len()));
        if let Some(error) = self.take_failure() {
            return Err(error);
        }

        let mut count = texts.len();
        {
            let mut wrong = self.wrong_count_next.write().unwrap();
            if *wrong > 0 {
                *wrong -= 1;
                count = count.saturating_sub(1);
            }
        }

        Ok((0..count)
            .map(|i| format!("Summary of @{author} post {i}"))
            .collect())
    }
}

/// A mock stream source serving fixed posts per handle.
#[derive(Default)]
pub struct MockStreamSource {
    posts: RwLock<HashMap<String, Vec<StreamPost>>>,
    failures: RwLock<HashMap<String, VecDeque<CapabilityError>>>,
}

impl MockStreamSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_post(self, handle: impl Into<String>, post: StreamPost) -> Self {
        self.posts
            .write()
            .unwrap()
            .entry(handle.into())
            .or_default()
            .push(post);
        self
    }

    pub fn fail_once(&self, handle: impl Into<String>, error: CapabilityError) {
        self.failures
            .write()
            .unwrap()
            .entry(handle.into())
            .or_default()
            .push_back(error);
    }
}

#[async_trait]
impl StreamSource for MockStreamSource {
    async fn fetch_recent(
        &self,
        handle: &str,
        window: NaiveDate,
    ) -> Result<Vec<StreamPost>, CapabilityError> {
        if let Some(queue) = self.failures.write().unwrap().get_mut(handle) {
            if let Some(error) = queue.pop_front() {
                return Err(error);
            }
        }

        Ok(self
            .posts
            .read()
            .unwrap()
            .get(handle)
            .map(|posts| {
                posts
                    .iter()
                    .filter(|p| p.timestamp.date_naive() == window)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }
}

/// Entity fixtures shared by unit and integration tests.
pub mod fixtures {
    use super::*;
    use crate::fingerprint::Fingerprint;
    use crate::types::{
        BatchId, ContentItem, EngagementMetrics, ItemId, ProcessingStage, Source, SourceId,
        SourceKind,
    };

    pub fn document_source(name: &str, url: &str) -> Source {
        Source {
            id: SourceId::new(),
            name: name.to_string(),
            locator: url.to_string(),
            kind: SourceKind::Document,
            active: true,
            category: None,
            created_at: Utc::now(),
        }
    }

    pub fn stream_source(name: &str, handle: &str) -> Source {
        Source {
            id: SourceId::new(),
            name: name.to_string(),
            locator: handle.to_string(),
            kind: SourceKind::Stream,
            active: true,
            category: None,
            created_at: Utc::now(),
        }
    }

    /// A document item parked in `pending_enrichment`.
    pub fn document_item(source: &Source, url: &str, headline: &str) -> ContentItem {
        ContentItem {
            id: ItemId::new(),
            source_id: source.id,
            kind: SourceKind::Document,
            fingerprint: Fingerprint::for_document(url),
            headline: headline.to_string(),
            url: url.to_string(),
            author: None,
            published_at: Utc::now().date_naive(),
            discovered_at: Utc::now(),
            full_content: None,
            relevant: Some(true),
            summary: None,
            tags: Vec::new(),
            stage: ProcessingStage::PendingEnrichment,
            batch_id: BatchId::new(),
            date_confidence: crate::types::DateConfidence::High,
            error_message: None,
            retry_count: 0,
            engagement: None,
        }
    }

    /// A stream item parked in `pending_enrichment` with content already
    /// present (stream posts arrive complete).
    pub fn stream_item(source: &Source, post_id: &str, author: &str, text: &str) -> ContentItem {
        ContentItem {
            id: ItemId::new(),
            source_id: source.id,
            kind: SourceKind::Stream,
            fingerprint: Fingerprint::for_stream(post_id),
            headline: format!("@{author}: {text}"),
            url: format!("https://twitter.com/{author}/status/{post_id}"),
            author: Some(author.to_string()),
            published_at: Utc::now().date_naive(),
            discovered_at: Utc::now(),
            full_content: Some(text.to_string()),
            relevant: Some(true),
            summary: None,
            tags: Vec::new(),
            stage: ProcessingStage::PendingEnrichment,
            batch_id: BatchId::new(),
            date_confidence: crate::types::DateConfidence::High,
            error_message: None,
            retry_count: 0,
            engagement: Some(EngagementMetrics::default()),
        }
    }

    /// A stream post as fetched from the platform.
    pub fn stream_post(id: &str, author: &str, text: &str) -> StreamPost {
        StreamPost {
            id: id.to_string(),
            author: author.to_string(),
            text: text.to_string(),
            url: format!("https://twitter.com/{author}/status/{id}"),
            quoted: None,
            timestamp: Utc::now(),
            metrics: EngagementMetrics {
                likes: 5,
                reposts: 1,
                replies: 0,
                views: 100,
            },
        }
    }
}
