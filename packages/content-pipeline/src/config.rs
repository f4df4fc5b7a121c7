use serde::{Deserialize, Serialize};

/// Tuning knobs for one pipeline run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// In-place retries per item before it is marked failed.
    pub max_retries: u32,

    /// Base delay for exponential backoff between retries, in milliseconds.
    pub backoff_base_ms: u64,

    /// Candidates per classifier call.
    pub classifier_batch_size: usize,

    /// Concurrent sources during Stage 1.
    pub source_concurrency: usize,

    /// Concurrent item fetches during Stage 2 and document summaries
    /// during Stage 3.
    pub enrich_concurrency: usize,

    /// Relevant document items admitted per source per run.
    pub max_items_per_source: usize,

    /// Stream posts included in one author-group summary prompt.
    pub group_summary_cap: usize,

    /// Look-back window for headline soft dedup, in days.
    pub dedup_window_days: i64,

    /// Headline word-overlap at or above this is a duplicate.
    pub dedup_similarity_threshold: f64,

    /// Non-completed items older than this are purged by the sweep, in days.
    pub retention_days: i64,

    /// Stored full content is truncated to this many characters.
    pub max_content_chars: usize,

    /// Rows drained per stage invocation.
    pub stage_queue_limit: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            backoff_base_ms: 1_000,
            classifier_batch_size: 50,
            source_concurrency: 4,
            enrich_concurrency: 5,
            max_items_per_source: 10,
            group_summary_cap: 5,
            dedup_window_days: 7,
            dedup_similarity_threshold: 0.8,
            retention_days: 7,
            max_content_chars: 10_000,
            stage_queue_limit: 500,
        }
    }
}

impl PipelineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_backoff_base_ms(mut self, ms: u64) -> Self {
        self.backoff_base_ms = ms;
        self
    }

    pub fn with_classifier_batch_size(mut self, size: usize) -> Self {
        self.classifier_batch_size = size;
        self
    }

    pub fn with_source_concurrency(mut self, concurrency: usize) -> Self {
        self.source_concurrency = concurrency;
        self
    }

    pub fn with_enrich_concurrency(mut self, concurrency: usize) -> Self {
        self.enrich_concurrency = concurrency;
        self
    }

    pub fn with_max_items_per_source(mut self, cap: usize) -> Self {
        self.max_items_per_source = cap;
        self
    }

    pub fn with_dedup_window_days(mut self, days: i64) -> Self {
        self.dedup_window_days = days;
        self
    }

    pub fn with_retention_days(mut self, days: i64) -> Self {
        self.retention_days = days;
        self
    }
}
