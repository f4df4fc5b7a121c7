use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::fingerprint::Fingerprint;

/// Unique identifier for a source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SourceId(pub Uuid);

impl SourceId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for SourceId {
    fn default() -> Self {
        Self::new()
    }
}

/// Unique identifier for a content item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ItemId(pub Uuid);

impl ItemId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for ItemId {
    fn default() -> Self {
        Self::new()
    }
}

/// Unique identifier for a crawl batch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BatchId(pub Uuid);

impl BatchId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for BatchId {
    fn default() -> Self {
        Self::new()
    }
}

/// What shape of source this is.
///
/// Document sources are page-like: discovery fetches a homepage and article
/// URLs are fetched separately for full content. Stream sources are
/// feed-like: items arrive complete with metadata in one fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Document,
    Stream,
}

impl SourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::Document => "document",
            SourceKind::Stream => "stream",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "document" => Some(SourceKind::Document),
            "stream" => Some(SourceKind::Stream),
            _ => None,
        }
    }
}

/// A content source. Created and edited by external management tooling;
/// read-only to the pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Source {
    pub id: SourceId,
    pub name: String,
    /// Homepage URL for document sources, account handle for stream sources.
    pub locator: String,
    pub kind: SourceKind,
    pub active: bool,
    pub category: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Pipeline position of a content item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingStage {
    Discovered,
    PendingEnrichment,
    PendingSummary,
    Completed,
    Failed,
}

impl ProcessingStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProcessingStage::Discovered => "discovered",
            ProcessingStage::PendingEnrichment => "pending_enrichment",
            ProcessingStage::PendingSummary => "pending_summary",
            ProcessingStage::Completed => "completed",
            ProcessingStage::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "discovered" => Some(ProcessingStage::Discovered),
            "pending_enrichment" => Some(ProcessingStage::PendingEnrichment),
            "pending_summary" => Some(ProcessingStage::PendingSummary),
            "completed" => Some(ProcessingStage::Completed),
            "failed" => Some(ProcessingStage::Failed),
            _ => None,
        }
    }

    /// Position in the forward progression. `Failed` sits outside the
    /// ordering and is reachable from any non-terminal stage.
    pub fn rank(&self) -> u8 {
        match self {
            ProcessingStage::Discovered => 0,
            ProcessingStage::PendingEnrichment => 1,
            ProcessingStage::PendingSummary => 2,
            ProcessingStage::Completed => 3,
            ProcessingStage::Failed => 4,
        }
    }

    /// Whether a transition to `next` is legal: strictly forward, or into
    /// `Failed` from any non-terminal stage.
    pub fn can_advance_to(&self, next: ProcessingStage) -> bool {
        match next {
            ProcessingStage::Failed => !self.is_terminal(),
            _ => next.rank() == self.rank() + 1,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ProcessingStage::Completed | ProcessingStage::Failed)
    }
}

/// Confidence that an item's publication date falls in the collection window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DateConfidence {
    High,
    Low,
    None,
}

impl DateConfidence {
    pub fn as_str(&self) -> &'static str {
        match self {
            DateConfidence::High => "high",
            DateConfidence::Low => "low",
            DateConfidence::None => "none",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "high" => Some(DateConfidence::High),
            "low" => Some(DateConfidence::Low),
            "none" => Some(DateConfidence::None),
            _ => None,
        }
    }
}

/// Engagement counters for stream items.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngagementMetrics {
    pub likes: i64,
    pub reposts: i64,
    pub replies: i64,
    pub views: i64,
}

impl EngagementMetrics {
    /// Weighted engagement score: reposts carry an audience of their own.
    pub fn score(&self) -> i64 {
        self.likes + self.reposts * 2 + self.replies
    }
}

/// The unit the pipeline processes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentItem {
    pub id: ItemId,
    pub source_id: SourceId,
    pub kind: SourceKind,
    pub fingerprint: Fingerprint,
    pub headline: String,
    pub url: String,
    /// Stream author handle, used for summary grouping.
    pub author: Option<String>,
    pub published_at: NaiveDate,
    pub discovered_at: DateTime<Utc>,
    pub full_content: Option<String>,
    pub relevant: Option<bool>,
    pub summary: Option<String>,
    pub tags: Vec<String>,
    pub stage: ProcessingStage,
    pub batch_id: BatchId,
    pub date_confidence: DateConfidence,
    pub error_message: Option<String>,
    pub retry_count: i32,
    pub engagement: Option<EngagementMetrics>,
}

impl ContentItem {
    /// Whether Stage 2 still needs to fetch content for this item.
    pub fn needs_content_fetch(&self) -> bool {
        self.full_content.is_none()
    }
}

/// Per-source outcome within a batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceOutcome {
    pub source_id: SourceId,
    pub source_name: String,
    pub items_discovered: usize,
    pub error: Option<String>,
}

impl SourceOutcome {
    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }
}

/// One invocation of Stage 1: the set of sources attempted and what each
/// produced. Immutable once the run terminates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Batch {
    pub id: BatchId,
    pub created_at: DateTime<Utc>,
    pub sources: Vec<SourceOutcome>,
}

impl Batch {
    pub fn new() -> Self {
        Self {
            id: BatchId::new(),
            created_at: Utc::now(),
            sources: Vec::new(),
        }
    }
}

impl Default for Batch {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_forward_transitions() {
        use ProcessingStage::*;
        assert!(Discovered.can_advance_to(PendingEnrichment));
        assert!(PendingEnrichment.can_advance_to(PendingSummary));
        assert!(PendingSummary.can_advance_to(Completed));

        assert!(!PendingSummary.can_advance_to(PendingEnrichment));
        assert!(!Completed.can_advance_to(PendingEnrichment));
        assert!(!Discovered.can_advance_to(PendingSummary));
    }

    #[test]
    fn test_failed_reachable_from_non_terminal_only() {
        use ProcessingStage::*;
        assert!(Discovered.can_advance_to(Failed));
        assert!(PendingEnrichment.can_advance_to(Failed));
        assert!(PendingSummary.can_advance_to(Failed));
        assert!(!Completed.can_advance_to(Failed));
        assert!(!Failed.can_advance_to(Failed));
    }

    #[test]
    fn test_stage_round_trip() {
        for stage in [
            ProcessingStage::Discovered,
            ProcessingStage::PendingEnrichment,
            ProcessingStage::PendingSummary,
            ProcessingStage::Completed,
            ProcessingStage::Failed,
        ] {
            assert_eq!(ProcessingStage::parse(stage.as_str()), Some(stage));
        }
        assert_eq!(ProcessingStage::parse("bogus"), None);
    }

    #[test]
    fn test_engagement_score() {
        let metrics = EngagementMetrics {
            likes: 10,
            reposts: 3,
            replies: 2,
            views: 1000,
        };
        assert_eq!(metrics.score(), 18);
    }
}
