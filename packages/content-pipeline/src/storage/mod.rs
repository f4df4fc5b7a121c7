//! Persistence seam for the pipeline.
//!
//! The `Storage` trait is the only interface the stages talk to. Two
//! implementations ship with the crate: `PostgresStorage` for production
//! and `MemoryStorage` for tests and development.

mod memory;
mod postgres;

pub use memory::MemoryStorage;
pub use postgres::PostgresStorage;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::fingerprint::Fingerprint;
use crate::types::{
    Batch, BatchId, ContentItem, ItemId, ProcessingStage, Source, SourceId, SourceKind,
};

/// What an item upsert did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    /// A new row was created.
    Inserted,
    /// The fingerprint already existed; engagement metrics were refreshed
    /// on the existing row.
    DuplicateUpdated,
}

#[async_trait]
pub trait Storage: Send + Sync {
    /// Active sources, optionally restricted to one kind. Re-queried each
    /// run; never cached across runs.
    async fn active_sources(&self, kind: Option<SourceKind>) -> Result<Vec<Source>>;

    /// Insert an item, or — on fingerprint collision — refresh engagement
    /// metrics on the existing row. Atomic with respect to concurrent
    /// discovery of the same fingerprint.
    async fn upsert_item(&self, item: &ContentItem) -> Result<UpsertOutcome>;

    async fn get_item(&self, id: ItemId) -> Result<Option<ContentItem>>;

    /// Look up an item id by fingerprint.
    async fn find_by_fingerprint(&self, fingerprint: &Fingerprint) -> Result<Option<ItemId>>;

    /// Headlines of recent items from one source, for soft dedup. Bounded
    /// by `since`; implementations must not scan the full table.
    async fn recent_headlines(
        &self,
        source_id: SourceId,
        since: DateTime<Utc>,
    ) -> Result<Vec<String>>;

    /// Items currently in `stage`, ordered by discovery time.
    async fn items_in_stage(
        &self,
        stage: ProcessingStage,
        limit: usize,
    ) -> Result<Vec<ContentItem>>;

    /// Move an item forward one stage without touching its content.
    async fn advance_stage(&self, id: ItemId, to: ProcessingStage) -> Result<()>;

    /// Store fetched content and advance to `pending_summary`. Clears any
    /// recorded error.
    async fn complete_enrichment(&self, id: ItemId, full_content: &str) -> Result<()>;

    /// Store the summary and advance to `completed`. Clears any recorded
    /// error.
    async fn complete_summary(&self, id: ItemId, summary: &str) -> Result<()>;

    /// Record a failed attempt: increments retry_count, sets the error,
    /// leaves the stage unchanged.
    async fn record_retry(&self, id: ItemId, error: &str) -> Result<()>;

    /// Move an item into the `failed` absorbing state.
    async fn mark_failed(&self, id: ItemId, error: &str) -> Result<()>;

    async fn create_batch(&self, batch: &Batch) -> Result<()>;

    /// Persist final per-source outcomes for a batch.
    async fn finish_batch(&self, batch: &Batch) -> Result<()>;

    async fn get_batch(&self, id: BatchId) -> Result<Option<Batch>>;

    /// Delete non-completed items discovered before `cutoff`. Returns the
    /// number of rows removed.
    async fn purge_stale(&self, cutoff: DateTime<Utc>) -> Result<u64>;
}
