//! In-memory storage implementation for testing and development.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::RwLock;

use crate::error::{PipelineError, Result};
use crate::fingerprint::Fingerprint;
use crate::storage::{Storage, UpsertOutcome};
use crate::types::{
    Batch, BatchId, ContentItem, ItemId, ProcessingStage, Source, SourceId, SourceKind,
};

/// In-memory storage for sources, items, and batches.
///
/// Enforces the same invariants as the Postgres implementation: unique
/// fingerprints and forward-only stage transitions. Data is lost on drop.
pub struct MemoryStorage {
    sources: RwLock<Vec<Source>>,
    items: RwLock<HashMap<ItemId, ContentItem>>,
    by_fingerprint: RwLock<HashMap<String, ItemId>>,
    batches: RwLock<HashMap<BatchId, Batch>>,
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self {
            sources: RwLock::new(Vec::new()),
            items: RwLock::new(HashMap::new()),
            by_fingerprint: RwLock::new(HashMap::new()),
            batches: RwLock::new(HashMap::new()),
        }
    }

    /// Seed a source (the pipeline itself never writes sources).
    pub fn add_source(&self, source: Source) {
        self.sources.write().unwrap().push(source);
    }

    pub fn item_count(&self) -> usize {
        self.items.read().unwrap().len()
    }

    /// All items, for test assertions.
    pub fn all_items(&self) -> Vec<ContentItem> {
        let mut items: Vec<_> = self.items.read().unwrap().values().cloned().collect();
        items.sort_by_key(|i| (i.discovered_at, i.id.0));
        items
    }

    fn update_item<F>(&self, id: ItemId, f: F) -> Result<()>
    where
        F: FnOnce(&mut ContentItem) -> Result<()>,
    {
        let mut items = self.items.write().unwrap();
        let item = items.get_mut(&id).ok_or_else(|| {
            PipelineError::Storage(format!("no such item: {}", id.0).into())
        })?;
        f(item)
    }

    fn check_transition(item: &ContentItem, to: ProcessingStage) -> Result<()> {
        if !item.stage.can_advance_to(to) {
            return Err(PipelineError::Storage(
                format!(
                    "illegal stage transition {} -> {} for item {}",
                    item.stage.as_str(),
                    to.as_str(),
                    item.id.0
                )
                .into(),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn active_sources(&self, kind: Option<SourceKind>) -> Result<Vec<Source>> {
        Ok(self
            .sources
            .read()
            .unwrap()
            .iter()
            .filter(|s| s.active && kind.map_or(true, |k| s.kind == k))
            .cloned()
            .collect())
    }

    async fn upsert_item(&self, item: &ContentItem) -> Result<UpsertOutcome> {
        // Single write lock over both maps keeps insert + index atomic.
        let mut fingerprints = self.by_fingerprint.write().unwrap();
        let mut items = self.items.write().unwrap();

        if let Some(existing_id) = fingerprints.get(item.fingerprint.as_str()) {
            if let Some(existing) = items.get_mut(existing_id) {
                existing.engagement = item.engagement.or(existing.engagement);
            }
            return Ok(UpsertOutcome::DuplicateUpdated);
        }

        fingerprints.insert(item.fingerprint.as_str().to_string(), item.id);
        items.insert(item.id, item.clone());
        Ok(UpsertOutcome::Inserted)
    }

    async fn get_item(&self, id: ItemId) -> Result<Option<ContentItem>> {
        Ok(self.items.read().unwrap().get(&id).cloned())
    }

    async fn find_by_fingerprint(&self, fingerprint: &Fingerprint) -> Result<Option<ItemId>> {
        Ok(self
            .by_fingerprint
            .read()
            .unwrap()
            .get(fingerprint.as_str())
            .copied())
    }

    async fn recent_headlines(
        &self,
        source_id: SourceId,
        since: DateTime<Utc>,
    ) -> Result<Vec<String>> {
        Ok(self
            .items
            .read()
            .unwrap()
            .values()
            .filter(|i| i.source_id == source_id && i.discovered_at >= since)
            .map(|i| i.headline.clone())
            .collect())
    }

    async fn items_in_stage(
        &self,
        stage: ProcessingStage,
        limit: usize,
    ) -> Result<Vec<ContentItem>> {
        let mut matching: Vec<_> = self
            .items
            .read()
            .unwrap()
            .values()
            .filter(|i| i.stage == stage)
            .cloned()
            .collect();
        matching.sort_by_key(|i| (i.discovered_at, i.id.0));
        matching.truncate(limit);
        Ok(matching)
    }

    async fn advance_stage(&self, id: ItemId, to: ProcessingStage) -> Result<()> {
        self.update_item(id, |item| {
            Self::check_transition(item, to)?;
            item.stage = to;
            item.error_message = None;
            Ok(())
        })
    }

    async fn complete_enrichment(&self, id: ItemId, full_content: &str) -> Result<()> {
        self.update_item(id, |item| {
            Self::check_transition(item, ProcessingStage::PendingSummary)?;
            item.full_content = Some(full_content.to_string());
            item.stage = ProcessingStage::PendingSummary;
            item.error_message = None;
            Ok(())
        })
    }

    async fn complete_summary(&self, id: ItemId, summary: &str) -> Result<()> {
        self.update_item(id, |item| {
            Self::check_transition(item, ProcessingStage::Completed)?;
            item.summary = Some(summary.to_string());
            item.stage = ProcessingStage::Completed;
            item.error_message = None;
            Ok(())
        })
    }

    async fn record_retry(&self, id: ItemId, error: &str) -> Result<()> {
        self.update_item(id, |item| {
            item.retry_count += 1;
            item.error_message = Some(error.to_string());
            Ok(())
        })
    }

    async fn mark_failed(&self, id: ItemId, error: &str) -> Result<()> {
        self.update_item(id, |item| {
            Self::check_transition(item, ProcessingStage::Failed)?;
            item.stage = ProcessingStage::Failed;
            item.error_message = Some(error.to_string());
            Ok(())
        })
    }

    async fn create_batch(&self, batch: &Batch) -> Result<()> {
        self.batches
            .write()
            .unwrap()
            .insert(batch.id, batch.clone());
        Ok(())
    }

    async fn finish_batch(&self, batch: &Batch) -> Result<()> {
        self.batches
            .write()
            .unwrap()
            .insert(batch.id, batch.clone());
        Ok(())
    }

    async fn get_batch(&self, id: BatchId) -> Result<Option<Batch>> {
        Ok(self.batches.read().unwrap().get(&id).cloned())
    }

    async fn purge_stale(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let mut fingerprints = self.by_fingerprint.write().unwrap();
        let mut items = self.items.write().unwrap();

        let stale: Vec<ItemId> = items
            .values()
            .filter(|i| i.stage != ProcessingStage::Completed && i.discovered_at < cutoff)
            .map(|i| i.id)
            .collect();

        for id in &stale {
            if let Some(item) = items.remove(id) {
                fingerprints.remove(item.fingerprint.as_str());
            }
        }
        Ok(stale.len() as u64)
    }
}
