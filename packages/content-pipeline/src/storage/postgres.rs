//! Postgres storage implementation.
//!
//! Stage transitions are guarded in SQL (`WHERE processing_stage = ...`)
//! so a concurrent or replayed update can never move an item backwards.
//! Fingerprint uniqueness is a DB constraint; the insert race between two
//! workers discovering the same item resolves through `ON CONFLICT`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};

use crate::error::{PipelineError, Result};
use crate::fingerprint::Fingerprint;
use crate::storage::{Storage, UpsertOutcome};
use crate::types::{
    Batch, BatchId, ContentItem, DateConfidence, EngagementMetrics, ItemId, ProcessingStage,
    Source, SourceId, SourceKind, SourceOutcome,
};

pub struct PostgresStorage {
    pool: PgPool,
}

impl PostgresStorage {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Run embedded migrations.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(PipelineError::storage)?;
        Ok(())
    }

    fn item_from_row(row: &sqlx::postgres::PgRow) -> Result<ContentItem> {
        let kind_str: String = row.get("kind");
        let kind = SourceKind::parse(&kind_str)
            .ok_or_else(|| PipelineError::Storage(format!("bad kind: {kind_str}").into()))?;

        let stage_str: String = row.get("processing_stage");
        let stage = ProcessingStage::parse(&stage_str)
            .ok_or_else(|| PipelineError::Storage(format!("bad stage: {stage_str}").into()))?;

        let confidence_str: String = row.get("date_confidence");
        let date_confidence = DateConfidence::parse(&confidence_str).ok_or_else(|| {
            PipelineError::Storage(format!("bad date_confidence: {confidence_str}").into())
        })?;

        let likes: Option<i64> = row.get("like_count");
        let engagement = likes.map(|likes| EngagementMetrics {
            likes,
            reposts: row.get::<Option<i64>, _>("repost_count").unwrap_or(0),
            replies: row.get::<Option<i64>, _>("reply_count").unwrap_or(0),
            views: row.get::<Option<i64>, _>("view_count").unwrap_or(0),
        });

        Ok(ContentItem {
            id: ItemId(row.get("id")),
            source_id: SourceId(row.get("source_id")),
            kind,
            fingerprint: Fingerprint::from_stored(row.get::<String, _>("fingerprint")),
            headline: row.get("headline"),
            url: row.get("url"),
            author: row.get("author"),
            published_at: row.get("published_at"),
            discovered_at: row.get("discovered_at"),
            full_content: row.get("full_content"),
            relevant: row.get("relevant"),
            summary: row.get("summary"),
            tags: row.get("tags"),
            stage,
            batch_id: BatchId(row.get("batch_id")),
            date_confidence,
            error_message: row.get("error_message"),
            retry_count: row.get("retry_count"),
            engagement,
        })
    }

    /// Update an item's stage with a SQL-side guard on the current stage.
    async fn guarded_stage_update(
        &self,
        id: ItemId,
        from: ProcessingStage,
        to: ProcessingStage,
    ) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE content_items
            SET processing_stage = $3, error_message = NULL
            WHERE id = $1 AND processing_stage = $2
            "#,
        )
        .bind(id.0)
        .bind(from.as_str())
        .bind(to.as_str())
        .execute(&self.pool)
        .await
        .map_err(PipelineError::storage)?;

        if result.rows_affected() == 0 {
            return Err(PipelineError::Storage(
                format!(
                    "item {} not in stage {} (transition to {} refused)",
                    id.0,
                    from.as_str(),
                    to.as_str()
                )
                .into(),
            ));
        }
        Ok(())
    }
}

const ITEM_COLUMNS: &str = r#"
    id, source_id, kind, fingerprint, headline, url, author, published_at,
    discovered_at, full_content, relevant, summary, tags, processing_stage,
    batch_id, date_confidence, error_message, retry_count,
    like_count, repost_count, reply_count, view_count
"#;

#[async_trait]
impl Storage for PostgresStorage {
    async fn active_sources(&self, kind: Option<SourceKind>) -> Result<Vec<Source>> {
        let rows = sqlx::query(
            r#"
            SELECT id, name, locator, kind, active, category, created_at
            FROM sources
            WHERE active = TRUE AND ($1::text IS NULL OR kind = $1)
            ORDER BY created_at, id
            "#,
        )
        .bind(kind.map(|k| k.as_str()))
        .fetch_all(&self.pool)
        .await
        .map_err(PipelineError::storage)?;

        rows.into_iter()
            .map(|row| {
                let kind_str: String = row.get("kind");
                let kind = SourceKind::parse(&kind_str).ok_or_else(|| {
                    PipelineError::Storage(format!("bad source kind: {kind_str}").into())
                })?;
                Ok(Source {
                    id: SourceId(row.get("id")),
                    name: row.get("name"),
                    locator: row.get("locator"),
                    kind,
                    active: row.get("active"),
                    category: row.get("category"),
                    created_at: row.get("created_at"),
                })
            })
            .collect()
    }

    async fn upsert_item(&self, item: &ContentItem) -> Result<UpsertOutcome> {
        // xmax = 0 means the row was inserted, xmax > 0 means the conflict
        // branch updated an existing row.
        let row = sqlx::query(
            r#"
            INSERT INTO content_items (
                id, source_id, kind, fingerprint, headline, url, author,
                published_at, discovered_at, full_content, relevant, summary,
                tags, processing_stage, batch_id, date_confidence,
                error_message, retry_count,
                like_count, repost_count, reply_count, view_count
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12,
                    $13, $14, $15, $16, $17, $18, $19, $20, $21, $22)
            ON CONFLICT (fingerprint) DO UPDATE SET
                like_count = COALESCE(EXCLUDED.like_count, content_items.like_count),
                repost_count = COALESCE(EXCLUDED.repost_count, content_items.repost_count),
                reply_count = COALESCE(EXCLUDED.reply_count, content_items.reply_count),
                view_count = COALESCE(EXCLUDED.view_count, content_items.view_count)
            RETURNING (xmax = 0) AS was_inserted
            "#,
        )
        .bind(item.id.0)
        .bind(item.source_id.0)
        .bind(item.kind.as_str())
        .bind(item.fingerprint.as_str())
        .bind(&item.headline)
        .bind(&item.url)
        .bind(&item.author)
        .bind(item.published_at)
        .bind(item.discovered_at)
        .bind(&item.full_content)
        .bind(item.relevant)
        .bind(&item.summary)
        .bind(&item.tags)
        .bind(item.stage.as_str())
        .bind(item.batch_id.0)
        .bind(item.date_confidence.as_str())
        .bind(&item.error_message)
        .bind(item.retry_count)
        .bind(item.engagement.map(|e| e.likes))
        .bind(item.engagement.map(|e| e.reposts))
        .bind(item.engagement.map(|e| e.replies))
        .bind(item.engagement.map(|e| e.views))
        .fetch_one(&self.pool)
        .await
        .map_err(PipelineError::storage)?;

        if row.get::<bool, _>("was_inserted") {
            Ok(UpsertOutcome::Inserted)
        } else {
            Ok(UpsertOutcome::DuplicateUpdated)
        }
    }

    async fn get_item(&self, id: ItemId) -> Result<Option<ContentItem>> {
        let row = sqlx::query(&format!(
            "SELECT {ITEM_COLUMNS} FROM content_items WHERE id = $1"
        ))
        .bind(id.0)
        .fetch_optional(&self.pool)
        .await
        .map_err(PipelineError::storage)?;

        row.map(|r| Self::item_from_row(&r)).transpose()
    }

    async fn find_by_fingerprint(&self, fingerprint: &Fingerprint) -> Result<Option<ItemId>> {
        let row = sqlx::query("SELECT id FROM content_items WHERE fingerprint = $1")
            .bind(fingerprint.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(PipelineError::storage)?;

        Ok(row.map(|r| ItemId(r.get("id"))))
    }

    async fn recent_headlines(
        &self,
        source_id: SourceId,
        since: DateTime<Utc>,
    ) -> Result<Vec<String>> {
        let rows = sqlx::query(
            r#"
            SELECT headline FROM content_items
            WHERE source_id = $1 AND discovered_at >= $2
            ORDER BY discovered_at DESC
            LIMIT 500
            "#,
        )
        .bind(source_id.0)
        .bind(since)
        .fetch_all(&self.pool)
        .await
        .map_err(PipelineError::storage)?;

        Ok(rows.into_iter().map(|r| r.get("headline")).collect())
    }

    async fn items_in_stage(
        &self,
        stage: ProcessingStage,
        limit: usize,
    ) -> Result<Vec<ContentItem>> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {ITEM_COLUMNS} FROM content_items
            WHERE processing_stage = $1
            ORDER BY discovered_at, id
            LIMIT $2
            "#
        ))
        .bind(stage.as_str())
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(PipelineError::storage)?;

        rows.iter().map(Self::item_from_row).collect()
    }

    async fn advance_stage(&self, id: ItemId, to: ProcessingStage) -> Result<()> {
        let from = match to {
            ProcessingStage::PendingEnrichment => ProcessingStage::Discovered,
            ProcessingStage::PendingSummary => ProcessingStage::PendingEnrichment,
            ProcessingStage::Completed => ProcessingStage::PendingSummary,
            other => {
                return Err(PipelineError::Storage(
                    format!("advance_stage cannot target {}", other.as_str()).into(),
                ))
            }
        };
        self.guarded_stage_update(id, from, to).await
    }

    async fn complete_enrichment(&self, id: ItemId, full_content: &str) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE content_items
            SET full_content = $2,
                processing_stage = 'pending_summary',
                error_message = NULL
            WHERE id = $1 AND processing_stage = 'pending_enrichment'
            "#,
        )
        .bind(id.0)
        .bind(full_content)
        .execute(&self.pool)
        .await
        .map_err(PipelineError::storage)?;

        if result.rows_affected() == 0 {
            return Err(PipelineError::Storage(
                format!("item {} not pending enrichment", id.0).into(),
            ));
        }
        Ok(())
    }

    async fn complete_summary(&self, id: ItemId, summary: &str) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE content_items
            SET summary = $2,
                processing_stage = 'completed',
                error_message = NULL
            WHERE id = $1 AND processing_stage = 'pending_summary'
            "#,
        )
        .bind(id.0)
        .bind(summary)
        .execute(&self.pool)
        .await
        .map_err(PipelineError::storage)?;

        if result.rows_affected() == 0 {
            return Err(PipelineError::Storage(
                format!("item {} not pending summary", id.0).into(),
            ));
        }
        Ok(())
    }

    async fn record_retry(&self, id: ItemId, error: &str) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE content_items
            SET retry_count = retry_count + 1, error_message = $2
            WHERE id = $1
            "#,
        )
        .bind(id.0)
        .bind(error)
        .execute(&self.pool)
        .await
        .map_err(PipelineError::storage)?;
        Ok(())
    }

    async fn mark_failed(&self, id: ItemId, error: &str) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE content_items
            SET processing_stage = 'failed', error_message = $2
            WHERE id = $1 AND processing_stage NOT IN ('completed', 'failed')
            "#,
        )
        .bind(id.0)
        .bind(error)
        .execute(&self.pool)
        .await
        .map_err(PipelineError::storage)?;

        if result.rows_affected() == 0 {
            return Err(PipelineError::Storage(
                format!("item {} already terminal", id.0).into(),
            ));
        }
        Ok(())
    }

    async fn create_batch(&self, batch: &Batch) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO crawl_batches (id, created_at, sources)
            VALUES ($1, $2, $3)
            "#,
        )
        .bind(batch.id.0)
        .bind(batch.created_at)
        .bind(serde_json::to_value(&batch.sources).map_err(PipelineError::storage)?)
        .execute(&self.pool)
        .await
        .map_err(PipelineError::storage)?;
        Ok(())
    }

    async fn finish_batch(&self, batch: &Batch) -> Result<()> {
        sqlx::query("UPDATE crawl_batches SET sources = $2 WHERE id = $1")
            .bind(batch.id.0)
            .bind(serde_json::to_value(&batch.sources).map_err(PipelineError::storage)?)
            .execute(&self.pool)
            .await
            .map_err(PipelineError::storage)?;
        Ok(())
    }

    async fn get_batch(&self, id: BatchId) -> Result<Option<Batch>> {
        let row = sqlx::query("SELECT id, created_at, sources FROM crawl_batches WHERE id = $1")
            .bind(id.0)
            .fetch_optional(&self.pool)
            .await
            .map_err(PipelineError::storage)?;

        row.map(|r| {
            let sources: Vec<SourceOutcome> =
                serde_json::from_value(r.get("sources")).map_err(PipelineError::storage)?;
            Ok(Batch {
                id: BatchId(r.get("id")),
                created_at: r.get("created_at"),
                sources,
            })
        })
        .transpose()
    }

    async fn purge_stale(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query(
            r#"
            DELETE FROM content_items
            WHERE processing_stage != 'completed' AND discovered_at < $1
            "#,
        )
        .bind(cutoff)
        .execute(&self.pool)
        .await
        .map_err(PipelineError::storage)?;

        Ok(result.rows_affected())
    }
}
