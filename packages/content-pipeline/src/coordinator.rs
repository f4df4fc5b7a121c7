//! Top-level run coordinator.
//!
//! Sequences the stages for one invocation: Stage 1 fans out across active
//! sources with bounded concurrency and per-source failure isolation;
//! Stages 2 and 3 drain their pending queues regardless of which batch
//! originally produced the items, so one invocation finishes older stuck
//! items alongside new ones.

use chrono::{Duration, NaiveDate, Utc};
use futures::future::join_all;
use std::time::Instant;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

use crate::config::PipelineConfig;
use crate::error::Result;
use crate::stages::discover::{discover_document_source, discover_stream_source};
use crate::stages::enrich::run_enrichment;
use crate::stages::summarize::run_summarization;
use crate::stages::CapabilityGate;
use crate::storage::Storage;
use crate::traits::{Classifier, Scraper, StreamSource, Summarizer};
use crate::types::{Batch, BatchId, SourceKind, SourceOutcome};

/// Which stages one invocation runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageSelection {
    All,
    Discovery,
    Enrichment,
    Summarization,
}

impl StageSelection {
    pub fn includes_discovery(&self) -> bool {
        matches!(self, StageSelection::All | StageSelection::Discovery)
    }

    pub fn includes_enrichment(&self) -> bool {
        matches!(self, StageSelection::All | StageSelection::Enrichment)
    }

    pub fn includes_summarization(&self) -> bool {
        matches!(self, StageSelection::All | StageSelection::Summarization)
    }
}

impl std::str::FromStr for StageSelection {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "all" => Ok(StageSelection::All),
            "1" | "discovery" => Ok(StageSelection::Discovery),
            "2" | "enrichment" => Ok(StageSelection::Enrichment),
            "3" | "summarization" | "summary" => Ok(StageSelection::Summarization),
            other => Err(format!(
                "unknown stage '{other}' (expected all, 1, 2, or 3)"
            )),
        }
    }
}

/// Aggregate result of one pipeline invocation. The sole output contract
/// toward scheduler/operator tooling.
#[derive(Debug, Clone)]
pub struct BatchReport {
    /// Set when Stage 1 ran and created a batch.
    pub batch_id: Option<BatchId>,
    pub window: NaiveDate,
    pub sources_attempted: usize,
    pub sources_succeeded: usize,
    pub items_discovered: usize,
    pub items_filtered_out: usize,
    pub items_deduplicated: usize,
    pub items_enriched: usize,
    pub items_summarized: usize,
    pub items_failed: usize,
    pub scrape_calls_saved: usize,
    /// Capabilities whose quota ran out during the run.
    pub quota_exhausted: Vec<String>,
    pub elapsed: std::time::Duration,
}

impl BatchReport {
    fn new(window: NaiveDate) -> Self {
        Self {
            batch_id: None,
            window,
            sources_attempted: 0,
            sources_succeeded: 0,
            items_discovered: 0,
            items_filtered_out: 0,
            items_deduplicated: 0,
            items_enriched: 0,
            items_summarized: 0,
            items_failed: 0,
            scrape_calls_saved: 0,
            quota_exhausted: Vec::new(),
            elapsed: std::time::Duration::ZERO,
        }
    }
}

impl std::fmt::Display for BatchReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Pipeline run for {}", self.window)?;
        match self.batch_id {
            Some(id) => writeln!(f, "  batch:             {}", id.0)?,
            None => writeln!(f, "  batch:             (no discovery stage)")?,
        }
        writeln!(
            f,
            "  sources:           {}/{} succeeded",
            self.sources_succeeded, self.sources_attempted
        )?;
        writeln!(f, "  discovered:        {}", self.items_discovered)?;
        writeln!(f, "  filtered out:      {}", self.items_filtered_out)?;
        writeln!(f, "  duplicates:        {}", self.items_deduplicated)?;
        writeln!(f, "  enriched:          {}", self.items_enriched)?;
        writeln!(f, "  summarized:        {}", self.items_summarized)?;
        writeln!(f, "  failed:            {}", self.items_failed)?;
        writeln!(f, "  scrape calls saved: {}", self.scrape_calls_saved)?;
        if !self.quota_exhausted.is_empty() {
            writeln!(f, "  QUOTA EXHAUSTED:   {}", self.quota_exhausted.join(", "))?;
        }
        write!(f, "  elapsed:           {:.1}s", self.elapsed.as_secs_f64())
    }
}

/// Drives a full pipeline run against concrete capability implementations.
pub struct RunCoordinator<S, R, T, C, M> {
    storage: S,
    scraper: R,
    stream: T,
    classifier: C,
    summarizer: M,
    config: PipelineConfig,
}

impl<S, R, T, C, M> RunCoordinator<S, R, T, C, M>
where
    S: Storage,
    R: Scraper,
    T: StreamSource,
    C: Classifier,
    M: Summarizer,
{
    pub fn new(storage: S, scraper: R, stream: T, classifier: C, summarizer: M) -> Self {
        Self {
            storage,
            scraper,
            stream,
            classifier,
            summarizer,
            config: PipelineConfig::default(),
        }
    }

    pub fn with_config(mut self, config: PipelineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    /// Run the selected stages for the given collection window.
    pub async fn run(&self, stages: StageSelection, window: NaiveDate) -> Result<BatchReport> {
        self.run_with_cancel(stages, window, &CancellationToken::new())
            .await
    }

    /// Run with an external cancellation token. Cancellation stops
    /// unscheduled units; in-flight units finish and persist their state.
    pub async fn run_with_cancel(
        &self,
        stages: StageSelection,
        window: NaiveDate,
        cancel: &CancellationToken,
    ) -> Result<BatchReport> {
        let started = Instant::now();
        let gate = CapabilityGate::new();
        let mut report = BatchReport::new(window);

        if stages.includes_discovery() && !cancel.is_cancelled() {
            self.run_discovery(window, cancel, &gate, &mut report).await?;
        }

        if stages.includes_enrichment() && !cancel.is_cancelled() {
            let outcome =
                run_enrichment(&self.storage, &self.scraper, &self.config, &gate, cancel).await?;
            report.items_enriched = outcome.enriched;
            report.items_failed += outcome.failed;
        }

        if stages.includes_summarization() && !cancel.is_cancelled() {
            let outcome =
                run_summarization(&self.storage, &self.summarizer, &self.config, &gate, cancel)
                    .await?;
            report.items_summarized = outcome.summarized;
            report.items_failed += outcome.failed;
        }

        report.quota_exhausted = gate.exhausted();
        report.elapsed = started.elapsed();
        tracing::info!(
            window = %window,
            discovered = report.items_discovered,
            enriched = report.items_enriched,
            summarized = report.items_summarized,
            failed = report.items_failed,
            elapsed_ms = report.elapsed.as_millis(),
            "Pipeline run complete"
        );
        Ok(report)
    }

    async fn run_discovery(
        &self,
        window: NaiveDate,
        cancel: &CancellationToken,
        gate: &CapabilityGate,
        report: &mut BatchReport,
    ) -> Result<()> {
        let mut batch = Batch::new();
        self.storage.create_batch(&batch).await?;
        report.batch_id = Some(batch.id);

        let sources = self.storage.active_sources(None).await?;
        tracing::info!(
            batch_id = %batch.id.0,
            sources = sources.len(),
            window = %window,
            "Starting discovery"
        );

        let semaphore = Semaphore::new(self.config.source_concurrency);
        let batch_id = batch.id;
        let futures = sources.iter().map(|source| {
            let semaphore = &semaphore;
            async move {
                let _permit = semaphore.acquire().await.unwrap();
                if cancel.is_cancelled() {
                    return None;
                }
                let result = match source.kind {
                    SourceKind::Document => {
                        discover_document_source(
                            source,
                            window,
                            batch_id,
                            &self.storage,
                            &self.scraper,
                            &self.classifier,
                            gate,
                            &self.config,
                        )
                        .await
                    }
                    SourceKind::Stream => {
                        discover_stream_source(
                            source,
                            window,
                            batch_id,
                            &self.storage,
                            &self.stream,
                            &self.classifier,
                            gate,
                            &self.config,
                        )
                        .await
                    }
                };
                Some((source, result))
            }
        });

        for entry in join_all(futures).await {
            // Units never scheduled (cancelled) are not counted as attempted.
            let Some((source, result)) = entry else {
                continue;
            };
            report.sources_attempted += 1;

            match result {
                Ok(outcome) => {
                    report.sources_succeeded += 1;
                    report.items_discovered += outcome.discovered;
                    report.items_filtered_out += outcome.filtered_out;
                    report.items_deduplicated += outcome.duplicates;
                    report.items_failed += outcome.failed;
                    report.scrape_calls_saved += outcome.scrape_calls_saved;
                    batch.sources.push(SourceOutcome {
                        source_id: source.id,
                        source_name: source.name.clone(),
                        items_discovered: outcome.discovered,
                        error: None,
                    });
                }
                Err(error) => {
                    tracing::error!(
                        source = %source.name,
                        %error,
                        "Source discovery failed, continuing with remaining sources"
                    );
                    batch.sources.push(SourceOutcome {
                        source_id: source.id,
                        source_name: source.name.clone(),
                        items_discovered: 0,
                        error: Some(error.to_string()),
                    });
                }
            }
        }

        self.storage.finish_batch(&batch).await?;
        Ok(())
    }

    /// Maintenance sweep: delete non-completed items older than the
    /// retention window.
    pub async fn purge_stale(&self) -> Result<u64> {
        let cutoff = Utc::now() - Duration::days(self.config.retention_days);
        let purged = self.storage.purge_stale(cutoff).await?;
        tracing::info!(purged, cutoff = %cutoff, "Purged stale items");
        Ok(purged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CapabilityError;
    use crate::storage::MemoryStorage;
    use crate::testing::{fixtures, MockClassifier, MockScraper, MockStreamSource, MockSummarizer};
    use crate::types::ProcessingStage;

    fn window() -> NaiveDate {
        Utc::now().date_naive()
    }

    #[test]
    fn test_stage_selection_parsing() {
        assert_eq!("all".parse::<StageSelection>(), Ok(StageSelection::All));
        assert_eq!("1".parse::<StageSelection>(), Ok(StageSelection::Discovery));
        assert_eq!(
            "2".parse::<StageSelection>(),
            Ok(StageSelection::Enrichment)
        );
        assert_eq!(
            "3".parse::<StageSelection>(),
            Ok(StageSelection::Summarization)
        );
        assert!("7".parse::<StageSelection>().is_err());
    }

    #[tokio::test]
    async fn test_source_failure_does_not_block_others() {
        let storage = MemoryStorage::new();
        storage.add_source(fixtures::document_source("Broken", "https://down.com"));
        storage.add_source(fixtures::document_source("Working", "https://up.com"));

        let scraper = MockScraper::new()
            .with_page("https://up.com", "[OpenAI ships new model](https://up.com/2024/08/21/a)");
        scraper.fail_once(
            "https://down.com",
            CapabilityError::Unavailable("connection refused".into()),
        );

        let coordinator = RunCoordinator::new(
            storage,
            scraper,
            MockStreamSource::new(),
            MockClassifier::new(),
            MockSummarizer::new(),
        );

        let report = coordinator
            .run(StageSelection::Discovery, window())
            .await
            .unwrap();

        assert_eq!(report.sources_attempted, 2);
        assert_eq!(report.sources_succeeded, 1);
        assert_eq!(report.items_discovered, 1);

        let batch = coordinator
            .storage()
            .get_batch(report.batch_id.unwrap())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(batch.sources.len(), 2);
        let broken = batch
            .sources
            .iter()
            .find(|s| s.source_name == "Broken")
            .unwrap();
        assert!(broken.error.is_some());
        let working = batch
            .sources
            .iter()
            .find(|s| s.source_name == "Working")
            .unwrap();
        assert!(working.succeeded());
        assert_eq!(working.items_discovered, 1);
    }

    #[tokio::test]
    async fn test_full_run_completes_items() {
        let storage = MemoryStorage::new();
        storage.add_source(fixtures::document_source("News", "https://news.com"));
        storage.add_source(fixtures::stream_source("Karpathy", "karpathy"));

        let scraper = MockScraper::new().with_page(
            "https://news.com",
            "[OpenAI ships new model](https://news.com/2024/08/21/a)",
        );
        let stream = MockStreamSource::new().with_post(
            "karpathy",
            fixtures::stream_post("42", "karpathy", "New LLM scaling results"),
        );

        let coordinator = RunCoordinator::new(
            storage,
            scraper,
            stream,
            MockClassifier::new(),
            MockSummarizer::new(),
        );

        let report = coordinator.run(StageSelection::All, window()).await.unwrap();

        assert_eq!(report.items_discovered, 2);
        assert_eq!(report.items_enriched, 2);
        assert_eq!(report.items_summarized, 2);
        assert_eq!(report.items_failed, 0);

        for item in coordinator.storage().all_items() {
            assert_eq!(item.stage, ProcessingStage::Completed);
            assert!(item.summary.is_some());
        }
    }

    #[tokio::test]
    async fn test_report_surfaces_quota_exhaustion() {
        let storage = MemoryStorage::new();
        storage.add_source(fixtures::document_source("News", "https://news.com"));

        let scraper = MockScraper::new();
        scraper.exhaust_quota();

        let coordinator = RunCoordinator::new(
            storage,
            scraper,
            MockStreamSource::new(),
            MockClassifier::new(),
            MockSummarizer::new(),
        );

        let report = coordinator.run(StageSelection::All, window()).await.unwrap();

        assert_eq!(report.sources_succeeded, 0);
        assert!(report
            .quota_exhausted
            .contains(&"scraper".to_string()));
    }
}
