//! Multi-stage content ingestion pipeline.
//!
//! Ingests content from heterogeneous sources (news sites, social
//! accounts), filters it for AI/ML relevance, enriches it with full
//! content, summarizes it, and persists it for downstream display.
//!
//! # Pipeline
//!
//! ```text
//! sources ──► Stage 1: discover + pre-filter + classify ──► pending_enrichment
//!                      │ (dedup by fingerprint)
//!         ──► Stage 2: fetch full content ────────────────► pending_summary
//!         ──► Stage 3: summarize ──────────────────────────► completed
//! ```
//!
//! Items that fail are retried in place up to a cap, then parked in the
//! `failed` absorbing state. Each stage drains only its own `pending_*`
//! queue, so re-invoking a stage is idempotent and resumes stuck work.
//!
//! # Usage
//!
//! ```rust,ignore
//! use content_pipeline::{MemoryStorage, RunCoordinator, StageSelection};
//! use content_pipeline::testing::{MockClassifier, MockScraper, MockStreamSource, MockSummarizer};
//!
//! let coordinator = RunCoordinator::new(
//!     MemoryStorage::new(),
//!     MockScraper::new(),
//!     MockStreamSource::new(),
//!     MockClassifier::new(),
//!     MockSummarizer::new(),
//! );
//! let report = coordinator.run(StageSelection::All, window).await?;
//! println!("{report}");
//! ```
//!
//! # Modules
//!
//! - [`traits`] - Capability seams (scraper, classifier, summarizer, stream)
//! - [`types`] - Domain entities (Source, ContentItem, Batch)
//! - [`fingerprint`] - Canonical identity and soft dedup
//! - [`filter`] - Keyword pre-filter and local date extraction
//! - [`engine`] - Retry policy and stage-machine rules
//! - [`stages`] - The three pipeline stages
//! - [`coordinator`] - Top-level run driver and BatchReport
//! - [`storage`] - Persistence (Postgres, in-memory)
//! - [`providers`] - Real capability implementations (Firecrawl, OpenAI, twitterapi.io)
//! - [`testing`] - Mocks and fixtures

pub mod config;
pub mod coordinator;
pub mod engine;
pub mod error;
pub mod filter;
pub mod fingerprint;
pub mod providers;
pub mod stages;
pub mod storage;
pub mod testing;
pub mod traits;
pub mod types;

// Re-export core types at crate root
pub use config::PipelineConfig;
pub use coordinator::{BatchReport, RunCoordinator, StageSelection};
pub use error::{CapabilityError, PipelineError, Result};
pub use fingerprint::Fingerprint;
pub use storage::{MemoryStorage, PostgresStorage, Storage, UpsertOutcome};
pub use traits::{
    Candidate, Classifier, ScrapedContent, Scraper, StreamPost, StreamSource, Summarizer, Verdict,
};
pub use types::{
    Batch, BatchId, ContentItem, DateConfidence, EngagementMetrics, ItemId, ProcessingStage,
    Source, SourceId, SourceKind, SourceOutcome,
};
