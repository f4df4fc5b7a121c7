//! Pipeline stages: discovery/filtering, enrichment, summarization.

pub mod discover;
pub mod enrich;
pub mod summarize;

use std::sync::atomic::{AtomicBool, Ordering};

/// External capabilities whose quota can run out mid-run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    Scraper,
    Classifier,
    Summarizer,
    Stream,
}

impl Capability {
    pub fn as_str(&self) -> &'static str {
        match self {
            Capability::Scraper => "scraper",
            Capability::Classifier => "classifier",
            Capability::Summarizer => "summarizer",
            Capability::Stream => "stream",
        }
    }
}

/// Tracks which capabilities are still callable this run.
///
/// A quota error closes the capability for the remainder of the run; every
/// unit checks the gate before calling out, so one exhausted account does
/// not burn further attempts.
#[derive(Debug, Default)]
pub struct CapabilityGate {
    scraper: AtomicBool,
    classifier: AtomicBool,
    summarizer: AtomicBool,
    stream: AtomicBool,
}

impl CapabilityGate {
    pub fn new() -> Self {
        Self::default()
    }

    fn flag(&self, capability: Capability) -> &AtomicBool {
        match capability {
            Capability::Scraper => &self.scraper,
            Capability::Classifier => &self.classifier,
            Capability::Summarizer => &self.summarizer,
            Capability::Stream => &self.stream,
        }
    }

    pub fn is_open(&self, capability: Capability) -> bool {
        !self.flag(capability).load(Ordering::Relaxed)
    }

    pub fn close(&self, capability: Capability) {
        self.flag(capability).store(true, Ordering::Relaxed);
    }

    /// Names of capabilities whose quota ran out, for the report.
    pub fn exhausted(&self) -> Vec<String> {
        [
            Capability::Scraper,
            Capability::Classifier,
            Capability::Summarizer,
            Capability::Stream,
        ]
        .into_iter()
        .filter(|c| !self.is_open(*c))
        .map(|c| c.as_str().to_string())
        .collect()
    }
}
