//! Capability implementations backed by the real provider clients.
//!
//! These adapters translate between the pipeline's capability traits and
//! the pure REST clients, including the prompts sent to the language
//! model. Provider responses are validated into typed structs at this
//! boundary; anything malformed becomes a `CapabilityError` before it can
//! reach the state machine.

use async_trait::async_trait;
use chrono::NaiveDate;
use schemars::JsonSchema;
use serde::Deserialize;

use firecrawl_client::{FirecrawlClient, FirecrawlError};
use openai_client::{ChatRequest, Message, OpenAIClient, OpenAIError};
use twitterapi_client::{TwitterApiClient, TwitterApiError};

use crate::error::CapabilityError;
use crate::traits::{
    Candidate, Classifier, ScrapedContent, Scraper, StreamPost, StreamSource, Summarizer, Verdict,
};
use crate::types::{DateConfidence, EngagementMetrics};

const DEFAULT_MODEL: &str = "gpt-4o";

/// How much article text goes into a summary prompt.
const SUMMARY_INPUT_CAP: usize = 8_000;

/// How much of a quoted post is carried into full content.
const QUOTE_CAP: usize = 200;

fn truncate_chars(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        text.to_string()
    } else {
        text.chars().take(max_chars).collect()
    }
}

// ---------------------------------------------------------------------------
// Scraper
// ---------------------------------------------------------------------------

/// `Scraper` backed by the Firecrawl API.
pub struct FirecrawlScraper {
    client: FirecrawlClient,
}

impl FirecrawlScraper {
    pub fn new(client: FirecrawlClient) -> Self {
        Self { client }
    }

    async fn scrape(&self, url: &str) -> Result<ScrapedContent, CapabilityError> {
        let page = self.client.scrape(url).await.map_err(|error| match error {
            FirecrawlError::Quota(reason) => CapabilityError::Quota(reason),
            other => CapabilityError::Unavailable(other.to_string()),
        })?;

        Ok(ScrapedContent {
            url: page.url,
            markdown: page.markdown,
            title: page.title,
            published_date: page.published_date,
        })
    }
}

#[async_trait]
impl Scraper for FirecrawlScraper {
    async fn fetch_markdown(&self, url: &str) -> Result<ScrapedContent, CapabilityError> {
        self.scrape(url).await
    }

    async fn fetch_full(&self, url: &str) -> Result<ScrapedContent, CapabilityError> {
        self.scrape(url).await
    }
}

// ---------------------------------------------------------------------------
// Stream source
// ---------------------------------------------------------------------------

/// `StreamSource` backed by twitterapi.io.
pub struct TwitterStream {
    client: TwitterApiClient,
    fetch_limit: usize,
}

impl TwitterStream {
    pub fn new(client: TwitterApiClient) -> Self {
        Self {
            client,
            fetch_limit: 100,
        }
    }

    /// How many timeline tweets to page through per handle.
    pub fn with_fetch_limit(mut self, limit: usize) -> Self {
        self.fetch_limit = limit;
        self
    }
}

#[async_trait]
impl StreamSource for TwitterStream {
    async fn fetch_recent(
        &self,
        handle: &str,
        window: NaiveDate,
    ) -> Result<Vec<StreamPost>, CapabilityError> {
        let tweets = self
            .client
            .fetch_user_tweets(handle, self.fetch_limit)
            .await
            .map_err(|error| match error {
                TwitterApiError::Quota(reason) => CapabilityError::Quota(reason),
                other => CapabilityError::Unavailable(other.to_string()),
            })?;

        let posts = tweets
            .into_iter()
            .filter(|t| t.created_at.map(|dt| dt.date_naive()) == Some(window))
            .map(|t| {
                let quoted = t.quoted_tweet.as_ref().and_then(|q| {
                    let text = q.text.as_deref()?;
                    let author = q
                        .author
                        .as_ref()
                        .and_then(|a| a.user_name.as_deref())
                        .unwrap_or("unknown");
                    Some(format!(
                        "Quote from @{}: {}",
                        author,
                        truncate_chars(text, QUOTE_CAP)
                    ))
                });

                StreamPost {
                    url: t.canonical_url(handle),
                    author: handle.to_string(),
                    text: t.text.clone(),
                    quoted,
                    timestamp: t.created_at.unwrap_or_default(),
                    metrics: EngagementMetrics {
                        likes: t.like_count,
                        reposts: t.retweet_count,
                        replies: t.reply_count,
                        views: t.view_count,
                    },
                    id: t.id,
                }
            })
            .collect();

        Ok(posts)
    }
}

// ---------------------------------------------------------------------------
// Classifier
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, JsonSchema)]
struct BatchVerdictResponse {
    verdicts: Vec<VerdictEntry>,
}

#[derive(Debug, Deserialize, JsonSchema)]
struct VerdictEntry {
    relevant: bool,
    /// "high", "low", or "none"
    date_confidence: String,
    tags: Vec<String>,
}

/// `Classifier` backed by an OpenAI chat model.
pub struct OpenAiClassifier {
    client: OpenAIClient,
    model: String,
}

impl OpenAiClassifier {
    pub fn new(client: OpenAIClient) -> Self {
        Self {
            client,
            model: DEFAULT_MODEL.to_string(),
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }
}

fn map_openai_error(error: OpenAIError) -> CapabilityError {
    match error {
        OpenAIError::Quota(reason) => CapabilityError::Quota(reason),
        OpenAIError::Parse(reason) => CapabilityError::Malformed(reason),
        other => CapabilityError::Unavailable(other.to_string()),
    }
}

#[async_trait]
impl Classifier for OpenAiClassifier {
    async fn classify_batch(
        &self,
        candidates: &[Candidate],
        window: NaiveDate,
    ) -> Result<Vec<Verdict>, CapabilityError> {
        let system_prompt = format!(
            "You are a strict AI news curator. For each numbered candidate, decide:\n\
             1. relevant: is it about AI, machine learning, LLMs, or artificial intelligence?\n\
             2. date_confidence: was it published on {window}? \
             'high' if the date is explicit, 'low' if inferred from wording like \
             'today' or 'hours ago', 'none' if there is no usable date signal. \
             Do not guess: ambiguous dates are 'none'.\n\
             3. tags: up to three short topic tags.\n\
             Return one verdict per candidate, in the same order."
        );

        let mut user_prompt = String::from("Candidates:\n");
        for (index, candidate) in candidates.iter().enumerate() {
            user_prompt.push_str(&format!(
                "{}. HEADLINE: {}\n   URL: {}\n",
                index + 1,
                candidate.headline,
                candidate.url
            ));
            if let Some(snippet) = &candidate.snippet {
                user_prompt.push_str(&format!("   TEXT: {}\n", truncate_chars(snippet, 500)));
            }
        }

        let response: BatchVerdictResponse = self
            .client
            .extract(&self.model, system_prompt, user_prompt)
            .await
            .map_err(map_openai_error)?;

        if response.verdicts.len() != candidates.len() {
            return Err(CapabilityError::Malformed(format!(
                "expected {} verdicts, got {}",
                candidates.len(),
                response.verdicts.len()
            )));
        }

        response
            .verdicts
            .into_iter()
            .map(|entry| {
                let date_confidence =
                    DateConfidence::parse(&entry.date_confidence).ok_or_else(|| {
                        CapabilityError::Malformed(format!(
                            "unknown date_confidence '{}'",
                            entry.date_confidence
                        ))
                    })?;
                Ok(Verdict {
                    relevant: entry.relevant,
                    date_confidence,
                    tags: entry.tags,
                })
            })
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Summarizer
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, JsonSchema)]
struct GroupSummaryResponse {
    summaries: Vec<String>,
}

/// `Summarizer` backed by an OpenAI chat model.
pub struct OpenAiSummarizer {
    client: OpenAIClient,
    model: String,
}

impl OpenAiSummarizer {
    pub fn new(client: OpenAIClient) -> Self {
        Self {
            client,
            model: DEFAULT_MODEL.to_string(),
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }
}

#[async_trait]
impl Summarizer for OpenAiSummarizer {
    async fn summarize(&self, headline: &str, content: &str) -> Result<String, CapabilityError> {
        let request = ChatRequest::new(&self.model)
            .message(Message::system(
                "You are a professional newsletter writer. Write a 2-3 sentence \
                 summary of the article that captures the key announcement and \
                 why it matters to AI practitioners. Return only the summary text.",
            ))
            .message(Message::user(format!(
                "Headline: {headline}\n\nArticle:\n{}",
                truncate_chars(content, SUMMARY_INPUT_CAP)
            )))
            .temperature(0.5);

        let response = self
            .client
            .chat_completion(request)
            .await
            .map_err(map_openai_error)?;

        Ok(response.content.trim().to_string())
    }

    async fn summarize_group(
        &self,
        author: &str,
        texts: &[String],
    ) -> Result<Vec<String>, CapabilityError> {
        let system_prompt = format!(
            "You are a professional newsletter writer. The numbered posts below \
             are all by @{author}. Write a 1-2 sentence summary for each post, \
             in order. Return exactly one summary per post."
        );

        let mut user_prompt = String::new();
        for (index, text) in texts.iter().enumerate() {
            user_prompt.push_str(&format!(
                "{}. {}\n\n",
                index + 1,
                truncate_chars(text, 1_000)
            ));
        }

        let response: GroupSummaryResponse = self
            .client
            .extract(&self.model, system_prompt, user_prompt)
            .await
            .map_err(map_openai_error)?;

        if response.summaries.len() != texts.len() {
            return Err(CapabilityError::Malformed(format!(
                "expected {} summaries, got {}",
                texts.len(),
                response.summaries.len()
            )));
        }

        Ok(response.summaries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_chars_respects_boundaries() {
        assert_eq!(truncate_chars("abcdef", 4), "abcd");
        assert_eq!(truncate_chars("abc", 4), "abc");
    }

    #[test]
    fn test_openai_error_mapping() {
        assert!(matches!(
            map_openai_error(OpenAIError::Quota("402".into())),
            CapabilityError::Quota(_)
        ));
        assert!(matches!(
            map_openai_error(OpenAIError::Parse("bad json".into())),
            CapabilityError::Malformed(_)
        ));
        assert!(matches!(
            map_openai_error(OpenAIError::Network("timeout".into())),
            CapabilityError::Unavailable(_)
        ));
    }
}
