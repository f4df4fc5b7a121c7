//! Pure twitterapi.io REST API client.
//!
//! A minimal client for the twitterapi.io timeline API. Fetches a user's
//! recent tweets with cursor pagination and filters them down to original
//! content (no retweets, no replies, no empty quote tweets).
//!
//! # Example
//!
//! ```rust,ignore
//! use twitterapi_client::TwitterApiClient;
//!
//! let client = TwitterApiClient::from_env()?;
//! let tweets = client.fetch_user_tweets("karpathy", 100).await?;
//! ```

pub mod error;
pub mod types;

pub use error::{Result, TwitterApiError};
pub use types::{QuotedTweet, Tweet, TweetAuthor};

use reqwest::Client;
use std::time::Duration;
use types::ApiResponse;

const BASE_URL: &str = "https://api.twitterapi.io";

pub struct TwitterApiClient {
    client: Client,
    api_key: String,
    base_url: String,
}

impl TwitterApiClient {
    pub fn new(api_key: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            client,
            api_key: api_key.into(),
            base_url: BASE_URL.to_string(),
        })
    }

    /// Create from the `TWITTER_API_KEY` environment variable.
    pub fn from_env() -> Result<Self> {
        let api_key = std::env::var("TWITTER_API_KEY").map_err(|_| TwitterApiError::Api {
            status: 0,
            message: "TWITTER_API_KEY environment variable not set".to_string(),
        })?;
        Self::new(api_key)
    }

    /// Override the base URL (for proxies and tests).
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    /// Fetch up to `limit` recent original tweets for a user.
    ///
    /// Pages through the timeline until the limit is reached or the API
    /// reports no further pages. Retweets, replies, and content-free quote
    /// tweets are filtered out before counting against the limit.
    pub async fn fetch_user_tweets(&self, handle: &str, limit: usize) -> Result<Vec<Tweet>> {
        let mut collected: Vec<Tweet> = Vec::new();
        let mut cursor = String::new();

        while collected.len() < limit {
            let page = self.fetch_tweet_batch(handle, &cursor).await?;

            if page.tweets.is_empty() {
                break;
            }

            let remaining = limit - collected.len();
            collected.extend(
                page.tweets
                    .into_iter()
                    .filter(Tweet::is_original)
                    .take(remaining),
            );

            if collected.len() >= limit || !page.has_next_page {
                break;
            }
            cursor = page.next_cursor;

            // Be polite between timeline pages.
            tokio::time::sleep(Duration::from_secs(1)).await;
        }

        tracing::info!(handle, count = collected.len(), "Fetched original tweets");
        Ok(collected)
    }

    async fn fetch_tweet_batch(&self, handle: &str, cursor: &str) -> Result<types::TweetPage> {
        let endpoint = format!("{}/twitter/user/last_tweets", self.base_url);
        let response = self
            .client
            .get(&endpoint)
            .header("X-API-Key", &self.api_key)
            .query(&[
                ("userName", handle),
                ("cursor", cursor),
                ("includeReplies", "false"),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            if status.as_u16() == 402 || status.as_u16() == 429 {
                return Err(TwitterApiError::Quota(format!("{}: {}", status, body)));
            }
            return Err(TwitterApiError::Api {
                status: status.as_u16(),
                message: body,
            });
        }

        let parsed: ApiResponse = response.json().await?;
        if parsed.status != "success" {
            return Err(TwitterApiError::Fetch {
                handle: handle.to_string(),
                reason: parsed
                    .message
                    .unwrap_or_else(|| format!("status={}", parsed.status)),
            });
        }

        Ok(parsed.data.unwrap_or(types::TweetPage {
            tweets: Vec::new(),
            has_next_page: false,
            next_cursor: String::new(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tweet(text: &str) -> Tweet {
        Tweet {
            id: "1".to_string(),
            text: text.to_string(),
            url: None,
            created_at: None,
            like_count: 0,
            retweet_count: 0,
            reply_count: 0,
            view_count: 0,
            is_retweet: false,
            in_reply_to_status_id: None,
            quoted_tweet: None,
        }
    }

    #[test]
    fn test_retweets_filtered() {
        let t = tweet("RT @someone: big news");
        assert!(!t.is_original());
    }

    #[test]
    fn test_replies_filtered() {
        let mut t = tweet("@someone I agree");
        assert!(!t.is_original());

        t = tweet("standalone thought about model training that is long enough");
        t.in_reply_to_status_id = Some("42".to_string());
        assert!(!t.is_original());
    }

    #[test]
    fn test_bare_link_quote_filtered() {
        let mut t = tweet("https://example.com");
        t.quoted_tweet = Some(Box::new(QuotedTweet {
            text: Some("quoted".to_string()),
            author: None,
        }));
        assert!(!t.is_original());
    }

    #[test]
    fn test_substantive_quote_kept() {
        let mut t = tweet(
            "This result matters because it shows scaling laws hold for sparse models too",
        );
        t.quoted_tweet = Some(Box::new(QuotedTweet {
            text: Some("quoted".to_string()),
            author: None,
        }));
        assert!(t.is_original());
    }

    #[test]
    fn test_canonical_url_fallback() {
        let t = tweet("hello world this is a normal tweet");
        assert_eq!(
            t.canonical_url("karpathy"),
            "https://twitter.com/karpathy/status/1"
        );
    }
}
