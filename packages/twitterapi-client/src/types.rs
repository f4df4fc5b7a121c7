use chrono::{DateTime, Utc};
use serde::Deserialize;

/// Top-level envelope for twitterapi.io responses.
#[derive(Debug, Deserialize)]
pub struct ApiResponse {
    pub status: String,
    pub message: Option<String>,
    pub data: Option<TweetPage>,
}

/// One page of a user's timeline.
#[derive(Debug, Deserialize)]
pub struct TweetPage {
    #[serde(default)]
    pub tweets: Vec<Tweet>,
    #[serde(default)]
    pub has_next_page: bool,
    #[serde(default)]
    pub next_cursor: String,
}

/// A single tweet from the twitterapi.io dataset.
#[derive(Debug, Clone, Deserialize)]
pub struct Tweet {
    pub id: String,
    pub text: String,
    pub url: Option<String>,
    #[serde(rename = "createdAt")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(rename = "likeCount", default)]
    pub like_count: i64,
    #[serde(rename = "retweetCount", default)]
    pub retweet_count: i64,
    #[serde(rename = "replyCount", default)]
    pub reply_count: i64,
    #[serde(rename = "viewCount", default)]
    pub view_count: i64,
    #[serde(rename = "isRetweet", default)]
    pub is_retweet: bool,
    #[serde(rename = "inReplyToStatusId")]
    pub in_reply_to_status_id: Option<String>,
    #[serde(rename = "quotedTweet")]
    pub quoted_tweet: Option<Box<QuotedTweet>>,
}

/// Embedded quoted tweet (subset of fields).
#[derive(Debug, Clone, Deserialize)]
pub struct QuotedTweet {
    pub text: Option<String>,
    pub author: Option<TweetAuthor>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TweetAuthor {
    #[serde(rename = "userName")]
    pub user_name: Option<String>,
}

impl Tweet {
    /// Canonical URL for this tweet.
    pub fn canonical_url(&self, handle: &str) -> String {
        self.url
            .clone()
            .unwrap_or_else(|| format!("https://twitter.com/{}/status/{}", handle, self.id))
    }

    /// Whether this is original content from the author (not a retweet or
    /// reply, not a near-empty quote tweet).
    pub fn is_original(&self) -> bool {
        if self.is_retweet || self.text.starts_with("RT @") {
            return false;
        }
        if self.in_reply_to_status_id.is_some() || self.text.starts_with('@') {
            return false;
        }
        if self.quoted_tweet.is_some() {
            let clean = self.text.trim();
            // Quote tweets that are just a link or a few words carry no content.
            if (clean.starts_with("https://") || clean.len() < 50) && clean.split(' ').count() < 6 {
                return false;
            }
        }
        true
    }
}
