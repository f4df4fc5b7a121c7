//! Canonical content identity.
//!
//! A fingerprint answers "have we seen this item before" across runs and
//! across sources. Document items are identified by their normalized URL;
//! stream items by the platform-native post id, which is already globally
//! unique.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use url::Url;

/// Query parameters that vary per campaign/visitor without changing the
/// underlying document.
const TRACKING_PARAMS: &[&str] = &["fbclid", "gclid", "mc_cid", "mc_eid", "ref", "source"];

/// Canonical identity key for a content item.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Fingerprint for a document item: the normalized locator.
    ///
    /// Normalization lowercases scheme and host, strips the fragment,
    /// drops tracking query parameters, and trims the trailing slash.
    /// Unparseable locators fall back to the trimmed input so they can
    /// still be deduplicated verbatim.
    pub fn for_document(locator: &str) -> Self {
        match normalize_url(locator) {
            Some(normalized) => Self(normalized),
            None => Self(locator.trim().to_string()),
        }
    }

    /// Fingerprint for a stream item: the platform-native id.
    pub fn for_stream(platform_id: &str) -> Self {
        Self(format!("stream:{}", platform_id))
    }

    /// Rehydrate a fingerprint persisted by a previous run, verbatim.
    pub fn from_stored(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

fn normalize_url(locator: &str) -> Option<String> {
    let mut url = Url::parse(locator.trim()).ok()?;
    url.set_fragment(None);

    let kept: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(key, _)| !is_tracking_param(key))
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();

    if kept.is_empty() {
        url.set_query(None);
    } else {
        let query = kept
            .iter()
            .map(|(k, v)| {
                if v.is_empty() {
                    k.clone()
                } else {
                    format!("{}={}", k, v)
                }
            })
            .collect::<Vec<_>>()
            .join("&");
        url.set_query(Some(&query));
    }

    // Url::parse already lowercases scheme and host; only the trailing
    // slash is left to trim.
    let mut rendered = url.to_string();
    while rendered.ends_with('/') {
        rendered.pop();
    }
    Some(rendered)
}

fn is_tracking_param(key: &str) -> bool {
    key.starts_with("utm_") || TRACKING_PARAMS.contains(&key)
}

/// Word-overlap similarity between two headlines, in [0, 1].
///
/// Case-insensitive, punctuation-insensitive. The overlap is measured
/// against the larger word set so that a short headline embedded in a
/// longer one does not score as identical.
pub fn headline_similarity(a: &str, b: &str) -> f64 {
    let words_a = word_set(a);
    let words_b = word_set(b);

    if words_a.is_empty() || words_b.is_empty() {
        return 0.0;
    }

    let shared = words_a.intersection(&words_b).count();
    let larger = words_a.len().max(words_b.len());
    shared as f64 / larger as f64
}

fn word_set(text: &str) -> HashSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(|w| w.to_lowercase())
        .collect()
}
