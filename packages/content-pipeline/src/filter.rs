//! Relevance pre-filtering and local date extraction.
//!
//! Everything here is cheap and local: keyword matching against headlines
//! and date extraction from URLs and snippet text. The pre-filter runs
//! before any classifier call and must be conservative — anything it
//! rejects never reaches the classifier, so false negatives are worse than
//! false positives.

use chrono::NaiveDate;
use regex::Regex;
use std::sync::LazyLock;

use crate::types::DateConfidence;

/// Keywords that mark a headline as plausibly on-topic.
const TOPIC_KEYWORDS: &[&str] = &[
    // Core terms
    "ai",
    "artificial intelligence",
    "machine learning",
    "deep learning",
    "neural network",
    "llm",
    "large language model",
    // Models and companies
    "gpt",
    "gpt-4",
    "gpt-5",
    "chatgpt",
    "openai",
    "anthropic",
    "claude",
    "gemini",
    "llama",
    "mistral",
    "copilot",
    "midjourney",
    "stable diffusion",
    "dall-e",
    "whisper",
    // Techniques
    "transformer",
    "fine-tuning",
    "prompt engineering",
    "embedding",
    "vector database",
    "rag",
    "retrieval augmented",
    // Applications
    "generative ai",
    "computer vision",
    "nlp",
    "natural language",
    "chatbot",
    "ai assistant",
    "ai agent",
    "autonomous agent",
    // Industry terms
    "ai startup",
    "ai regulation",
    "ai safety",
    "ai ethics",
    "agi",
    "artificial general intelligence",
    "ai research",
    "ai breakthrough",
];

static URL_DATE_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    vec![
        Regex::new(r"/(\d{4})/(\d{1,2})/(\d{1,2})/").unwrap(),
        Regex::new(r"/(\d{4})-(\d{1,2})-(\d{1,2})/").unwrap(),
        Regex::new(r"/(\d{4})(\d{2})(\d{2})/").unwrap(),
        Regex::new(r"[?&]date=(\d{4})-(\d{2})-(\d{2})").unwrap(),
    ]
});

static HOURS_AGO: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d+)\s+hours?\s+ago").unwrap());

/// Cheap keyword pre-filter over a headline (and optional snippet).
///
/// Multi-word keywords match as substrings; single-word keywords match
/// whole words only, so "ai" does not fire on "maintain".
pub fn pre_filter(headline: &str, snippet: Option<&str>) -> bool {
    let mut text = headline.to_lowercase();
    if let Some(snippet) = snippet {
        text.push(' ');
        text.push_str(&snippet.to_lowercase());
    }

    let words: Vec<&str> = text
        .split(|c: char| !c.is_alphanumeric() && c != '-')
        .filter(|w| !w.is_empty())
        .collect();

    TOPIC_KEYWORDS.iter().any(|keyword| {
        if keyword.contains(' ') {
            text.contains(keyword)
        } else {
            words.iter().any(|w| w == keyword)
        }
    })
}

/// Extract a publication date from URL path or query patterns.
///
/// Dates more than a year away from `today` are treated as noise
/// (version numbers, ids) and rejected.
pub fn extract_date_from_url(url: &str, today: NaiveDate) -> Option<NaiveDate> {
    for pattern in URL_DATE_PATTERNS.iter() {
        let Some(captures) = pattern.captures(url) else {
            continue;
        };
        let year: i32 = captures.get(1)?.as_str().parse().ok()?;
        let month: u32 = captures.get(2)?.as_str().parse().ok()?;
        let day: u32 = captures.get(3)?.as_str().parse().ok()?;

        if let Some(date) = NaiveDate::from_ymd_opt(year, month, day) {
            if (today - date).num_days().abs() <= 365 {
                return Some(date);
            }
        }
    }
    None
}

/// Extract a date from relative-date phrases ("yesterday", "3 hours ago").
pub fn extract_relative_date(text: &str, today: NaiveDate) -> Option<NaiveDate> {
    let text = text.to_lowercase();

    let days_ago = [
        ("today", 0i64),
        ("yesterday", 1),
        ("1 day ago", 1),
        ("one day ago", 1),
        ("2 days ago", 2),
        ("two days ago", 2),
        ("3 days ago", 3),
        ("three days ago", 3),
    ];
    for (phrase, days) in days_ago {
        if text.contains(phrase) {
            return Some(today - chrono::Duration::days(days));
        }
    }

    if let Some(captures) = HOURS_AGO.captures(&text) {
        let hours: i64 = captures.get(1)?.as_str().parse().ok()?;
        if hours < 24 {
            return Some(today);
        } else if hours < 48 {
            return Some(today - chrono::Duration::days(1));
        }
    }

    None
}

/// Seed a date-confidence signal from local evidence alone.
///
/// `High` when a URL or relative date pins the item to the collection
/// window; `Low` when the URL date is near the window (within 3 days);
/// `None` when local evidence says nothing — the classifier's own signal
/// decides from there.
pub fn local_date_confidence(
    url: &str,
    headline: &str,
    snippet: Option<&str>,
    window: NaiveDate,
    today: NaiveDate,
) -> DateConfidence {
    if let Some(date) = extract_date_from_url(url, today) {
        if date == window {
            return DateConfidence::High;
        }
        if (window - date).num_days().abs() <= 3 {
            return DateConfidence::Low;
        }
    }

    let mut text = headline.to_string();
    if let Some(snippet) = snippet {
        text.push(' ');
        text.push_str(snippet);
    }
    if extract_relative_date(&text, today) == Some(window) {
        return DateConfidence::High;
    }

    DateConfidence::None
}

/// Merge the locally extracted confidence with the classifier's verdict,
/// keeping the stronger signal.
pub fn merge_confidence(local: DateConfidence, classifier: DateConfidence) -> DateConfidence {
    match (local, classifier) {
        (DateConfidence::High, _) | (_, DateConfidence::High) => DateConfidence::High,
        (DateConfidence::Low, _) | (_, DateConfidence::Low) => DateConfidence::Low,
        _ => DateConfidence::None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_pre_filter_keyword_hits() {
        assert!(pre_filter("OpenAI ships a new reasoning model", None));
        assert!(pre_filter("The rise of large language models", None));
        assert!(pre_filter("Regulators move on AI safety rules", None));
        assert!(pre_filter("Quarterly update", Some("our new LLM benchmark")));
    }

    #[test]
    fn test_pre_filter_rejects_off_topic() {
        assert!(!pre_filter("Local bakery wins regional award", None));
        assert!(!pre_filter("Quarterly earnings beat expectations", None));
    }

    #[test]
    fn test_pre_filter_short_keyword_needs_word_boundary() {
        // "ai" inside other words must not fire.
        assert!(!pre_filter("Maintain your garden rails this spring", None));
        assert!(pre_filter("AI comes to the enterprise", None));
    }

    #[test]
    fn test_extract_date_from_url_patterns() {
        let today = day(2024, 8, 22);
        assert_eq!(
            extract_date_from_url("https://ex.com/2024/08/21/story", today),
            Some(day(2024, 8, 21))
        );
        assert_eq!(
            extract_date_from_url("https://ex.com/2024-08-21/story", today),
            Some(day(2024, 8, 21))
        );
        assert_eq!(
            extract_date_from_url("https://ex.com/20240821/story", today),
            Some(day(2024, 8, 21))
        );
        assert_eq!(
            extract_date_from_url("https://ex.com/a?date=2024-08-21", today),
            Some(day(2024, 8, 21))
        );
    }

    #[test]
    fn test_extract_date_rejects_far_dates() {
        let today = day(2024, 8, 22);
        // A path segment that parses as a date years away is an id, not a date.
        assert_eq!(
            extract_date_from_url("https://ex.com/2019/01/01/archive", today),
            None
        );
    }

    #[test]
    fn test_relative_dates() {
        let today = day(2024, 8, 22);
        assert_eq!(
            extract_relative_date("posted yesterday", today),
            Some(day(2024, 8, 21))
        );
        assert_eq!(
            extract_relative_date("5 hours ago", today),
            Some(today)
        );
        assert_eq!(
            extract_relative_date("36 hours ago", today),
            Some(day(2024, 8, 21))
        );
        assert_eq!(extract_relative_date("last month", today), None);
    }

    #[test]
    fn test_local_confidence_url_match() {
        let today = day(2024, 8, 22);
        let window = day(2024, 8, 21);
        assert_eq!(
            local_date_confidence("https://ex.com/2024/08/21/a", "t", None, window, today),
            DateConfidence::High
        );
        assert_eq!(
            local_date_confidence("https://ex.com/2024/08/19/a", "t", None, window, today),
            DateConfidence::Low
        );
        assert_eq!(
            local_date_confidence("https://ex.com/a", "t", None, window, today),
            DateConfidence::None
        );
    }

    #[test]
    fn test_merge_confidence_keeps_stronger() {
        assert_eq!(
            merge_confidence(DateConfidence::None, DateConfidence::High),
            DateConfidence::High
        );
        assert_eq!(
            merge_confidence(DateConfidence::Low, DateConfidence::None),
            DateConfidence::Low
        );
        assert_eq!(
            merge_confidence(DateConfidence::None, DateConfidence::None),
            DateConfidence::None
        );
    }
}
