use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use xxhash_rust::xxh3::xxh3_64;

/// Persisted article row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Article {
    pub id: i64,
    pub dedup_key: String,
    pub ticker: String,
    pub title: String,
    pub content: String,
    pub source: String,
    pub source_url: Option<String>,
    pub published_at: DateTime<Utc>,
    pub sentiment_score: Option<f64>,
    pub sentiment_confidence: Option<f64>,
    pub ingested_at: DateTime<Utc>,
}

/// Article ready for insertion; `dedup_key` is already computed.
#[derive(Debug, Clone, PartialEq)]
pub struct NewArticle {
    pub dedup_key: String,
    pub ticker: String,
    pub title: String,
    pub content: String,
    pub source: String,
    pub source_url: Option<String>,
    pub published_at: DateTime<Utc>,
}

/// Work item for the analyze phase.
#[derive(Debug, Clone, PartialEq)]
pub struct UnscoredArticle {
    pub id: i64,
    pub dedup_key: String,
    pub title: String,
    pub content: String,
}

/// Aggregation input: one analyzed article.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredArticle {
    pub ticker: String,
    pub published_at: DateTime<Utc>,
    pub sentiment_score: f64,
}

/// Canonical identity of an article.
///
/// The source URL wins when present; otherwise a stable hash of the ticker and the normalized
/// title. The prefixes keep the two key spaces from colliding.
pub fn dedup_key(ticker: &str, title: &str, source_url: Option<&str>) -> String {
    if let Some(url) = source_url.map(str::trim).filter(|u| !u.is_empty()) {
        return format!("url:{url}");
    }

    let material = format!(
        "{}\n{}",
        ticker.trim().to_ascii_uppercase(),
        normalize_title(title)
    );
    format!("hash:{:016x}", xxh3_64(material.as_bytes()))
}

/// Lower-cased title with runs of whitespace collapsed.
pub fn normalize_title(title: &str) -> String {
    title
        .split_whitespace()
        .map(|w| w.to_lowercase())
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefers_source_url() {
        let key = dedup_key("AAPL", "Apple beats", Some(" https://example.com/a "));
        assert_eq!(key, "url:https://example.com/a");
    }

    #[test]
    fn blank_url_falls_back_to_title_hash() {
        let a = dedup_key("AAPL", "Apple  Beats Estimates", Some("   "));
        let b = dedup_key("aapl", "apple beats estimates", None);
        assert!(a.starts_with("hash:"));
        assert_eq!(a, b);
    }

    #[test]
    fn title_hash_is_scoped_by_ticker() {
        let a = dedup_key("AAPL", "Record quarter", None);
        let b = dedup_key("MSFT", "Record quarter", None);
        assert_ne!(a, b);
    }
}
