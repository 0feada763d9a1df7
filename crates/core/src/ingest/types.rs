use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

/// Article as produced by a source adapter, before identity is assigned.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawArticle {
    pub ticker: String,
    pub title: String,
    pub content: String,
    pub source: String,
    pub source_url: Option<String>,
    pub published_at: DateTime<Utc>,
}

/// Accepts RFC 3339 timestamps and offset-less ISO-8601 (read as UTC).
pub fn parse_published_at(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }

    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
        .map(|naive| naive.and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn parses_rfc3339_and_naive_iso() {
        let expected = Utc.with_ymd_and_hms(2026, 2, 16, 14, 30, 0).unwrap();
        assert_eq!(parse_published_at("2026-02-16T14:30:00Z"), Some(expected));
        assert_eq!(parse_published_at("2026-02-16T23:30:00+09:00"), Some(expected));
        assert_eq!(parse_published_at("2026-02-16T14:30:00"), Some(expected));
        assert_eq!(parse_published_at("2026-02-16T14:30:00.000123").map(|d| d.timestamp()), Some(expected.timestamp()));
    }

    #[test]
    fn rejects_blank_and_garbage() {
        assert_eq!(parse_published_at(""), None);
        assert_eq!(parse_published_at("yesterday"), None);
    }

    #[test]
    fn raw_article_round_trips_iso_timestamps() {
        let v = serde_json::json!({
            "ticker": "AAPL",
            "title": "Apple beats",
            "content": "Strong quarter",
            "source": "Wire",
            "source_url": null,
            "published_at": "2026-02-16T08:00:00Z"
        });
        let a: RawArticle = serde_json::from_value(v).unwrap();
        assert_eq!(a.published_at, Utc.with_ymd_and_hms(2026, 2, 16, 8, 0, 0).unwrap());
        assert!(a.source_url.is_none());
    }
}
