use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Composite sentiment of one company on one date. Unique per (ticker, date).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyScore {
    pub ticker: String,
    pub date: NaiveDate,
    pub composite_score: f64,
    pub article_count: i32,
    pub avg_sentiment: f64,
    pub rank: i32,
}

/// Ranking row as served to readers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankingEntry {
    pub name: String,
    #[serde(flatten)]
    pub score: DailyScore,
}

/// Per-company mean raw sentiment for a date, computed on read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailySentiment {
    pub ticker: String,
    pub name: String,
    pub date: NaiveDate,
    pub avg_score: f64,
    pub article_count: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Polarity {
    Positive,
    Negative,
}

impl Polarity {
    pub fn matches(self, value: f64) -> bool {
        match self {
            Polarity::Positive => value > 0.0,
            Polarity::Negative => value < 0.0,
        }
    }
}

impl FromStr for Polarity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "positive" => Ok(Polarity::Positive),
            "negative" => Ok(Polarity::Negative),
            other => Err(format!(
                "invalid sentiment filter {other:?}; expected \"positive\" or \"negative\""
            )),
        }
    }
}
