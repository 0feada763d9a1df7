//! Time-decayed composite scoring and dense ranking for one calendar date.

use crate::domain::article::ScoredArticle;
use crate::domain::score::DailyScore;
use crate::error::StoreError;
use crate::storage::NewsStore;
use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Weight lost per hour since publication.
pub const DECAY_PER_HOUR: f64 = 0.1;

pub const NO_ARTICLES_MESSAGE: &str = "no articles found";

/// Linear weight in [0, 1]: 1.0 at publication, 0.0 from 10 hours on. Articles stamped after
/// `now` weigh 1.0.
pub fn time_decay(published_at: DateTime<Utc>, now: DateTime<Utc>) -> f64 {
    let hours = (now - published_at).num_milliseconds() as f64 / 3_600_000.0;
    (1.0 - hours * DECAY_PER_HOUR).clamp(0.0, 1.0)
}

/// Pure scoring step. Companies without articles never appear; ranks are 1..N with ties broken
/// by ticker.
pub fn compute_daily_scores(
    date: NaiveDate,
    articles: &[ScoredArticle],
    now: DateTime<Utc>,
) -> Vec<DailyScore> {
    #[derive(Default)]
    struct Acc {
        weighted_sum: f64,
        raw_sum: f64,
        count: i32,
    }

    let mut by_ticker: BTreeMap<&str, Acc> = BTreeMap::new();
    for a in articles {
        let acc = by_ticker.entry(a.ticker.as_str()).or_default();
        acc.weighted_sum += a.sentiment_score * time_decay(a.published_at, now);
        acc.raw_sum += a.sentiment_score;
        acc.count += 1;
    }

    let mut scores: Vec<DailyScore> = by_ticker
        .into_iter()
        .map(|(ticker, acc)| {
            let n = f64::from(acc.count);
            DailyScore {
                ticker: ticker.to_string(),
                date,
                composite_score: acc.weighted_sum / n,
                article_count: acc.count,
                avg_sentiment: acc.raw_sum / n,
                rank: 0,
            }
        })
        .collect();

    scores.sort_by(|a, b| {
        b.composite_score
            .partial_cmp(&a.composite_score)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.ticker.cmp(&b.ticker))
    });
    for (i, s) in scores.iter_mut().enumerate() {
        s.rank = i as i32 + 1;
    }
    scores
}

#[derive(Debug, Clone, Serialize)]
pub struct AggregationReport {
    pub date: NaiveDate,
    pub companies_scored: usize,
    pub total_articles: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip)]
    pub scores: Vec<DailyScore>,
}

pub struct Aggregator {
    store: Arc<dyn NewsStore>,
}

impl Aggregator {
    pub fn new(store: Arc<dyn NewsStore>) -> Self {
        Self { store }
    }

    /// Reads every scored article for `date`, scores and replaces the date's ranking.
    ///
    /// An empty date is a successful no-op: nothing is written and the previous ranking (if any)
    /// is left alone.
    pub async fn run(
        &self,
        date: NaiveDate,
        now: DateTime<Utc>,
    ) -> Result<AggregationReport, StoreError> {
        let articles = self.store.scored_articles_for_date(date).await?;
        if articles.is_empty() {
            tracing::info!(%date, "no scored articles for date");
            return Ok(AggregationReport {
                date,
                companies_scored: 0,
                total_articles: 0,
                message: Some(NO_ARTICLES_MESSAGE.to_string()),
                scores: Vec::new(),
            });
        }

        let scores = compute_daily_scores(date, &articles, now);
        self.store.replace_daily_scores(date, &scores).await?;

        tracing::info!(
            %date,
            companies = scores.len(),
            articles = articles.len(),
            top = scores.first().map(|s| s.ticker.as_str()).unwrap_or("-"),
            "daily scores replaced"
        );

        Ok(AggregationReport {
            date,
            companies_scored: scores.len(),
            total_articles: articles.len(),
            message: None,
            scores,
        })
    }
}
