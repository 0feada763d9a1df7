//! Read and trigger surface behind the HTTP API. Every parameter is validated here; the store
//! only ever sees well-formed values.

use crate::aggregate::{AggregationReport, Aggregator};
use crate::domain::article::Article;
use crate::domain::company::Company;
use crate::domain::score::{DailyScore, DailySentiment, Polarity, RankingEntry};
use crate::error::QueryError;
use crate::storage::{ArticleFilter, NewsStore};
use crate::time::{parse_date, utc_day::window_start};
use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::ops::RangeInclusive;
use std::sync::Arc;

pub const ARTICLE_LIMIT_DEFAULT: i64 = 50;
pub const ARTICLE_LIMIT_RANGE: RangeInclusive<i64> = 1..=500;
pub const RANKING_LIMIT_DEFAULT: i64 = 100;
pub const RANKING_LIMIT_RANGE: RangeInclusive<i64> = 1..=1000;
pub const HISTORY_DAYS_DEFAULT: u32 = 30;
pub const HISTORY_DAYS_RANGE: RangeInclusive<u32> = 1..=365;

#[derive(Debug, Clone, Serialize)]
pub struct ScoreHistory {
    pub ticker: String,
    pub name: String,
    pub days: u32,
    pub count: usize,
    pub history: Vec<DailyScore>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DailySentiments {
    pub date: NaiveDate,
    pub count: usize,
    pub sentiments: Vec<DailySentiment>,
}

#[derive(Clone)]
pub struct QueryService {
    store: Arc<dyn NewsStore>,
}

impl QueryService {
    pub fn new(store: Arc<dyn NewsStore>) -> Self {
        Self { store }
    }

    pub async fn companies(&self) -> Result<Vec<Company>, QueryError> {
        Ok(self.store.list_companies().await?)
    }

    pub async fn articles(
        &self,
        ticker: Option<&str>,
        sentiment: Option<&str>,
        limit: Option<i64>,
    ) -> Result<Vec<Article>, QueryError> {
        let filter = ArticleFilter {
            ticker: ticker
                .map(|t| t.trim().to_ascii_uppercase())
                .filter(|t| !t.is_empty()),
            polarity: parse_polarity(sentiment)?,
            limit: checked_limit(limit, ARTICLE_LIMIT_DEFAULT, ARTICLE_LIMIT_RANGE)?,
        };
        Ok(self.store.list_articles(&filter).await?)
    }

    pub async fn ranking(
        &self,
        date: &str,
        sentiment: Option<&str>,
        limit: Option<i64>,
    ) -> Result<Vec<RankingEntry>, QueryError> {
        let date = validate_date(date)?;
        let polarity = parse_polarity(sentiment)?;
        let limit = checked_limit(limit, RANKING_LIMIT_DEFAULT, RANKING_LIMIT_RANGE)?;
        Ok(self.store.ranking(date, polarity, limit).await?)
    }

    /// Runs aggregation for `date`. Repeating the call with unchanged articles and the same `now`
    /// yields the same ranking.
    pub async fn calculate(
        &self,
        date: &str,
        now: DateTime<Utc>,
    ) -> Result<AggregationReport, QueryError> {
        let date = validate_date(date)?;
        Ok(Aggregator::new(self.store.clone()).run(date, now).await?)
    }

    /// DailyScore rows of the last `days` days (today included), newest first.
    pub async fn history(
        &self,
        ticker: &str,
        days: Option<u32>,
        today: NaiveDate,
    ) -> Result<ScoreHistory, QueryError> {
        let ticker = ticker.trim().to_ascii_uppercase();
        let company = self
            .store
            .get_company(&ticker)
            .await?
            .ok_or_else(|| QueryError::NotFound(format!("ticker {ticker}")))?;

        let days = days.unwrap_or(HISTORY_DAYS_DEFAULT);
        if !HISTORY_DAYS_RANGE.contains(&days) {
            return Err(QueryError::Validation(format!(
                "days must be between {} and {}",
                HISTORY_DAYS_RANGE.start(),
                HISTORY_DAYS_RANGE.end()
            )));
        }

        let history = self
            .store
            .score_history(&company.ticker, window_start(today, days))
            .await?;
        Ok(ScoreHistory {
            ticker: company.ticker,
            name: company.name,
            days,
            count: history.len(),
            history,
        })
    }

    /// Mean raw sentiment per company for `date` (default `today`), computed from articles.
    pub async fn daily_sentiments(
        &self,
        date: Option<&str>,
        today: NaiveDate,
    ) -> Result<DailySentiments, QueryError> {
        let date = match date.map(str::trim).filter(|s| !s.is_empty()) {
            Some(s) => validate_date(s)?,
            None => today,
        };

        let articles = self.store.scored_articles_for_date(date).await?;
        let names: BTreeMap<String, String> = self
            .store
            .list_companies()
            .await?
            .into_iter()
            .map(|c| (c.ticker, c.name))
            .collect();

        let mut sums: BTreeMap<&str, (f64, usize)> = BTreeMap::new();
        for a in &articles {
            let e = sums.entry(a.ticker.as_str()).or_insert((0.0, 0));
            e.0 += a.sentiment_score;
            e.1 += 1;
        }

        let sentiments: Vec<DailySentiment> = sums
            .into_iter()
            .map(|(ticker, (sum, n))| DailySentiment {
                ticker: ticker.to_string(),
                name: names.get(ticker).cloned().unwrap_or_else(|| ticker.to_string()),
                date,
                avg_score: sum / n as f64,
                article_count: n,
            })
            .collect();

        Ok(DailySentiments {
            date,
            count: sentiments.len(),
            sentiments,
        })
    }
}

fn validate_date(s: &str) -> Result<NaiveDate, QueryError> {
    parse_date(s).map_err(|_| QueryError::Validation("invalid date format; use YYYY-MM-DD".into()))
}

fn parse_polarity(s: Option<&str>) -> Result<Option<Polarity>, QueryError> {
    match s.map(str::trim).filter(|s| !s.is_empty()) {
        Some(s) => s.parse().map(Some).map_err(QueryError::Validation),
        None => Ok(None),
    }
}

fn checked_limit(
    limit: Option<i64>,
    default: i64,
    range: RangeInclusive<i64>,
) -> Result<i64, QueryError> {
    let limit = limit.unwrap_or(default);
    if !range.contains(&limit) {
        return Err(QueryError::Validation(format!(
            "limit must be between {} and {}",
            range.start(),
            range.end()
        )));
    }
    Ok(limit)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::article::NewArticle;
    use crate::sentiment::Sentiment;
    use crate::storage::memory::MemoryStore;
    use chrono::TimeZone;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 2, 16).unwrap()
    }

    async fn service() -> (Arc<MemoryStore>, QueryService) {
        let store = Arc::new(MemoryStore::new());
        store
            .upsert_companies(&[Company::new("AAPL", "Apple Inc."), Company::new("MSFT", "Microsoft")])
            .await
            .unwrap();
        (store.clone(), QueryService::new(store))
    }

    async fn add_scored(store: &MemoryStore, key: &str, ticker: &str, score: f64) {
        store
            .insert_article(&NewArticle {
                dedup_key: key.to_string(),
                ticker: ticker.to_string(),
                title: key.to_string(),
                content: String::new(),
                source: "test".to_string(),
                source_url: None,
                published_at: Utc.with_ymd_and_hms(2026, 2, 16, 10, 0, 0).unwrap(),
            })
            .await
            .unwrap();
        let id = store
            .all_articles()
            .await
            .into_iter()
            .find(|a| a.dedup_key == key)
            .unwrap()
            .id;
        store.record_sentiment(id, Sentiment::new(score, 0.5)).await.unwrap();
    }

    #[tokio::test]
    async fn unknown_ticker_history_is_not_found() {
        let (_, svc) = service().await;
        let err = svc.history("ZZZZ", None, today()).await.unwrap_err();
        assert!(matches!(err, QueryError::NotFound(_)), "{err}");
    }

    #[tokio::test]
    async fn known_ticker_with_no_scores_is_empty_success() {
        let (_, svc) = service().await;
        let h = svc.history("aapl", Some(7), today()).await.unwrap();
        assert_eq!(h.ticker, "AAPL");
        assert_eq!(h.count, 0);
    }

    #[tokio::test]
    async fn out_of_range_parameters_are_rejected() {
        let (_, svc) = service().await;

        for days in [0, 366] {
            let err = svc.history("AAPL", Some(days), today()).await.unwrap_err();
            assert!(matches!(err, QueryError::Validation(_)));
        }
        assert!(matches!(
            svc.articles(None, None, Some(0)).await.unwrap_err(),
            QueryError::Validation(_)
        ));
        assert!(matches!(
            svc.articles(None, Some("neutral"), None).await.unwrap_err(),
            QueryError::Validation(_)
        ));
        assert!(matches!(
            svc.ranking("2026-02-30", None, None).await.unwrap_err(),
            QueryError::Validation(_)
        ));
    }

    #[tokio::test]
    async fn calculate_then_ranking_round_trip() {
        let (store, svc) = service().await;
        add_scored(&store, "a1", "AAPL", 0.4).await;
        add_scored(&store, "m1", "MSFT", -0.2).await;
        let now = Utc.with_ymd_and_hms(2026, 2, 16, 12, 0, 0).unwrap();

        let report = svc.calculate("2026-02-16", now).await.unwrap();
        assert_eq!(report.companies_scored, 2);

        let all = svc.ranking("2026-02-16", None, None).await.unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].score.ticker, "AAPL");
        assert_eq!(all[0].name, "Apple Inc.");

        let negative = svc.ranking("2026-02-16", Some("negative"), None).await.unwrap();
        assert_eq!(negative.len(), 1);
        assert_eq!(negative[0].score.ticker, "MSFT");
    }

    #[tokio::test]
    async fn articles_filter_by_polarity_and_ticker() {
        let (store, svc) = service().await;
        add_scored(&store, "a1", "AAPL", 0.4).await;
        add_scored(&store, "a2", "AAPL", -0.1).await;
        add_scored(&store, "m1", "MSFT", 0.3).await;

        let pos = svc.articles(Some("aapl"), Some("positive"), None).await.unwrap();
        assert_eq!(pos.len(), 1);
        assert_eq!(pos[0].dedup_key, "a1");
    }

    #[tokio::test]
    async fn daily_sentiments_average_raw_scores() {
        let (store, svc) = service().await;
        add_scored(&store, "a1", "AAPL", 0.4).await;
        add_scored(&store, "a2", "AAPL", -0.2).await;

        let out = svc.daily_sentiments(Some("2026-02-16"), today()).await.unwrap();
        assert_eq!(out.count, 1);
        assert_eq!(out.sentiments[0].name, "Apple Inc.");
        assert_eq!(out.sentiments[0].article_count, 2);
        assert!((out.sentiments[0].avg_score - 0.1).abs() < 1e-9);
    }
}
