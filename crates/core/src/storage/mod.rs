pub mod article_store;
pub mod articles;
pub mod companies;
pub mod daily_scores;
pub mod lock;
pub mod memory;
pub mod postgres;
pub mod retry;

use crate::domain::article::{Article, NewArticle, ScoredArticle, UnscoredArticle};
use crate::domain::company::Company;
use crate::domain::score::{DailyScore, Polarity, RankingEntry};
use crate::error::StoreError;
use crate::sentiment::Sentiment;
use anyhow::Context;
use chrono::NaiveDate;

pub async fn migrate(pool: &sqlx::PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .context("sqlx migrations failed")?;
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted,
    Duplicate,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArticleFilter {
    pub ticker: Option<String>,
    pub polarity: Option<Polarity>,
    pub limit: i64,
}

/// Persistence seam for the pipeline and the query surface.
///
/// Every method is one logical unit of work; multi-row writes are atomic.
#[async_trait::async_trait]
pub trait NewsStore: Send + Sync {
    /// Idempotent: existing tickers get their name and keywords refreshed.
    async fn upsert_companies(&self, companies: &[Company]) -> Result<u64, StoreError>;

    async fn list_companies(&self) -> Result<Vec<Company>, StoreError>;

    async fn get_company(&self, ticker: &str) -> Result<Option<Company>, StoreError>;

    /// Insert-if-absent keyed by `dedup_key`. Never overwrites.
    async fn insert_article(&self, article: &NewArticle) -> Result<InsertOutcome, StoreError>;

    /// Oldest-first articles whose sentiment is still null.
    async fn unscored_articles(&self, limit: i64) -> Result<Vec<UnscoredArticle>, StoreError>;

    /// Sets sentiment only if it is still null. Returns whether the row changed.
    async fn record_sentiment(&self, article_id: i64, sentiment: Sentiment)
        -> Result<bool, StoreError>;

    /// Clears sentiment so the next analyze phase picks the articles up again.
    async fn reset_sentiment(&self, ticker: Option<&str>) -> Result<u64, StoreError>;

    /// Scored articles published on `date` (UTC), ordered by ticker, publish time, id.
    async fn scored_articles_for_date(&self, date: NaiveDate)
        -> Result<Vec<ScoredArticle>, StoreError>;

    /// Replaces every DailyScore row for `date` with `scores`, all or nothing.
    async fn replace_daily_scores(
        &self,
        date: NaiveDate,
        scores: &[DailyScore],
    ) -> Result<u64, StoreError>;

    /// Newest first.
    async fn list_articles(&self, filter: &ArticleFilter) -> Result<Vec<Article>, StoreError>;

    /// Rank order. Polarity filters on the composite score sign.
    async fn ranking(
        &self,
        date: NaiveDate,
        polarity: Option<Polarity>,
        limit: i64,
    ) -> Result<Vec<RankingEntry>, StoreError>;

    /// Rows for `ticker` with date >= `since`, newest first.
    async fn score_history(
        &self,
        ticker: &str,
        since: NaiveDate,
    ) -> Result<Vec<DailyScore>, StoreError>;
}
