use super::{articles, companies, daily_scores, ArticleFilter, InsertOutcome, NewsStore};
use crate::domain::article::{Article, NewArticle, ScoredArticle, UnscoredArticle};
use crate::domain::company::Company;
use crate::domain::score::{DailyScore, Polarity, RankingEntry};
use crate::error::StoreError;
use crate::sentiment::Sentiment;
use chrono::NaiveDate;

#[derive(Clone)]
pub struct PgStore {
    pool: sqlx::PgPool,
}

impl PgStore {
    pub fn new(pool: sqlx::PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &sqlx::PgPool {
        &self.pool
    }
}

#[async_trait::async_trait]
impl NewsStore for PgStore {
    async fn upsert_companies(&self, list: &[Company]) -> Result<u64, StoreError> {
        companies::upsert_companies(&self.pool, list).await
    }

    async fn list_companies(&self) -> Result<Vec<Company>, StoreError> {
        companies::list_companies(&self.pool).await
    }

    async fn get_company(&self, ticker: &str) -> Result<Option<Company>, StoreError> {
        companies::get_company(&self.pool, ticker).await
    }

    async fn insert_article(&self, article: &NewArticle) -> Result<InsertOutcome, StoreError> {
        articles::insert_article(&self.pool, article).await
    }

    async fn unscored_articles(&self, limit: i64) -> Result<Vec<UnscoredArticle>, StoreError> {
        articles::unscored_articles(&self.pool, limit).await
    }

    async fn record_sentiment(
        &self,
        article_id: i64,
        sentiment: Sentiment,
    ) -> Result<bool, StoreError> {
        articles::record_sentiment(&self.pool, article_id, sentiment).await
    }

    async fn reset_sentiment(&self, ticker: Option<&str>) -> Result<u64, StoreError> {
        articles::reset_sentiment(&self.pool, ticker).await
    }

    async fn scored_articles_for_date(
        &self,
        date: NaiveDate,
    ) -> Result<Vec<ScoredArticle>, StoreError> {
        articles::scored_articles_for_date(&self.pool, date).await
    }

    async fn replace_daily_scores(
        &self,
        date: NaiveDate,
        scores: &[DailyScore],
    ) -> Result<u64, StoreError> {
        daily_scores::replace_for_date(&self.pool, date, scores).await
    }

    async fn list_articles(&self, filter: &ArticleFilter) -> Result<Vec<Article>, StoreError> {
        articles::list_articles(&self.pool, filter).await
    }

    async fn ranking(
        &self,
        date: NaiveDate,
        polarity: Option<Polarity>,
        limit: i64,
    ) -> Result<Vec<RankingEntry>, StoreError> {
        daily_scores::ranking(&self.pool, date, polarity, limit).await
    }

    async fn score_history(
        &self,
        ticker: &str,
        since: NaiveDate,
    ) -> Result<Vec<DailyScore>, StoreError> {
        daily_scores::history(&self.pool, ticker, since).await
    }
}
