use super::{ArticleFilter, InsertOutcome, NewsStore};
use crate::domain::article::{Article, NewArticle, ScoredArticle, UnscoredArticle};
use crate::domain::company::Company;
use crate::domain::score::{DailyScore, Polarity, RankingEntry};
use crate::error::StoreError;
use crate::sentiment::Sentiment;
use chrono::{NaiveDate, Utc};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU32, Ordering};
use tokio::sync::Mutex;

#[derive(Default)]
struct Inner {
    companies: BTreeMap<String, Company>,
    articles: Vec<Article>,
    by_dedup_key: HashMap<String, usize>,
    scores: BTreeMap<(NaiveDate, String), DailyScore>,
    next_id: i64,
}

/// Process-local store with the same ordering and uniqueness rules as the Postgres one.
/// Backs `--dry-run` and the test suite.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
    pending_contention: AtomicU32,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// The next `n` article inserts fail with `StoreError::Contention`.
    pub fn inject_contention(&self, n: u32) {
        self.pending_contention.store(n, Ordering::SeqCst);
    }

    fn take_contention(&self) -> bool {
        self.pending_contention
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }

    pub async fn article_count(&self) -> usize {
        self.inner.lock().await.articles.len()
    }

    pub async fn all_articles(&self) -> Vec<Article> {
        self.inner.lock().await.articles.clone()
    }
}

fn sort_scores_by_rank(rows: &mut [DailyScore]) {
    rows.sort_by(|a, b| a.rank.cmp(&b.rank).then_with(|| a.ticker.cmp(&b.ticker)));
}

#[async_trait::async_trait]
impl NewsStore for MemoryStore {
    async fn upsert_companies(&self, list: &[Company]) -> Result<u64, StoreError> {
        let mut inner = self.inner.lock().await;
        for c in list {
            let ticker = c.ticker.trim().to_string();
            inner.companies.insert(
                ticker.clone(),
                Company {
                    ticker,
                    name: c.name.trim().to_string(),
                    keywords: c.keywords.clone(),
                },
            );
        }
        Ok(list.len() as u64)
    }

    async fn list_companies(&self) -> Result<Vec<Company>, StoreError> {
        Ok(self.inner.lock().await.companies.values().cloned().collect())
    }

    async fn get_company(&self, ticker: &str) -> Result<Option<Company>, StoreError> {
        Ok(self.inner.lock().await.companies.get(ticker).cloned())
    }

    async fn insert_article(&self, article: &NewArticle) -> Result<InsertOutcome, StoreError> {
        if self.take_contention() {
            return Err(StoreError::Contention("injected".to_string()));
        }

        let mut inner = self.inner.lock().await;
        if !inner.companies.contains_key(&article.ticker) {
            return Err(anyhow::anyhow!("unknown company ticker {}", article.ticker).into());
        }
        if inner.by_dedup_key.contains_key(&article.dedup_key) {
            return Ok(InsertOutcome::Duplicate);
        }

        inner.next_id += 1;
        let row = Article {
            id: inner.next_id,
            dedup_key: article.dedup_key.clone(),
            ticker: article.ticker.clone(),
            title: article.title.clone(),
            content: article.content.clone(),
            source: article.source.clone(),
            source_url: article.source_url.clone(),
            published_at: article.published_at,
            sentiment_score: None,
            sentiment_confidence: None,
            ingested_at: Utc::now(),
        };
        let idx = inner.articles.len();
        inner.by_dedup_key.insert(row.dedup_key.clone(), idx);
        inner.articles.push(row);
        Ok(InsertOutcome::Inserted)
    }

    async fn unscored_articles(&self, limit: i64) -> Result<Vec<UnscoredArticle>, StoreError> {
        let inner = self.inner.lock().await;
        let mut rows: Vec<&Article> = inner
            .articles
            .iter()
            .filter(|a| a.sentiment_score.is_none())
            .collect();
        rows.sort_by(|a, b| a.published_at.cmp(&b.published_at).then(a.id.cmp(&b.id)));

        Ok(rows
            .into_iter()
            .take(limit.max(0) as usize)
            .map(|a| UnscoredArticle {
                id: a.id,
                dedup_key: a.dedup_key.clone(),
                title: a.title.clone(),
                content: a.content.clone(),
            })
            .collect())
    }

    async fn record_sentiment(
        &self,
        article_id: i64,
        sentiment: Sentiment,
    ) -> Result<bool, StoreError> {
        if !sentiment.is_within_bounds() {
            return Err(anyhow::anyhow!("sentiment out of range: {sentiment:?}").into());
        }

        let mut inner = self.inner.lock().await;
        match inner
            .articles
            .iter_mut()
            .find(|a| a.id == article_id && a.sentiment_score.is_none())
        {
            Some(a) => {
                a.sentiment_score = Some(sentiment.score);
                a.sentiment_confidence = Some(sentiment.confidence);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn reset_sentiment(&self, ticker: Option<&str>) -> Result<u64, StoreError> {
        let mut inner = self.inner.lock().await;
        let mut n = 0;
        for a in inner.articles.iter_mut() {
            if a.sentiment_score.is_some() && ticker.map_or(true, |t| a.ticker == t) {
                a.sentiment_score = None;
                a.sentiment_confidence = None;
                n += 1;
            }
        }
        Ok(n)
    }

    async fn scored_articles_for_date(
        &self,
        date: NaiveDate,
    ) -> Result<Vec<ScoredArticle>, StoreError> {
        let inner = self.inner.lock().await;
        let mut rows: Vec<&Article> = inner
            .articles
            .iter()
            .filter(|a| a.sentiment_score.is_some() && a.published_at.date_naive() == date)
            .collect();
        rows.sort_by(|a, b| {
            a.ticker
                .cmp(&b.ticker)
                .then(a.published_at.cmp(&b.published_at))
                .then(a.id.cmp(&b.id))
        });

        Ok(rows
            .into_iter()
            .filter_map(|a| {
                a.sentiment_score.map(|score| ScoredArticle {
                    ticker: a.ticker.clone(),
                    published_at: a.published_at,
                    sentiment_score: score,
                })
            })
            .collect())
    }

    async fn replace_daily_scores(
        &self,
        date: NaiveDate,
        scores: &[DailyScore],
    ) -> Result<u64, StoreError> {
        let mut inner = self.inner.lock().await;

        // Validate everything before touching state so a bad batch leaves the old set intact.
        for s in scores {
            if s.date != date {
                return Err(anyhow::anyhow!(
                    "score for {} has date {} but replace targets {date}",
                    s.ticker,
                    s.date
                )
                .into());
            }
            if !inner.companies.contains_key(&s.ticker) {
                return Err(anyhow::anyhow!("unknown company ticker {}", s.ticker).into());
            }
        }

        inner.scores.retain(|(d, _), _| *d != date);
        for s in scores {
            inner.scores.insert((date, s.ticker.clone()), s.clone());
        }
        Ok(scores.len() as u64)
    }

    async fn list_articles(&self, filter: &ArticleFilter) -> Result<Vec<Article>, StoreError> {
        let inner = self.inner.lock().await;
        let mut rows: Vec<&Article> = inner
            .articles
            .iter()
            .filter(|a| filter.ticker.as_deref().map_or(true, |t| a.ticker == t))
            .filter(|a| match filter.polarity {
                Some(p) => a.sentiment_score.is_some_and(|s| p.matches(s)),
                None => true,
            })
            .collect();
        rows.sort_by(|a, b| b.published_at.cmp(&a.published_at).then(b.id.cmp(&a.id)));

        Ok(rows
            .into_iter()
            .take(filter.limit.max(0) as usize)
            .cloned()
            .collect())
    }

    async fn ranking(
        &self,
        date: NaiveDate,
        polarity: Option<Polarity>,
        limit: i64,
    ) -> Result<Vec<RankingEntry>, StoreError> {
        let inner = self.inner.lock().await;
        let mut rows: Vec<DailyScore> = inner
            .scores
            .range((date, String::new())..)
            .take_while(|((d, _), _)| *d == date)
            .map(|(_, s)| s.clone())
            .filter(|s| polarity.map_or(true, |p| p.matches(s.composite_score)))
            .collect();
        sort_scores_by_rank(&mut rows);

        Ok(rows
            .into_iter()
            .take(limit.max(0) as usize)
            .map(|score| RankingEntry {
                name: inner
                    .companies
                    .get(&score.ticker)
                    .map(|c| c.name.clone())
                    .unwrap_or_else(|| score.ticker.clone()),
                score,
            })
            .collect())
    }

    async fn score_history(
        &self,
        ticker: &str,
        since: NaiveDate,
    ) -> Result<Vec<DailyScore>, StoreError> {
        let inner = self.inner.lock().await;
        let mut rows: Vec<DailyScore> = inner
            .scores
            .values()
            .filter(|s| s.ticker == ticker && s.date >= since)
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.date.cmp(&a.date));
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn new_article(key: &str, ticker: &str, hour: u32) -> NewArticle {
        NewArticle {
            dedup_key: key.to_string(),
            ticker: ticker.to_string(),
            title: format!("title {key}"),
            content: String::new(),
            source: "test".to_string(),
            source_url: None,
            published_at: Utc.with_ymd_and_hms(2026, 2, 16, hour, 0, 0).unwrap(),
        }
    }

    async fn seeded() -> MemoryStore {
        let store = MemoryStore::new();
        store
            .upsert_companies(&[Company::new("AAPL", "Apple Inc."), Company::new("MSFT", "Microsoft")])
            .await
            .unwrap();
        store
    }

    #[tokio::test]
    async fn duplicate_dedup_key_is_not_inserted_twice() {
        let store = seeded().await;
        let a = new_article("k1", "AAPL", 9);

        assert_eq!(store.insert_article(&a).await.unwrap(), InsertOutcome::Inserted);
        assert_eq!(store.insert_article(&a).await.unwrap(), InsertOutcome::Duplicate);
        assert_eq!(store.article_count().await, 1);
    }

    #[tokio::test]
    async fn unknown_ticker_is_rejected() {
        let store = seeded().await;
        let err = store
            .insert_article(&new_article("k1", "ZZZZ", 9))
            .await
            .unwrap_err();
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn record_sentiment_only_fills_null() {
        let store = seeded().await;
        store.insert_article(&new_article("k1", "AAPL", 9)).await.unwrap();
        let id = store.unscored_articles(10).await.unwrap()[0].id;

        assert!(store.record_sentiment(id, Sentiment::new(0.5, 0.9)).await.unwrap());
        assert!(!store.record_sentiment(id, Sentiment::new(-0.5, 0.9)).await.unwrap());
        assert!(store.unscored_articles(10).await.unwrap().is_empty());

        assert_eq!(store.reset_sentiment(Some("AAPL")).await.unwrap(), 1);
        assert_eq!(store.unscored_articles(10).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn unscored_is_oldest_first() {
        let store = seeded().await;
        store.insert_article(&new_article("late", "AAPL", 12)).await.unwrap();
        store.insert_article(&new_article("early", "MSFT", 3)).await.unwrap();

        let keys: Vec<String> = store
            .unscored_articles(10)
            .await
            .unwrap()
            .into_iter()
            .map(|a| a.dedup_key)
            .collect();
        assert_eq!(keys, vec!["early", "late"]);
    }

    #[tokio::test]
    async fn replace_daily_scores_drops_previous_rows_for_the_date() {
        let store = seeded().await;
        let date = NaiveDate::from_ymd_opt(2026, 2, 16).unwrap();
        let row = |ticker: &str, rank| DailyScore {
            ticker: ticker.to_string(),
            date,
            composite_score: 0.1,
            article_count: 1,
            avg_sentiment: 0.1,
            rank,
        };

        store
            .replace_daily_scores(date, &[row("AAPL", 1), row("MSFT", 2)])
            .await
            .unwrap();
        store.replace_daily_scores(date, &[row("MSFT", 1)]).await.unwrap();

        let ranking = store.ranking(date, None, 100).await.unwrap();
        assert_eq!(ranking.len(), 1);
        assert_eq!(ranking[0].score.ticker, "MSFT");
        assert_eq!(ranking[0].name, "Microsoft");
    }

    #[tokio::test]
    async fn mismatched_date_leaves_existing_scores() {
        let store = seeded().await;
        let date = NaiveDate::from_ymd_opt(2026, 2, 16).unwrap();
        let good = DailyScore {
            ticker: "AAPL".to_string(),
            date,
            composite_score: 0.1,
            article_count: 1,
            avg_sentiment: 0.1,
            rank: 1,
        };
        store.replace_daily_scores(date, &[good.clone()]).await.unwrap();

        let bad = DailyScore {
            date: date.succ_opt().unwrap(),
            ..good
        };
        assert!(store.replace_daily_scores(date, &[bad]).await.is_err());
        assert_eq!(store.ranking(date, None, 100).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn injected_contention_is_consumed() {
        let store = seeded().await;
        store.inject_contention(1);

        let err = store
            .insert_article(&new_article("k1", "AAPL", 9))
            .await
            .unwrap_err();
        assert!(err.is_retryable());
        assert!(store.insert_article(&new_article("k1", "AAPL", 9)).await.is_ok());
    }
}
