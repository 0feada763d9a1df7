use crate::domain::article::{Article, NewArticle, ScoredArticle, UnscoredArticle};
use crate::error::StoreError;
use crate::sentiment::Sentiment;
use crate::storage::{ArticleFilter, InsertOutcome};
use crate::domain::score::Polarity;
use crate::time::day_bounds;
use chrono::{DateTime, NaiveDate, Utc};

type ArticleRow = (
    i64,
    String,
    String,
    String,
    String,
    String,
    Option<String>,
    DateTime<Utc>,
    Option<f64>,
    Option<f64>,
    DateTime<Utc>,
);

const ARTICLE_COLUMNS: &str = "id, dedup_key, company_ticker, title, content, source, source_url, \
     published_at, sentiment_score, sentiment_confidence, ingested_at";

/// The unique constraint on `dedup_key` is what makes concurrent inserts safe; a conflict is a
/// duplicate, not an error.
pub async fn insert_article(
    pool: &sqlx::PgPool,
    article: &NewArticle,
) -> Result<InsertOutcome, StoreError> {
    let res = sqlx::query(
        "INSERT INTO articles (dedup_key, company_ticker, title, content, source, source_url, published_at) \
         VALUES ($1, $2, $3, $4, $5, $6, $7) \
         ON CONFLICT (dedup_key) DO NOTHING",
    )
    .persistent(false)
    .bind(&article.dedup_key)
    .bind(&article.ticker)
    .bind(&article.title)
    .bind(&article.content)
    .bind(&article.source)
    .bind(&article.source_url)
    .bind(article.published_at)
    .execute(pool)
    .await?;

    Ok(if res.rows_affected() == 1 {
        InsertOutcome::Inserted
    } else {
        InsertOutcome::Duplicate
    })
}

pub async fn unscored_articles(
    pool: &sqlx::PgPool,
    limit: i64,
) -> Result<Vec<UnscoredArticle>, StoreError> {
    let rows = sqlx::query_as::<_, (i64, String, String, String)>(
        "SELECT id, dedup_key, title, content \
         FROM articles \
         WHERE sentiment_score IS NULL \
         ORDER BY published_at ASC, id ASC \
         LIMIT $1",
    )
    .persistent(false)
    .bind(limit)
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(|(id, dedup_key, title, content)| UnscoredArticle {
            id,
            dedup_key,
            title,
            content,
        })
        .collect())
}

pub async fn record_sentiment(
    pool: &sqlx::PgPool,
    article_id: i64,
    sentiment: Sentiment,
) -> Result<bool, StoreError> {
    let res = sqlx::query(
        "UPDATE articles SET sentiment_score = $2, sentiment_confidence = $3 \
         WHERE id = $1 AND sentiment_score IS NULL",
    )
    .persistent(false)
    .bind(article_id)
    .bind(sentiment.score)
    .bind(sentiment.confidence)
    .execute(pool)
    .await?;

    Ok(res.rows_affected() == 1)
}

pub async fn reset_sentiment(pool: &sqlx::PgPool, ticker: Option<&str>) -> Result<u64, StoreError> {
    let res = sqlx::query(
        "UPDATE articles SET sentiment_score = NULL, sentiment_confidence = NULL \
         WHERE sentiment_score IS NOT NULL AND ($1::TEXT IS NULL OR company_ticker = $1)",
    )
    .persistent(false)
    .bind(ticker)
    .execute(pool)
    .await?;

    Ok(res.rows_affected())
}

pub async fn scored_articles_for_date(
    pool: &sqlx::PgPool,
    date: NaiveDate,
) -> Result<Vec<ScoredArticle>, StoreError> {
    let (start, end) = day_bounds(date)?;
    let rows = sqlx::query_as::<_, (String, DateTime<Utc>, f64)>(
        "SELECT company_ticker, published_at, sentiment_score \
         FROM articles \
         WHERE published_at >= $1 AND published_at < $2 AND sentiment_score IS NOT NULL \
         ORDER BY company_ticker ASC, published_at ASC, id ASC",
    )
    .persistent(false)
    .bind(start)
    .bind(end)
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(|(ticker, published_at, sentiment_score)| ScoredArticle {
            ticker,
            published_at,
            sentiment_score,
        })
        .collect())
}

pub async fn list_articles(
    pool: &sqlx::PgPool,
    filter: &ArticleFilter,
) -> Result<Vec<Article>, StoreError> {
    let mut qb = sqlx::QueryBuilder::new(format!("SELECT {ARTICLE_COLUMNS} FROM articles WHERE TRUE"));

    if let Some(ticker) = &filter.ticker {
        qb.push(" AND company_ticker = ").push_bind(ticker.clone());
    }
    match filter.polarity {
        Some(Polarity::Positive) => {
            qb.push(" AND sentiment_score > 0");
        }
        Some(Polarity::Negative) => {
            qb.push(" AND sentiment_score < 0");
        }
        None => {}
    }
    qb.push(" ORDER BY published_at DESC, id DESC LIMIT ")
        .push_bind(filter.limit);

    let rows = qb
        .build_query_as::<ArticleRow>()
        .persistent(false)
        .fetch_all(pool)
        .await?;

    Ok(rows.into_iter().map(article_from_row).collect())
}

fn article_from_row(row: ArticleRow) -> Article {
    let (
        id,
        dedup_key,
        ticker,
        title,
        content,
        source,
        source_url,
        published_at,
        sentiment_score,
        sentiment_confidence,
        ingested_at,
    ) = row;

    Article {
        id,
        dedup_key,
        ticker,
        title,
        content,
        source,
        source_url,
        published_at,
        sentiment_score,
        sentiment_confidence,
        ingested_at,
    }
}
