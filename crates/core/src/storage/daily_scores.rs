use crate::domain::score::{DailyScore, Polarity, RankingEntry};
use crate::error::StoreError;
use crate::storage::lock;
use chrono::NaiveDate;

type ScoreRow = (String, NaiveDate, f64, i32, f64, i32);

/// Delete-then-insert inside one transaction. The transaction-scoped advisory lock serializes
/// concurrent replaces of the same date; readers see either the old set or the new one.
pub async fn replace_for_date(
    pool: &sqlx::PgPool,
    date: NaiveDate,
    scores: &[DailyScore],
) -> Result<u64, StoreError> {
    if let Some(bad) = scores.iter().find(|s| s.date != date) {
        return Err(anyhow::anyhow!(
            "score for {} has date {} but replace targets {date}",
            bad.ticker,
            bad.date
        )
        .into());
    }

    let mut tx = pool.begin().await?;
    lock::lock_score_date(&mut tx, date).await?;

    sqlx::query("DELETE FROM daily_scores WHERE score_date = $1")
        .persistent(false)
        .bind(date)
        .execute(&mut *tx)
        .await?;

    let mut affected: u64 = 0;
    if !scores.is_empty() {
        let mut qb = sqlx::QueryBuilder::new(
            "INSERT INTO daily_scores \
             (company_ticker, score_date, composite_score, article_count, avg_sentiment, rank) ",
        );
        qb.push_values(scores, |mut b, s| {
            b.push_bind(s.ticker.clone())
                .push_bind(s.date)
                .push_bind(s.composite_score)
                .push_bind(s.article_count)
                .push_bind(s.avg_sentiment)
                .push_bind(s.rank);
        });
        affected = qb
            .build()
            .persistent(false)
            .execute(&mut *tx)
            .await?
            .rows_affected();
    }

    tx.commit().await?;

    tracing::debug!(%date, rows = affected, "daily_scores replaced");
    Ok(affected)
}

pub async fn ranking(
    pool: &sqlx::PgPool,
    date: NaiveDate,
    polarity: Option<Polarity>,
    limit: i64,
) -> Result<Vec<RankingEntry>, StoreError> {
    let mut qb = sqlx::QueryBuilder::new(
        "SELECT c.name, s.company_ticker, s.score_date, s.composite_score, s.article_count, \
                s.avg_sentiment, s.rank \
         FROM daily_scores s \
         JOIN companies c ON c.ticker = s.company_ticker \
         WHERE s.score_date = ",
    );
    qb.push_bind(date);
    match polarity {
        Some(Polarity::Positive) => {
            qb.push(" AND s.composite_score > 0");
        }
        Some(Polarity::Negative) => {
            qb.push(" AND s.composite_score < 0");
        }
        None => {}
    }
    qb.push(" ORDER BY s.rank ASC LIMIT ").push_bind(limit);

    let rows = qb
        .build_query_as::<(String, String, NaiveDate, f64, i32, f64, i32)>()
        .persistent(false)
        .fetch_all(pool)
        .await?;

    Ok(rows
        .into_iter()
        .map(
            |(name, ticker, date, composite_score, article_count, avg_sentiment, rank)| RankingEntry {
                name,
                score: DailyScore {
                    ticker,
                    date,
                    composite_score,
                    article_count,
                    avg_sentiment,
                    rank,
                },
            },
        )
        .collect())
}

pub async fn history(
    pool: &sqlx::PgPool,
    ticker: &str,
    since: NaiveDate,
) -> Result<Vec<DailyScore>, StoreError> {
    let rows = sqlx::query_as::<_, ScoreRow>(
        "SELECT company_ticker, score_date, composite_score, article_count, avg_sentiment, rank \
         FROM daily_scores \
         WHERE company_ticker = $1 AND score_date >= $2 \
         ORDER BY score_date DESC",
    )
    .persistent(false)
    .bind(ticker)
    .bind(since)
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(
            |(ticker, date, composite_score, article_count, avg_sentiment, rank)| DailyScore {
                ticker,
                date,
                composite_score,
                article_count,
                avg_sentiment,
                rank,
            },
        )
        .collect())
}
