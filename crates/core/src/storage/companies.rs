use crate::domain::company::Company;
use crate::error::StoreError;

pub async fn upsert_companies(
    pool: &sqlx::PgPool,
    companies: &[Company],
) -> Result<u64, StoreError> {
    if companies.is_empty() {
        return Ok(0);
    }

    let mut tx = pool.begin().await?;

    let mut qb = sqlx::QueryBuilder::new("INSERT INTO companies (ticker, name, keywords) ");
    qb.push_values(companies, |mut b, c| {
        b.push_bind(c.ticker.trim())
            .push_bind(c.name.trim())
            .push_bind(c.keywords.clone());
    });
    qb.push(
        " ON CONFLICT (ticker) DO UPDATE \
           SET name = EXCLUDED.name, keywords = EXCLUDED.keywords, updated_at = now()",
    );

    let res = qb.build().persistent(false).execute(&mut *tx).await?;
    tx.commit().await?;
    Ok(res.rows_affected())
}

pub async fn list_companies(pool: &sqlx::PgPool) -> Result<Vec<Company>, StoreError> {
    let rows = sqlx::query_as::<_, (String, String, Vec<String>)>(
        "SELECT ticker, name, keywords FROM companies ORDER BY ticker ASC",
    )
    .persistent(false)
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(|(ticker, name, keywords)| Company {
            ticker,
            name,
            keywords,
        })
        .collect())
}

pub async fn get_company(pool: &sqlx::PgPool, ticker: &str) -> Result<Option<Company>, StoreError> {
    let row = sqlx::query_as::<_, (String, String, Vec<String>)>(
        "SELECT ticker, name, keywords FROM companies WHERE ticker = $1",
    )
    .persistent(false)
    .bind(ticker)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(|(ticker, name, keywords)| Company {
        ticker,
        name,
        keywords,
    }))
}
