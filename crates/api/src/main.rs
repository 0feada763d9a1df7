use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use chrono::{NaiveDate, Utc};
use newsspy_core::aggregate::AggregationReport;
use newsspy_core::domain::article::Article;
use newsspy_core::domain::company::Company;
use newsspy_core::domain::score::RankingEntry;
use newsspy_core::error::{QueryError, StoreError};
use newsspy_core::query::{DailySentiments, QueryService, ScoreHistory};
use newsspy_core::storage::postgres::PgStore;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let settings = newsspy_core::config::Settings::from_env()?;
    let _sentry_guard = init_sentry(&settings);

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .with(sentry_tracing::layer())
        .init();
    let pool: Option<sqlx::PgPool> = match settings.require_database_url() {
        Ok(db_url) => match sqlx::postgres::PgPoolOptions::new()
            .max_connections(5)
            .connect(db_url)
            .await
        {
            Ok(pool) => match newsspy_core::storage::migrate(&pool).await {
                Ok(()) => Some(pool),
                Err(e) => {
                    sentry_anyhow::capture_anyhow(&e);
                    tracing::error!(error = %e, "db migrations failed; starting API in degraded mode");
                    None
                }
            },
            Err(e) => {
                let err = anyhow::Error::new(e);
                sentry_anyhow::capture_anyhow(&err);
                tracing::error!(error = %err, "db connect failed; starting API in degraded mode");
                None
            }
        },
        Err(e) => {
            sentry_anyhow::capture_anyhow(&e);
            tracing::error!(error = %e, "DATABASE_URL missing; starting API in degraded mode");
            None
        }
    };

    let state = AppState {
        query: pool.map(|pool| QueryService::new(Arc::new(PgStore::new(pool)))),
    };

    let app = router(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let port: u16 = std::env::var("PORT")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(3000);
    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));

    tracing::info!(%addr, "api listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

fn router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/companies", get(list_companies))
        .route("/articles", get(list_articles))
        .route("/scores/ranking/:date", get(get_ranking))
        .route("/scores/calculate/:date", post(calculate_scores))
        .route("/scores/company/:ticker", get(get_score_history))
        .route("/sentiments/daily", get(get_daily_sentiments))
        .route("/sentiments/:ticker", get(get_sentiment_history))
        .with_state(state)
}

async fn healthz() -> &'static str {
    "ok"
}

#[derive(Clone)]
struct AppState {
    query: Option<QueryService>,
}

type ApiError = (StatusCode, String);

impl AppState {
    fn query(&self) -> Result<&QueryService, ApiError> {
        self.query
            .as_ref()
            .ok_or((StatusCode::SERVICE_UNAVAILABLE, "database unavailable".to_string()))
    }
}

fn api_error(err: QueryError) -> ApiError {
    match err {
        QueryError::Validation(msg) => (StatusCode::BAD_REQUEST, msg),
        e @ QueryError::NotFound(_) => (StatusCode::NOT_FOUND, e.to_string()),
        QueryError::Store(StoreError::Unavailable(msg)) => {
            tracing::error!(error = %msg, "store unavailable");
            (StatusCode::SERVICE_UNAVAILABLE, "database unavailable".to_string())
        }
        other => {
            let err = anyhow::Error::new(other);
            sentry_anyhow::capture_anyhow(&err);
            tracing::error!(error = %format!("{err:#}"), "query failed");
            (StatusCode::INTERNAL_SERVER_ERROR, "internal error".to_string())
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct ArticlesParams {
    ticker: Option<String>,
    sentiment: Option<String>,
    limit: Option<i64>,
}

#[derive(Debug, Default, Deserialize)]
struct RankingParams {
    sentiment: Option<String>,
    limit: Option<i64>,
}

#[derive(Debug, Default, Deserialize)]
struct HistoryParams {
    days: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
struct DailyParams {
    date: Option<String>,
}

async fn list_companies(State(state): State<AppState>) -> Result<Json<Vec<Company>>, ApiError> {
    let companies = state.query()?.companies().await.map_err(api_error)?;
    Ok(Json(companies))
}

async fn list_articles(
    State(state): State<AppState>,
    Query(params): Query<ArticlesParams>,
) -> Result<Json<Vec<Article>>, ApiError> {
    let articles = state
        .query()?
        .articles(
            params.ticker.as_deref(),
            params.sentiment.as_deref(),
            params.limit,
        )
        .await
        .map_err(api_error)?;
    Ok(Json(articles))
}

async fn get_ranking(
    State(state): State<AppState>,
    Path(date): Path<String>,
    Query(params): Query<RankingParams>,
) -> Result<Json<Vec<RankingEntry>>, ApiError> {
    let ranking = state
        .query()?
        .ranking(&date, params.sentiment.as_deref(), params.limit)
        .await
        .map_err(api_error)?;
    Ok(Json(ranking))
}

async fn calculate_scores(
    State(state): State<AppState>,
    Path(date): Path<String>,
) -> Result<Json<AggregationReport>, ApiError> {
    let report = state
        .query()?
        .calculate(&date, Utc::now())
        .await
        .map_err(api_error)?;
    Ok(Json(report))
}

async fn get_score_history(
    State(state): State<AppState>,
    Path(ticker): Path<String>,
    Query(params): Query<HistoryParams>,
) -> Result<Json<ScoreHistory>, ApiError> {
    let history = state
        .query()?
        .history(&ticker, params.days, Utc::now().date_naive())
        .await
        .map_err(api_error)?;
    Ok(Json(history))
}

#[derive(Debug, Serialize)]
struct SentimentPoint {
    date: NaiveDate,
    avg_score: f64,
    article_count: i32,
}

#[derive(Debug, Serialize)]
struct SentimentHistory {
    ticker: String,
    name: String,
    days: u32,
    count: usize,
    history: Vec<SentimentPoint>,
}

impl From<ScoreHistory> for SentimentHistory {
    fn from(h: ScoreHistory) -> Self {
        Self {
            ticker: h.ticker,
            name: h.name,
            days: h.days,
            count: h.count,
            history: h
                .history
                .into_iter()
                .map(|s| SentimentPoint {
                    date: s.date,
                    avg_score: s.avg_sentiment,
                    article_count: s.article_count,
                })
                .collect(),
        }
    }
}

async fn get_sentiment_history(
    State(state): State<AppState>,
    Path(ticker): Path<String>,
    Query(params): Query<HistoryParams>,
) -> Result<Json<SentimentHistory>, ApiError> {
    let history = state
        .query()?
        .history(&ticker, params.days, Utc::now().date_naive())
        .await
        .map_err(api_error)?;
    Ok(Json(history.into()))
}

async fn get_daily_sentiments(
    State(state): State<AppState>,
    Query(params): Query<DailyParams>,
) -> Result<Json<DailySentiments>, ApiError> {
    let out = state
        .query()?
        .daily_sentiments(params.date.as_deref(), Utc::now().date_naive())
        .await
        .map_err(api_error)?;
    Ok(Json(out))
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}

fn init_sentry(settings: &newsspy_core::config::Settings) -> Option<sentry::ClientInitGuard> {
    let dsn = settings.sentry_dsn.as_deref()?;
    Some(sentry::init((
        dsn,
        sentry::ClientOptions {
            release: sentry::release_name!(),
            ..Default::default()
        },
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use newsspy_core::storage::memory::MemoryStore;
    use newsspy_core::storage::NewsStore;

    async fn memory_state() -> AppState {
        let store = Arc::new(MemoryStore::new());
        store
            .upsert_companies(&[Company::new("AAPL", "Apple Inc.")])
            .await
            .unwrap();
        AppState {
            query: Some(QueryService::new(store)),
        }
    }

    #[test]
    fn maps_query_errors_to_status_codes() {
        let (code, _) = api_error(QueryError::Validation("bad".into()));
        assert_eq!(code, StatusCode::BAD_REQUEST);

        let (code, body) = api_error(QueryError::NotFound("ticker ZZZZ".into()));
        assert_eq!(code, StatusCode::NOT_FOUND);
        assert_eq!(body, "ticker ZZZZ not found");

        let (code, _) = api_error(QueryError::Store(StoreError::Unavailable("pool".into())));
        assert_eq!(code, StatusCode::SERVICE_UNAVAILABLE);

        let (code, body) = api_error(QueryError::Internal(anyhow::anyhow!("boom")));
        assert_eq!(code, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body, "internal error");
    }

    #[tokio::test]
    async fn degraded_mode_returns_503() {
        let state = AppState { query: None };
        let err = list_companies(State(state)).await.unwrap_err();
        assert_eq!(err.0, StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn unknown_ticker_sentiment_history_is_404() {
        let state = memory_state().await;
        let err = get_sentiment_history(
            State(state),
            Path("ZZZZ".to_string()),
            Query(HistoryParams::default()),
        )
        .await
        .unwrap_err();
        assert_eq!(err.0, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn malformed_ranking_date_is_400() {
        let state = memory_state().await;
        let err = get_ranking(
            State(state),
            Path("16-02-2026".to_string()),
            Query(RankingParams::default()),
        )
        .await
        .unwrap_err();
        assert_eq!(err.0, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn calculate_on_empty_date_reports_no_articles() {
        let state = memory_state().await;
        let Json(report) = calculate_scores(State(state), Path("2026-02-16".to_string()))
            .await
            .unwrap();
        assert_eq!(report.companies_scored, 0);
        assert_eq!(report.message.as_deref(), Some("no articles found"));
    }

    #[test]
    fn sentiment_history_exposes_avg_score() {
        let date = NaiveDate::from_ymd_opt(2026, 2, 16).unwrap();
        let h = SentimentHistory::from(ScoreHistory {
            ticker: "AAPL".into(),
            name: "Apple Inc.".into(),
            days: 7,
            count: 1,
            history: vec![newsspy_core::domain::score::DailyScore {
                ticker: "AAPL".into(),
                date,
                composite_score: 0.3,
                article_count: 2,
                avg_sentiment: 0.2,
                rank: 1,
            }],
        });

        let v = serde_json::to_value(&h).unwrap();
        assert_eq!(
            v["history"][0],
            serde_json::json!({"date": "2026-02-16", "avg_score": 0.2, "article_count": 2})
        );
    }

    #[test]
    fn router_builds_with_all_routes() {
        let _ = router(AppState { query: None });
    }
}
