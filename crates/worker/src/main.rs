use anyhow::Context;
use clap::Parser;
use newsspy_core::pipeline::{Pipeline, PipelineOptions};
use newsspy_core::storage::lock::RunLock;
use newsspy_core::storage::memory::MemoryStore;
use newsspy_core::storage::postgres::PgStore;
use newsspy_core::storage::NewsStore;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Parser)]
#[command(name = "newsspy_worker")]
struct Args {
    /// Date to aggregate (YYYY-MM-DD). Defaults to today's UTC date.
    #[arg(long)]
    target_date: Option<String>,

    /// Run every phase against an in-memory store; nothing is written to the database.
    #[arg(long)]
    dry_run: bool,

    /// Clear stored sentiment before the analyze phase so articles are scored again.
    #[arg(long)]
    rescore: bool,

    /// Limit --rescore to one ticker.
    #[arg(long, requires = "rescore")]
    ticker: Option<String>,
}

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

    let args = Args::parse();

    let now = chrono::Utc::now();
    let target_date = newsspy_core::time::resolve_target_date(args.target_date.as_deref(), now)?;

    let companies = settings.companies()?;
    let source = newsspy_core::ingest::from_settings(&settings)?;
    let analyzer = newsspy_core::sentiment::from_settings(&settings)?;
    let options = PipelineOptions::from_env();

    tracing::info!(
        %target_date,
        companies = companies.len(),
        analyzer = analyzer.name(),
        dry_run = args.dry_run,
        "starting batch"
    );

    if args.dry_run {
        let store: Arc<dyn NewsStore> = Arc::new(MemoryStore::new());
        let pipeline = Pipeline::new(store, source, analyzer, companies, options);
        return run(&pipeline, &args, target_date, now).await;
    }

    let db_url = settings.require_database_url()?;

    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(options.analyze_concurrency.max(options.fetch_concurrency) as u32 + 2)
        .connect(db_url)
        .await
        .context("connect DATABASE_URL failed")?;

    newsspy_core::storage::migrate(&pool).await?;

    // Held (with its connection) until the run finishes.
    let Some(run_lock) = RunLock::try_acquire(&pool, target_date).await? else {
        tracing::warn!(%target_date, "run lock not acquired; another batch for this date is in progress");
        return Ok(());
    };

    let store: Arc<dyn NewsStore> = Arc::new(PgStore::new(pool.clone()));
    let pipeline = Pipeline::new(store, source, analyzer, companies, options);
    let result = run(&pipeline, &args, target_date, now).await;

    if let Err(err) = &result {
        sentry_anyhow::capture_anyhow(err);
        tracing::error!(%target_date, error = %format!("{err:#}"), "batch failed");
    }

    let lock_key = run_lock.key();
    match run_lock.release().await {
        Ok(true) => {}
        Ok(false) => tracing::warn!(%target_date, lock_key, "run lock was not held at release"),
        Err(err) => tracing::error!(%target_date, lock_key, error = %format!("{err:#}"), "run lock release failed"),
    }
    result
}

async fn run(
    pipeline: &Pipeline,
    args: &Args,
    target_date: chrono::NaiveDate,
    now: chrono::DateTime<chrono::Utc>,
) -> anyhow::Result<()> {
    if args.rescore {
        let ticker = args.ticker.as_deref().map(|t| t.trim().to_ascii_uppercase());
        pipeline.reset_sentiment(ticker.as_deref()).await?;
    }

    let report = pipeline.run(target_date, now).await?;
    let summary = serde_json::to_string(&report).context("serialize run report")?;
    tracing::info!(%target_date, report = %summary, "batch finished");
    Ok(())
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
