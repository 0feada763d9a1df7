use crate::aggregate::Aggregator;
use crate::domain::article::UnscoredArticle;
use crate::domain::company::Company;
use crate::ingest::provider::NewsSource;
use crate::ingest::types::RawArticle;
use crate::llm::error::LlmDiagnosticsError;
use crate::sentiment::{analysis_text, SentimentAnalyzer};
use crate::storage::article_store::ArticleStore;
use crate::storage::retry::{with_retry, RetryPolicy};
use crate::storage::NewsStore;
use anyhow::Context;
use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::Instrument;
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct PipelineOptions {
    /// Concurrent company fetches. Kept small for third-party rate limits.
    pub fetch_concurrency: usize,
    /// Concurrent analyze workers.
    pub analyze_concurrency: usize,
    /// Max unscored articles picked up per run, oldest first.
    pub analyze_batch: i64,
    pub since_days: u32,
    /// Per-company cap passed to the source.
    pub max_articles: usize,
    pub retry: RetryPolicy,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            fetch_concurrency: 3,
            analyze_concurrency: 5,
            analyze_batch: 1000,
            since_days: 30,
            max_articles: 100,
            retry: RetryPolicy::default(),
        }
    }
}

impl PipelineOptions {
    pub fn from_env() -> Self {
        let mut out = Self::default();

        if let Ok(s) = std::env::var("PIPELINE_FETCH_CONCURRENCY") {
            if let Ok(n) = s.parse::<usize>() {
                out.fetch_concurrency = n;
            }
        }

        if let Ok(s) = std::env::var("PIPELINE_ANALYZE_CONCURRENCY") {
            if let Ok(n) = s.parse::<usize>() {
                out.analyze_concurrency = n;
            }
        }

        if let Ok(s) = std::env::var("PIPELINE_ANALYZE_BATCH") {
            if let Ok(n) = s.parse::<i64>() {
                out.analyze_batch = n;
            }
        }

        if let Ok(s) = std::env::var("PIPELINE_SINCE_DAYS") {
            if let Ok(n) = s.parse::<u32>() {
                out.since_days = n;
            }
        }

        if let Ok(s) = std::env::var("PIPELINE_MAX_ARTICLES") {
            if let Ok(n) = s.parse::<usize>() {
                out.max_articles = n;
            }
        }

        out.normalized()
    }

    fn normalized(mut self) -> Self {
        self.fetch_concurrency = self.fetch_concurrency.max(1);
        self.analyze_concurrency = self.analyze_concurrency.max(1);
        self.analyze_batch = self.analyze_batch.max(1);
        self.since_days = self.since_days.max(1);
        self.max_articles = self.max_articles.max(1);
        self
    }
}

/// Final counts of one batch run. Produced even when individual items failed.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub target_date: Option<NaiveDate>,
    pub companies_registered: u64,
    pub fetched: usize,
    pub fetch_failures: usize,
    pub stored: u64,
    pub duplicates: u64,
    pub rejected: u64,
    pub analyzed: usize,
    pub analysis_failures: usize,
    pub scored: usize,
}

/// Five-phase batch: register, fetch, store, analyze, aggregate.
///
/// Phases run strictly one after another. Inside a phase work fans out over a bounded pool;
/// item failures are logged and skipped. Only storage failures outside a single item abort the
/// run.
pub struct Pipeline {
    store: Arc<dyn NewsStore>,
    source: Arc<dyn NewsSource>,
    analyzer: Arc<dyn SentimentAnalyzer>,
    companies: Vec<Company>,
    options: PipelineOptions,
}

impl Pipeline {
    pub fn new(
        store: Arc<dyn NewsStore>,
        source: Arc<dyn NewsSource>,
        analyzer: Arc<dyn SentimentAnalyzer>,
        companies: Vec<Company>,
        options: PipelineOptions,
    ) -> Self {
        Self {
            store,
            source,
            analyzer,
            companies,
            options: options.normalized(),
        }
    }

    pub async fn run(&self, target_date: NaiveDate, now: DateTime<Utc>) -> anyhow::Result<RunReport> {
        let run_id = Uuid::new_v4();
        let span = tracing::info_span!("pipeline", %run_id, %target_date);
        self.run_phases(run_id, target_date, now).instrument(span).await
    }

    async fn run_phases(
        &self,
        run_id: Uuid,
        target_date: NaiveDate,
        now: DateTime<Utc>,
    ) -> anyhow::Result<RunReport> {
        let mut report = RunReport {
            run_id,
            target_date: Some(target_date),
            ..Default::default()
        };

        report.companies_registered = self.register().await?;
        tracing::info!(companies = report.companies_registered, "companies registered");

        let batches = self.fetch(&mut report).await;
        tracing::info!(
            fetched = report.fetched,
            failures = report.fetch_failures,
            "fetch phase done"
        );

        self.store_articles(batches, &mut report).await;
        tracing::info!(
            stored = report.stored,
            duplicates = report.duplicates,
            rejected = report.rejected,
            "store phase done"
        );

        self.analyze(&mut report).await?;
        tracing::info!(
            analyzed = report.analyzed,
            failures = report.analysis_failures,
            "analyze phase done"
        );

        let aggregation = Aggregator::new(self.store.clone())
            .run(target_date, now)
            .await
            .context("aggregation failed")?;
        report.scored = aggregation.companies_scored;
        tracing::info!(scored = report.scored, "aggregate phase done");

        Ok(report)
    }

    /// Clears stored sentiment so the next run's analyze phase scores those articles again.
    pub async fn reset_sentiment(&self, ticker: Option<&str>) -> anyhow::Result<u64> {
        let n = self
            .store
            .reset_sentiment(ticker)
            .await
            .context("failed to reset sentiment")?;
        tracing::info!(ticker = ticker.unwrap_or("*"), articles = n, "sentiment reset");
        Ok(n)
    }

    async fn register(&self) -> anyhow::Result<u64> {
        let companies = &self.companies;
        let store = &self.store;
        with_retry(&self.options.retry, "upsert_companies", || {
            store.upsert_companies(companies)
        })
        .await
        .context("failed to register companies")
    }

    async fn fetch(&self, report: &mut RunReport) -> Vec<Vec<RawArticle>> {
        let permits = Arc::new(Semaphore::new(self.options.fetch_concurrency));
        let mut tasks = JoinSet::new();

        for company in self.companies.iter().cloned() {
            let permits = permits.clone();
            let source = self.source.clone();
            let since_days = self.options.since_days;
            let max_count = self.options.max_articles;
            tasks.spawn(async move {
                let _permit = permits.acquire_owned().await;
                let res = source.fetch_articles(&company, since_days, max_count).await;
                (company.ticker, res)
            });
        }

        let mut out = Vec::with_capacity(self.companies.len());
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((ticker, Ok(articles))) => {
                    tracing::debug!(%ticker, count = articles.len(), "fetched");
                    report.fetched += articles.len();
                    out.push(articles);
                }
                Ok((ticker, Err(err))) => {
                    report.fetch_failures += 1;
                    tracing::warn!(%ticker, error = %format!("{err:#}"), "fetch failed; skipping company");
                }
                Err(err) => {
                    report.fetch_failures += 1;
                    tracing::warn!(error = %err, "fetch task aborted");
                }
            }
        }
        out
    }

    async fn store_articles(&self, batches: Vec<Vec<RawArticle>>, report: &mut RunReport) {
        let articles = Arc::new(ArticleStore::new(self.store.clone(), self.options.retry));
        let permits = Arc::new(Semaphore::new(self.options.fetch_concurrency));
        let mut tasks = JoinSet::new();

        for batch in batches {
            let permits = permits.clone();
            let articles = articles.clone();
            tasks.spawn(async move {
                let _permit = permits.acquire_owned().await;
                for raw in &batch {
                    articles.add_article(raw).await;
                }
            });
        }

        while let Some(joined) = tasks.join_next().await {
            if let Err(err) = joined {
                tracing::warn!(error = %err, "store task aborted");
            }
        }

        let stats = articles.stats();
        report.stored = stats.inserted;
        report.duplicates = stats.duplicates;
        report.rejected = stats.rejected;
    }

    async fn analyze(&self, report: &mut RunReport) -> anyhow::Result<()> {
        let pending = self
            .store
            .unscored_articles(self.options.analyze_batch)
            .await
            .context("failed to select unscored articles")?;
        if pending.is_empty() {
            tracing::info!("no unscored articles");
            return Ok(());
        }

        let permits = Arc::new(Semaphore::new(self.options.analyze_concurrency));
        let mut tasks = JoinSet::new();

        // One task per article id; no two tasks ever touch the same row.
        for article in pending {
            let permits = permits.clone();
            let analyzer = self.analyzer.clone();
            let store = self.store.clone();
            let retry = self.options.retry;
            tasks.spawn(async move {
                let _permit = permits.acquire_owned().await;
                analyze_one(analyzer.as_ref(), store.as_ref(), &retry, &article).await
            });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(Ok(true)) => report.analyzed += 1,
                Ok(Ok(false)) => {}
                Ok(Err(err)) => {
                    report.analysis_failures += 1;
                    match llm_failure_detail(&err) {
                        Some((stage, raw_output)) => tracing::warn!(
                            error = %format!("{err:#}"),
                            stage,
                            raw_output = raw_output.as_deref().unwrap_or(""),
                            "analysis failed; skipping article"
                        ),
                        None => {
                            tracing::warn!(error = %format!("{err:#}"), "analysis failed; skipping article")
                        }
                    }
                }
                Err(err) => {
                    report.analysis_failures += 1;
                    tracing::warn!(error = %err, "analyze task aborted");
                }
            }
        }
        Ok(())
    }
}

const RAW_OUTPUT_LOG_CHARS: usize = 2000;

/// Stage and raw model output when the failure came from an LLM classifier.
fn llm_failure_detail(err: &anyhow::Error) -> Option<(&'static str, Option<String>)> {
    let diag = err.downcast_ref::<LlmDiagnosticsError>()?;
    Some((diag.stage, diag.raw_excerpt(RAW_OUTPUT_LOG_CHARS)))
}

async fn analyze_one(
    analyzer: &dyn SentimentAnalyzer,
    store: &dyn NewsStore,
    retry: &RetryPolicy,
    article: &UnscoredArticle,
) -> anyhow::Result<bool> {
    let text = analysis_text(&article.title, &article.content);
    let sentiment = analyzer
        .analyze(&text)
        .await
        .with_context(|| format!("analyzer {} failed on article {}", analyzer.name(), article.id))?;

    let written = with_retry(retry, "record_sentiment", || {
        store.record_sentiment(article.id, sentiment)
    })
    .await
    .with_context(|| format!("failed to record sentiment for article {}", article.id))?;

    if !written {
        tracing::debug!(article_id = article.id, "sentiment already recorded");
    }
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn options_are_clamped_to_at_least_one() {
        let opts = PipelineOptions {
            fetch_concurrency: 0,
            analyze_concurrency: 0,
            analyze_batch: -3,
            since_days: 0,
            max_articles: 0,
            retry: RetryPolicy::default(),
        }
        .normalized();

        assert_eq!(opts.fetch_concurrency, 1);
        assert_eq!(opts.analyze_concurrency, 1);
        assert_eq!(opts.analyze_batch, 1);
        assert_eq!(opts.since_days, 1);
        assert_eq!(opts.max_articles, 1);
    }

    #[test]
    fn defaults_match_rate_limit_friendly_pools() {
        let opts = PipelineOptions::default();
        assert_eq!(opts.fetch_concurrency, 3);
        assert_eq!(opts.analyze_concurrency, 5);
        assert_eq!(opts.analyze_batch, 1000);
    }

    struct GarbledClassifier;

    #[async_trait::async_trait]
    impl SentimentAnalyzer for GarbledClassifier {
        fn name(&self) -> &'static str {
            "garbled"
        }

        async fn analyze(&self, _text: &str) -> anyhow::Result<crate::sentiment::Sentiment> {
            Err(LlmDiagnosticsError {
                provider: crate::llm::Provider::Anthropic,
                stage: "parse_after_repair",
                detail: "final_error=expected value".to_string(),
                raw_output: Some("Sure! The label is positive.".to_string()),
                raw_response_json: None,
            }
            .into())
        }
    }

    #[tokio::test]
    async fn analysis_failure_keeps_raw_model_output_for_logging() {
        let store = crate::storage::memory::MemoryStore::new();
        let article = UnscoredArticle {
            id: 7,
            dedup_key: "k".to_string(),
            title: "Apple beats".to_string(),
            content: "Strong quarter".to_string(),
        };

        let err = analyze_one(&GarbledClassifier, &store, &RetryPolicy::default(), &article)
            .await
            .unwrap_err();

        let (stage, raw) = llm_failure_detail(&err).expect("diagnostics survive added context");
        assert_eq!(stage, "parse_after_repair");
        assert_eq!(raw.as_deref(), Some("Sure! The label is positive."));
        assert!(format!("{err:#}").contains("analyzer garbled failed on article 7"));
    }

    #[test]
    fn non_llm_failures_carry_no_detail() {
        assert!(llm_failure_detail(&anyhow::anyhow!("store unreachable")).is_none());
    }
}
