use super::retry::{with_retry, RetryPolicy};
use super::{InsertOutcome, NewsStore};
use crate::domain::article::{dedup_key, NewArticle};
use crate::ingest::types::RawArticle;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct IngestStats {
    pub inserted: u64,
    pub duplicates: u64,
    pub rejected: u64,
}

/// Deduplicating ingestion front for a `NewsStore`.
///
/// `add_article` is a boolean no-op on duplicates and on rejection; the two are told apart only
/// through `stats()` and the logs.
pub struct ArticleStore {
    store: Arc<dyn NewsStore>,
    retry: RetryPolicy,
    inserted: AtomicU64,
    duplicates: AtomicU64,
    rejected: AtomicU64,
}

impl ArticleStore {
    pub fn new(store: Arc<dyn NewsStore>, retry: RetryPolicy) -> Self {
        Self {
            store,
            retry,
            inserted: AtomicU64::new(0),
            duplicates: AtomicU64::new(0),
            rejected: AtomicU64::new(0),
        }
    }

    pub async fn add_article(&self, raw: &RawArticle) -> bool {
        let article = match prepare(raw) {
            Ok(a) => a,
            Err(reason) => {
                self.rejected.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(ticker = %raw.ticker, %reason, "article rejected");
                return false;
            }
        };

        let res = with_retry(&self.retry, "insert_article", || {
            self.store.insert_article(&article)
        })
        .await;

        match res {
            Ok(InsertOutcome::Inserted) => {
                self.inserted.fetch_add(1, Ordering::Relaxed);
                true
            }
            Ok(InsertOutcome::Duplicate) => {
                self.duplicates.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(key = %article.dedup_key, "duplicate article");
                false
            }
            Err(err) => {
                self.rejected.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(
                    ticker = %article.ticker,
                    key = %article.dedup_key,
                    error = %err,
                    "article insert failed"
                );
                false
            }
        }
    }

    pub fn stats(&self) -> IngestStats {
        IngestStats {
            inserted: self.inserted.load(Ordering::Relaxed),
            duplicates: self.duplicates.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
        }
    }
}

fn prepare(raw: &RawArticle) -> Result<NewArticle, &'static str> {
    let ticker = raw.ticker.trim().to_ascii_uppercase();
    let title = raw.title.trim();
    if ticker.is_empty() {
        return Err("empty ticker");
    }
    if title.is_empty() {
        return Err("empty title");
    }

    let source_url = raw
        .source_url
        .as_deref()
        .map(str::trim)
        .filter(|u| !u.is_empty())
        .map(str::to_string);

    Ok(NewArticle {
        dedup_key: dedup_key(&ticker, title, source_url.as_deref()),
        ticker,
        title: title.to_string(),
        content: raw.content.trim().to_string(),
        source: raw.source.trim().to_string(),
        source_url,
        published_at: raw.published_at,
    })
}
