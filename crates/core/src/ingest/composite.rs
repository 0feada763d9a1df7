use crate::domain::company::Company;
use crate::ingest::fixtures;
use crate::ingest::provider::NewsSource;
use crate::ingest::types::RawArticle;
use anyhow::Result;
use chrono::Utc;
use std::collections::HashSet;
use std::sync::Arc;

/// Merges providers in order, drops case-insensitive duplicate titles, and falls back to the
/// demo fixture set when nothing usable came back.
pub struct CompositeSource {
    providers: Vec<Arc<dyn NewsSource>>,
}

impl CompositeSource {
    pub fn new(providers: Vec<Arc<dyn NewsSource>>) -> Self {
        Self { providers }
    }
}

#[async_trait::async_trait]
impl NewsSource for CompositeSource {
    fn source_name(&self) -> &'static str {
        "composite"
    }

    async fn fetch_articles(
        &self,
        company: &Company,
        since_days: u32,
        max_count: usize,
    ) -> Result<Vec<RawArticle>> {
        let mut merged = Vec::new();
        for provider in &self.providers {
            match provider.fetch_articles(company, since_days, max_count).await {
                Ok(mut articles) => merged.append(&mut articles),
                Err(err) => {
                    tracing::warn!(
                        ticker = %company.ticker,
                        provider = provider.source_name(),
                        error = %err,
                        "news provider unavailable; skipping"
                    );
                }
            }
        }

        let mut unique = dedupe_by_title(merged);
        if unique.is_empty() {
            tracing::warn!(ticker = %company.ticker, "no live articles found; using demo fixtures");
            unique = fixtures::demo_articles(company, Utc::now());
        }

        unique.truncate(max_count);
        Ok(unique)
    }
}

/// First occurrence wins. Blank titles are dropped.
pub fn dedupe_by_title(articles: Vec<RawArticle>) -> Vec<RawArticle> {
    let mut seen = HashSet::new();
    articles
        .into_iter()
        .filter(|a| {
            let key = a.title.trim().to_lowercase();
            !key.is_empty() && seen.insert(key)
        })
        .collect()
}
