pub mod composite;
pub mod fixtures;
pub mod provider;
pub mod types;
pub mod yahoo;

use crate::config::Settings;
use std::sync::Arc;

/// Source stack used by the batch: live providers (when configured) merged in priority order,
/// Yahoo Finance ticker news first, then NewsAPI, with the demo fixture fallback.
pub fn from_settings(settings: &Settings) -> anyhow::Result<Arc<dyn provider::NewsSource>> {
    Ok(Arc::new(composite::CompositeSource::new(live_providers(settings)?)))
}

fn live_providers(settings: &Settings) -> anyhow::Result<Vec<Arc<dyn provider::NewsSource>>> {
    let mut providers: Vec<Arc<dyn provider::NewsSource>> = Vec::new();

    if settings.yahoo_news_enabled {
        providers.push(Arc::new(yahoo::YahooFinanceSource::from_settings(settings)?));
    } else {
        tracing::info!("YAHOO_NEWS_ENABLED is off; skipping Yahoo Finance news");
    }

    if settings.newsapi_key.is_some() {
        providers.push(Arc::new(provider::NewsApiSource::from_settings(settings)?));
    } else {
        tracing::info!("NEWSAPI_KEY not set; skipping NewsAPI");
    }

    if providers.is_empty() {
        tracing::info!("no live news providers configured; relying on demo fixtures");
    }
    Ok(providers)
}
