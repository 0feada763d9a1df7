use crate::config::Settings;
use crate::domain::company::Company;
use crate::ingest::provider::{backoff_for_attempt, is_retryable_status, FetchError, NewsSource};
use crate::ingest::types::RawArticle;
use anyhow::{Context, Result};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::Deserialize;
use std::time::Duration;

const DEFAULT_BASE_URL: &str = "https://query1.finance.yahoo.com";
const DEFAULT_TIMEOUT_SECS: u64 = 10;
const DEFAULT_RETRIES: u32 = 3;
const MAX_NEWS_COUNT: usize = 50;
const DEFAULT_PUBLISHER: &str = "Financial News";
// The search endpoint rejects requests without a browser-like agent.
const USER_AGENT: &str = "Mozilla/5.0 (compatible; newsspy/0.1)";

/// Ticker news from the Yahoo Finance search endpoint. Needs no API key.
#[derive(Debug, Clone)]
pub struct YahooFinanceSource {
    http: reqwest::Client,
    base_url: String,
    retries: u32,
}

impl YahooFinanceSource {
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let base_url = settings
            .yahoo_base_url
            .clone()
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());

        let timeout_secs = std::env::var("YAHOO_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(DEFAULT_TIMEOUT_SECS);

        let retries = std::env::var("YAHOO_RETRIES")
            .ok()
            .and_then(|s| s.parse::<u32>().ok())
            .unwrap_or(DEFAULT_RETRIES)
            .max(1);

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .user_agent(USER_AGENT)
            .build()
            .context("failed to build Yahoo Finance http client")?;

        Ok(Self {
            http,
            base_url,
            retries,
        })
    }

    fn url(&self) -> String {
        format!("{}/v1/finance/search", self.base_url.trim_end_matches('/'))
    }

    async fn fetch_once(&self, company: &Company, news_count: usize) -> Result<YahooSearchResponse, FetchError> {
        let res = self
            .http
            .get(self.url())
            .query(&[
                ("q", company.ticker.clone()),
                ("quotesCount", "0".to_string()),
                ("newsCount", news_count.to_string()),
            ])
            .send()
            .await
            .map_err(|e| FetchError::retryable(anyhow::Error::new(e).context("Yahoo Finance request failed")))?;

        let status = res.status();
        let text = res
            .text()
            .await
            .map_err(|e| FetchError::retryable(anyhow::Error::new(e).context("failed to read Yahoo Finance response")))?;

        if !status.is_success() {
            let err = anyhow::anyhow!("Yahoo Finance HTTP {status}: {text}");
            return Err(if is_retryable_status(status) {
                FetchError::retryable(err)
            } else {
                FetchError::fatal(err)
            });
        }

        serde_json::from_str::<YahooSearchResponse>(&text)
            .with_context(|| format!("Yahoo Finance response is not valid JSON: {text}"))
            .map_err(FetchError::fatal)
    }
}

#[async_trait::async_trait]
impl NewsSource for YahooFinanceSource {
    fn source_name(&self) -> &'static str {
        "yahoo"
    }

    async fn fetch_articles(
        &self,
        company: &Company,
        since_days: u32,
        max_count: usize,
    ) -> Result<Vec<RawArticle>> {
        let news_count = max_count.clamp(1, MAX_NEWS_COUNT);
        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            match self.fetch_once(company, news_count).await {
                Ok(resp) => {
                    let now = Utc::now();
                    let cutoff = now - ChronoDuration::days(i64::from(since_days));
                    return Ok(to_raw_articles(company, resp, cutoff, now));
                }
                Err(err) => {
                    if !err.retryable || attempt >= self.retries {
                        return Err(err.inner);
                    }
                    let backoff = backoff_for_attempt(attempt);
                    tracing::warn!(
                        ticker = %company.ticker,
                        attempt,
                        ?backoff,
                        error = %err.inner,
                        "Yahoo Finance fetch failed; retrying"
                    );
                    tokio::time::sleep(backoff).await;
                }
            }
        }
    }
}

/// Items without a usable publish time are stamped `now`; items older than `cutoff` are dropped.
fn to_raw_articles(
    company: &Company,
    resp: YahooSearchResponse,
    cutoff: DateTime<Utc>,
    now: DateTime<Utc>,
) -> Vec<RawArticle> {
    resp.news
        .into_iter()
        .filter_map(|item| {
            let title = item.title.unwrap_or_default().trim().to_string();
            if title.is_empty() || title == "[Removed]" {
                return None;
            }

            let published_at = item
                .provider_publish_time
                .and_then(|secs| DateTime::from_timestamp(secs, 0))
                .unwrap_or(now);
            if published_at < cutoff {
                return None;
            }

            let content = item
                .summary
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| title.clone());

            Some(RawArticle {
                ticker: company.ticker.clone(),
                title,
                content,
                source: item
                    .publisher
                    .filter(|s| !s.trim().is_empty())
                    .unwrap_or_else(|| DEFAULT_PUBLISHER.to_string()),
                source_url: item.link.filter(|u| !u.trim().is_empty()),
                published_at,
            })
        })
        .collect()
}

#[derive(Debug, Clone, Deserialize)]
struct YahooSearchResponse {
    #[serde(default)]
    news: Vec<YahooNewsItem>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct YahooNewsItem {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    summary: Option<String>,
    #[serde(default)]
    publisher: Option<String>,
    #[serde(default)]
    link: Option<String>,
    #[serde(default)]
    provider_publish_time: Option<i64>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn apple() -> Company {
        Company::new("AAPL", "Apple Inc.")
    }

    #[test]
    fn maps_publisher_link_and_publish_time() {
        let resp: YahooSearchResponse = serde_json::from_value(json!({
            "explains": [],
            "count": 3,
            "quotes": [],
            "news": [
                {
                    "uuid": "a1",
                    "title": "Apple shares rise after record quarter",
                    "publisher": "Reuters",
                    "link": "https://finance.yahoo.com/news/a1",
                    "providerPublishTime": 1771236000,
                    "type": "STORY",
                    "relatedTickers": ["AAPL"]
                },
                {
                    "uuid": "a2",
                    "title": "[Removed]",
                    "publisher": "Blog",
                    "link": "https://finance.yahoo.com/news/a2",
                    "providerPublishTime": 1771236000
                },
                {
                    "uuid": "a3",
                    "title": "  ",
                    "publisher": "Blog",
                    "link": "https://finance.yahoo.com/news/a3",
                    "providerPublishTime": 1771236000
                }
            ]
        }))
        .unwrap();

        let now = Utc.with_ymd_and_hms(2026, 2, 17, 0, 0, 0).unwrap();
        let out = to_raw_articles(&apple(), resp, now - ChronoDuration::days(7), now);

        assert_eq!(out.len(), 1);
        let a = &out[0];
        assert_eq!(a.ticker, "AAPL");
        assert_eq!(a.source, "Reuters");
        assert_eq!(a.content, a.title);
        assert_eq!(a.source_url.as_deref(), Some("https://finance.yahoo.com/news/a1"));
        assert_eq!(a.published_at, Utc.with_ymd_and_hms(2026, 2, 16, 10, 0, 0).unwrap());
    }

    #[test]
    fn defaults_missing_fields_and_drops_stale_items() {
        let resp: YahooSearchResponse = serde_json::from_value(json!({
            "news": [
                {"title": "Apple supplier update", "link": ""},
                {"title": "Old Apple story", "publisher": "Wire", "providerPublishTime": 1577836800}
            ]
        }))
        .unwrap();

        let now = Utc.with_ymd_and_hms(2026, 2, 17, 0, 0, 0).unwrap();
        let out = to_raw_articles(&apple(), resp, now - ChronoDuration::days(7), now);

        assert_eq!(out.len(), 1);
        assert_eq!(out[0].source, "Financial News");
        assert!(out[0].source_url.is_none());
        assert_eq!(out[0].published_at, now);
    }

    #[test]
    fn response_without_news_is_empty() {
        let resp: YahooSearchResponse = serde_json::from_value(json!({"quotes": []})).unwrap();
        let now = Utc::now();
        assert!(to_raw_articles(&apple(), resp, now, now).is_empty());
    }
}
