use crate::config::Settings;
use crate::domain::company::Company;
use crate::ingest::types::{parse_published_at, RawArticle};
use anyhow::{Context, Result};
use chrono::{Duration as ChronoDuration, Utc};
use reqwest::StatusCode;
use serde::Deserialize;
use std::time::Duration;

const DEFAULT_BASE_URL: &str = "https://newsapi.org/v2";
const DEFAULT_TIMEOUT_SECS: u64 = 15;
const DEFAULT_RETRIES: u32 = 3;
const MAX_PAGE_SIZE: usize = 100;

/// Produces raw article records for one company.
#[async_trait::async_trait]
pub trait NewsSource: Send + Sync {
    fn source_name(&self) -> &'static str;

    async fn fetch_articles(
        &self,
        company: &Company,
        since_days: u32,
        max_count: usize,
    ) -> Result<Vec<RawArticle>>;
}

/// NewsAPI `/everything` adapter.
#[derive(Debug, Clone)]
pub struct NewsApiSource {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    retries: u32,
}

impl NewsApiSource {
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let api_key = settings
            .newsapi_key
            .clone()
            .context("NEWSAPI_KEY is required")?;
        let base_url = settings
            .newsapi_base_url
            .clone()
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());

        let timeout_secs = std::env::var("NEWSAPI_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(DEFAULT_TIMEOUT_SECS);

        let retries = std::env::var("NEWSAPI_RETRIES")
            .ok()
            .and_then(|s| s.parse::<u32>().ok())
            .unwrap_or(DEFAULT_RETRIES)
            .max(1);

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .context("failed to build NewsAPI http client")?;

        Ok(Self {
            http,
            base_url,
            api_key,
            retries,
        })
    }

    fn url(&self) -> String {
        format!("{}/everything", self.base_url.trim_end_matches('/'))
    }

    async fn fetch_once(
        &self,
        company: &Company,
        since_days: u32,
        page_size: usize,
    ) -> Result<NewsApiResponse, FetchError> {
        let now = Utc::now();
        let from = (now - ChronoDuration::days(i64::from(since_days))).date_naive();

        let res = self
            .http
            .get(self.url())
            .header("X-Api-Key", &self.api_key)
            .query(&[
                ("q", search_query(company)),
                ("from", from.to_string()),
                ("to", now.date_naive().to_string()),
                ("sortBy", "publishedAt".to_string()),
                ("pageSize", page_size.to_string()),
                ("language", "en".to_string()),
            ])
            .send()
            .await
            .map_err(|e| FetchError::retryable(anyhow::Error::new(e).context("NewsAPI request failed")))?;

        let status = res.status();
        let text = res
            .text()
            .await
            .map_err(|e| FetchError::retryable(anyhow::Error::new(e).context("failed to read NewsAPI response")))?;

        if !status.is_success() {
            let err = anyhow::anyhow!("NewsAPI HTTP {status}: {text}");
            return Err(if is_retryable_status(status) {
                FetchError::retryable(err)
            } else {
                FetchError::fatal(err)
            });
        }

        let parsed = serde_json::from_str::<NewsApiResponse>(&text)
            .with_context(|| format!("NewsAPI response is not valid JSON: {text}"))
            .map_err(FetchError::fatal)?;

        if parsed.status == "error" {
            return Err(FetchError::fatal(anyhow::anyhow!(
                "NewsAPI error: {}",
                parsed.message.as_deref().unwrap_or("unknown error")
            )));
        }

        Ok(parsed)
    }
}

#[async_trait::async_trait]
impl NewsSource for NewsApiSource {
    fn source_name(&self) -> &'static str {
        "newsapi"
    }

    async fn fetch_articles(
        &self,
        company: &Company,
        since_days: u32,
        max_count: usize,
    ) -> Result<Vec<RawArticle>> {
        let page_size = max_count.clamp(1, MAX_PAGE_SIZE);
        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            match self.fetch_once(company, since_days, page_size).await {
                Ok(resp) => return Ok(to_raw_articles(company, resp)),
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
                        "NewsAPI fetch failed; retrying"
                    );
                    tokio::time::sleep(backoff).await;
                }
            }
        }
    }
}

pub(crate) struct FetchError {
    pub(crate) inner: anyhow::Error,
    pub(crate) retryable: bool,
}

impl FetchError {
    pub(crate) fn retryable(inner: anyhow::Error) -> Self {
        Self {
            inner,
            retryable: true,
        }
    }

    pub(crate) fn fatal(inner: anyhow::Error) -> Self {
        Self {
            inner,
            retryable: false,
        }
    }
}

pub(crate) fn is_retryable_status(status: StatusCode) -> bool {
    status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS
}

const MAX_BACKOFF_SECS: u64 = 60;

/// 1s, 2s, 4s, ... capped at one minute. `attempt` is 1-based.
pub(crate) fn backoff_for_attempt(attempt: u32) -> Duration {
    let secs = 1u64
        .checked_shl(attempt.saturating_sub(1))
        .unwrap_or(u64::MAX)
        .min(MAX_BACKOFF_SECS);
    Duration::from_secs(secs)
}

/// `"TICKER" OR "kw1" OR "kw2"`.
fn search_query(company: &Company) -> String {
    let mut terms = vec![format!("\"{}\"", company.ticker)];
    terms.extend(
        company
            .search_keywords()
            .iter()
            .map(|kw| format!("\"{}\"", kw.replace('"', ""))),
    );
    terms.join(" OR ")
}

fn to_raw_articles(company: &Company, resp: NewsApiResponse) -> Vec<RawArticle> {
    let keywords: Vec<String> = company
        .search_keywords()
        .iter()
        .map(|k| k.to_lowercase())
        .collect();

    resp.articles
        .into_iter()
        .filter_map(|item| {
            let title = item.title.unwrap_or_default().trim().to_string();
            if title.is_empty() || title == "[Removed]" {
                return None;
            }

            let description = item.description.unwrap_or_default().trim().to_string();
            let haystack = format!("{title} {description}").to_lowercase();
            if !keywords.iter().any(|kw| haystack.contains(kw.as_str())) {
                return None;
            }

            let published_at = item
                .published_at
                .as_deref()
                .and_then(parse_published_at)?;

            let content = if description.is_empty() {
                title.clone()
            } else {
                description
            };

            Some(RawArticle {
                ticker: company.ticker.clone(),
                title,
                content,
                source: item
                    .source
                    .and_then(|s| s.name)
                    .filter(|s| !s.trim().is_empty())
                    .unwrap_or_else(|| "Unknown".to_string()),
                source_url: item.url.filter(|u| !u.trim().is_empty()),
                published_at,
            })
        })
        .collect()
}

#[derive(Debug, Clone, Deserialize)]
struct NewsApiResponse {
    status: String,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    articles: Vec<NewsApiArticle>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NewsApiArticle {
    #[serde(default)]
    source: Option<NewsApiSourceRef>,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    published_at: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct NewsApiSourceRef {
    #[serde(default)]
    name: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn apple() -> Company {
        Company {
            ticker: "AAPL".to_string(),
            name: "Apple Inc.".to_string(),
            keywords: vec!["Apple".to_string(), "iPhone".to_string()],
        }
    }

    #[test]
    fn builds_or_query_from_ticker_and_keywords() {
        assert_eq!(search_query(&apple()), "\"AAPL\" OR \"Apple\" OR \"iPhone\"");
    }

    #[test]
    fn keeps_only_keyword_matches_with_usable_titles() {
        let resp: NewsApiResponse = serde_json::from_value(json!({
            "status": "ok",
            "totalResults": 4,
            "articles": [
                {
                    "source": {"id": null, "name": "Reuters"},
                    "title": "Apple unveils new iPhone",
                    "description": "Strong demand expected",
                    "url": "https://example.com/1",
                    "publishedAt": "2026-02-16T10:00:00Z"
                },
                {
                    "source": {"name": "Blog"},
                    "title": "[Removed]",
                    "description": "Apple",
                    "url": "https://example.com/2",
                    "publishedAt": "2026-02-16T10:00:00Z"
                },
                {
                    "source": {"name": "Wire"},
                    "title": "Oil prices slide",
                    "description": null,
                    "url": "https://example.com/3",
                    "publishedAt": "2026-02-16T10:00:00Z"
                },
                {
                    "source": null,
                    "title": "iPhone sales record",
                    "description": null,
                    "url": "",
                    "publishedAt": "2026-02-16T11:00:00Z"
                }
            ]
        }))
        .unwrap();

        let out = to_raw_articles(&apple(), resp);
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].source, "Reuters");
        assert_eq!(out[0].content, "Strong demand expected");
        assert_eq!(out[1].content, "iPhone sales record");
        assert_eq!(out[1].source, "Unknown");
        assert!(out[1].source_url.is_none());
    }

    #[test]
    fn backoff_doubles_then_caps_without_overflow() {
        assert_eq!(backoff_for_attempt(1), Duration::from_secs(1));
        assert_eq!(backoff_for_attempt(2), Duration::from_secs(2));
        assert_eq!(backoff_for_attempt(6), Duration::from_secs(32));
        assert_eq!(backoff_for_attempt(7), Duration::from_secs(60));
        assert_eq!(backoff_for_attempt(64), Duration::from_secs(60));
        assert_eq!(backoff_for_attempt(65), Duration::from_secs(60));
        assert_eq!(backoff_for_attempt(u32::MAX), Duration::from_secs(60));
    }

    #[test]
    fn rate_limit_and_server_errors_are_retryable() {
        assert!(is_retryable_status(StatusCode::TOO_MANY_REQUESTS));
        assert!(is_retryable_status(StatusCode::BAD_GATEWAY));
        assert!(!is_retryable_status(StatusCode::UNAUTHORIZED));
    }
}
