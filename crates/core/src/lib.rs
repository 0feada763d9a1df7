pub mod aggregate;
pub mod domain;
pub mod error;
pub mod ingest;
pub mod llm;
pub mod pipeline;
pub mod query;
pub mod sentiment;
pub mod storage;
pub mod time;

pub mod config {
    use crate::domain::company::{normalize_registry, Company};
    use anyhow::Context;

    const BUILTIN_COMPANIES: &str = include_str!("../companies.json");

    #[derive(Debug, Clone)]
    pub struct Settings {
        pub database_url: Option<String>,
        pub sentry_dsn: Option<String>,
        pub anthropic_api_key: Option<String>,
        pub newsapi_key: Option<String>,
        pub newsapi_base_url: Option<String>,
        pub yahoo_news_enabled: bool,
        pub yahoo_base_url: Option<String>,
        pub companies_file: Option<String>,
        pub sentiment_analyzer: String,
    }

    impl Settings {
        pub fn from_env() -> anyhow::Result<Self> {
            Ok(Self {
                database_url: std::env::var("DATABASE_URL").ok(),
                sentry_dsn: std::env::var("SENTRY_DSN").ok(),
                anthropic_api_key: std::env::var("ANTHROPIC_API_KEY").ok(),
                newsapi_key: std::env::var("NEWSAPI_KEY")
                    .ok()
                    .filter(|s| !s.trim().is_empty() && s != "demo"),
                newsapi_base_url: std::env::var("NEWSAPI_BASE_URL").ok(),
                yahoo_news_enabled: std::env::var("YAHOO_NEWS_ENABLED")
                    .map(|s| parse_flag(&s))
                    .unwrap_or(true),
                yahoo_base_url: std::env::var("YAHOO_FINANCE_BASE_URL").ok(),
                companies_file: std::env::var("COMPANIES_FILE")
                    .ok()
                    .filter(|s| !s.trim().is_empty()),
                sentiment_analyzer: std::env::var("SENTIMENT_ANALYZER")
                    .ok()
                    .map(|s| s.trim().to_ascii_lowercase())
                    .filter(|s| !s.is_empty())
                    .unwrap_or_else(|| "lexical".to_string()),
            })
        }

        pub fn require_database_url(&self) -> anyhow::Result<&str> {
            self.database_url
                .as_deref()
                .context("DATABASE_URL is required")
        }

        pub fn require_anthropic_api_key(&self) -> anyhow::Result<&str> {
            self.anthropic_api_key
                .as_deref()
                .context("ANTHROPIC_API_KEY is required")
        }

        /// Tracked company registry: `COMPANIES_FILE` when set, the built-in list otherwise.
        pub fn companies(&self) -> anyhow::Result<Vec<Company>> {
            let raw = match self.companies_file.as_deref() {
                Some(path) => std::fs::read_to_string(path)
                    .with_context(|| format!("failed to read COMPANIES_FILE={path}"))?,
                None => BUILTIN_COMPANIES.to_string(),
            };
            parse_companies(&raw)
        }
    }

    /// Anything but an explicit off value (`0`, `false`, `no`, `off`) counts as on.
    fn parse_flag(raw: &str) -> bool {
        !matches!(
            raw.trim().to_ascii_lowercase().as_str(),
            "0" | "false" | "no" | "off"
        )
    }

    pub fn parse_companies(raw: &str) -> anyhow::Result<Vec<Company>> {
        let companies = serde_json::from_str::<Vec<Company>>(raw)
            .context("company registry is not a JSON list of {ticker, name, keywords?}")?;
        normalize_registry(companies)
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn builtin_registry_is_valid() {
            let companies = parse_companies(BUILTIN_COMPANIES).unwrap();
            assert!(companies.len() >= 40);
            assert!(companies.iter().any(|c| c.ticker == "AAPL"));
        }

        #[test]
        fn flags_default_on_unless_explicitly_off() {
            assert!(parse_flag("1"));
            assert!(parse_flag(""));
            assert!(!parse_flag(" FALSE "));
            assert!(!parse_flag("off"));
        }

        #[test]
        fn rejects_duplicate_tickers_after_normalization() {
            let raw = r#"[{"ticker":"aapl","name":"Apple"},{"ticker":" AAPL ","name":"Apple again"}]"#;
            assert!(parse_companies(raw).is_err());
        }
    }
}
