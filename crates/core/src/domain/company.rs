use anyhow::ensure;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Company {
    pub ticker: String,
    pub name: String,
    #[serde(default)]
    pub keywords: Vec<String>,
}

impl Company {
    pub fn new(ticker: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            ticker: ticker.into(),
            name: name.into(),
            keywords: Vec::new(),
        }
    }

    /// Terms used to match articles to this company. Falls back to the display name.
    pub fn search_keywords(&self) -> Vec<String> {
        if self.keywords.is_empty() {
            vec![self.name.clone()]
        } else {
            self.keywords.clone()
        }
    }
}

/// Trims and upper-cases tickers, drops blank keywords, and rejects empty or duplicate tickers.
pub fn normalize_registry(companies: Vec<Company>) -> anyhow::Result<Vec<Company>> {
    let mut seen = BTreeSet::new();
    let mut out = Vec::with_capacity(companies.len());

    for company in companies {
        let ticker = company.ticker.trim().to_ascii_uppercase();
        ensure!(!ticker.is_empty(), "company ticker must be non-empty");

        let name = company.name.trim().to_string();
        ensure!(!name.is_empty(), "company name must be non-empty (ticker={ticker})");

        ensure!(
            seen.insert(ticker.clone()),
            "duplicate ticker in company registry: {ticker}"
        );

        let keywords = company
            .keywords
            .into_iter()
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty())
            .collect();

        out.push(Company {
            ticker,
            name,
            keywords,
        });
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_tickers_and_keywords() {
        let out = normalize_registry(vec![Company {
            ticker: " msft ".to_string(),
            name: " Microsoft ".to_string(),
            keywords: vec!["Azure".to_string(), "  ".to_string()],
        }])
        .unwrap();

        assert_eq!(out[0].ticker, "MSFT");
        assert_eq!(out[0].name, "Microsoft");
        assert_eq!(out[0].keywords, vec!["Azure".to_string()]);
    }

    #[test]
    fn search_keywords_fall_back_to_name() {
        let c = Company::new("KO", "The Coca-Cola Company");
        assert_eq!(c.search_keywords(), vec!["The Coca-Cola Company".to_string()]);
    }

    #[test]
    fn rejects_blank_ticker() {
        assert!(normalize_registry(vec![Company::new("  ", "Nameless")]).is_err());
    }
}
