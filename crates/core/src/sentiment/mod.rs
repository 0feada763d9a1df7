pub mod classifier;
pub mod lexical;

use crate::config::Settings;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Analyzer output: `score` in [-1, 1], `confidence` in [0, 1].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sentiment {
    pub score: f64,
    pub confidence: f64,
}

impl Sentiment {
    /// Zero signal. Returned for empty text.
    pub const NEUTRAL: Sentiment = Sentiment {
        score: 0.0,
        confidence: 0.0,
    };

    /// Clamps both components into range. NaN collapses to zero.
    pub fn new(score: f64, confidence: f64) -> Self {
        let clamp = |v: f64, lo: f64, hi: f64| if v.is_nan() { 0.0 } else { v.clamp(lo, hi) };
        Self {
            score: clamp(score, -1.0, 1.0),
            confidence: clamp(confidence, 0.0, 1.0),
        }
    }

    pub fn is_within_bounds(&self) -> bool {
        (-1.0..=1.0).contains(&self.score) && (0.0..=1.0).contains(&self.confidence)
    }
}

/// Text -> (score, confidence).
///
/// Implementations must not carry state between calls beyond one-time setup, and
/// `analyze_batch` must stay equivalent to mapping `analyze` over the input in order.
#[async_trait::async_trait]
pub trait SentimentAnalyzer: Send + Sync {
    fn name(&self) -> &'static str;

    async fn analyze(&self, text: &str) -> anyhow::Result<Sentiment>;

    async fn analyze_batch(&self, texts: &[String]) -> Vec<anyhow::Result<Sentiment>> {
        let mut out = Vec::with_capacity(texts.len());
        for text in texts {
            out.push(self.analyze(text).await);
        }
        out
    }
}

/// What the analyzer sees for an article.
pub fn analysis_text(title: &str, content: &str) -> String {
    format!("{} {}", title.trim(), content.trim()).trim().to_string()
}

/// Builds the analyzer named by `SENTIMENT_ANALYZER` (`lexical` or `anthropic`).
pub fn from_settings(settings: &Settings) -> anyhow::Result<Arc<dyn SentimentAnalyzer>> {
    match settings.sentiment_analyzer.as_str() {
        "lexical" => Ok(Arc::new(lexical::LexicalAnalyzer::new())),
        "anthropic" => {
            let client = crate::llm::anthropic::AnthropicClassifier::from_settings(settings)?;
            Ok(Arc::new(classifier::ClassifierAnalyzer::new(client)))
        }
        other => anyhow::bail!("unknown SENTIMENT_ANALYZER={other} (expected lexical|anthropic)"),
    }
}
