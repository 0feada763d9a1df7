use super::{Sentiment, SentimentAnalyzer};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SentimentLabel {
    Positive,
    Negative,
    Neutral,
}

impl FromStr for SentimentLabel {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "positive" => Ok(SentimentLabel::Positive),
            "negative" => Ok(SentimentLabel::Negative),
            "neutral" => Ok(SentimentLabel::Neutral),
            other => anyhow::bail!("unknown sentiment label: {other:?}"),
        }
    }
}

/// Three-way label with the classifier's confidence in it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    pub label: SentimentLabel,
    pub confidence: f64,
}

impl Classification {
    /// positive -> +confidence, negative -> -confidence, neutral -> 0.
    pub fn into_sentiment(self) -> Sentiment {
        let confidence = Sentiment::new(0.0, self.confidence).confidence;
        let score = match self.label {
            SentimentLabel::Positive => confidence,
            SentimentLabel::Negative => -confidence,
            SentimentLabel::Neutral => 0.0,
        };
        Sentiment::new(score, confidence)
    }
}

#[async_trait::async_trait]
pub trait LabelClassifier: Send + Sync {
    fn name(&self) -> &'static str;

    async fn classify(&self, text: &str) -> anyhow::Result<Classification>;
}

/// Plugs a label classifier into the two-float analyzer contract.
#[derive(Debug, Clone)]
pub struct ClassifierAnalyzer<C> {
    classifier: C,
}

impl<C: LabelClassifier> ClassifierAnalyzer<C> {
    pub fn new(classifier: C) -> Self {
        Self { classifier }
    }
}

#[async_trait::async_trait]
impl<C: LabelClassifier> SentimentAnalyzer for ClassifierAnalyzer<C> {
    fn name(&self) -> &'static str {
        self.classifier.name()
    }

    async fn analyze(&self, text: &str) -> anyhow::Result<Sentiment> {
        if text.trim().is_empty() {
            return Ok(Sentiment::NEUTRAL);
        }
        let classification = self.classifier.classify(text).await?;
        Ok(classification.into_sentiment())
    }
}
