use crate::sentiment::classifier::{Classification, SentimentLabel};
use anyhow::Context;
use serde::Deserialize;

/// Loose shape the model is asked to emit: `{"label": "...", "confidence": 0.0}`.
#[derive(Debug, Clone, Deserialize)]
pub struct LlmClassification {
    pub label: String,
    pub confidence: f64,
}

impl LlmClassification {
    pub fn validate(self) -> anyhow::Result<Classification> {
        let label = self.label.parse::<SentimentLabel>()?;
        anyhow::ensure!(
            (0.0..=1.0).contains(&self.confidence),
            "confidence must be between 0 and 1 (got {})",
            self.confidence
        );
        Ok(Classification {
            label,
            confidence: self.confidence,
        })
    }
}

pub fn extract_json(text: &str) -> Option<String> {
    let trimmed = text.trim();
    if trimmed.starts_with("```") {
        // Strip Markdown fences (```json ... ``` or ``` ... ```).
        let mut inner = trimmed;
        if let Some(after_first) = inner.splitn(2, '\n').nth(1) {
            inner = after_first;
        }
        if let Some(end) = inner.rfind("```") {
            inner = &inner[..end];
        }
        return Some(inner.trim().to_string());
    }

    let start = trimmed.find('{')?;
    let end = trimmed.rfind('}')?;
    if end <= start {
        return None;
    }
    Some(trimmed[start..=end].trim().to_string())
}

pub fn parse_classification(text: &str) -> anyhow::Result<Classification> {
    let json_str = extract_json(text).unwrap_or_else(|| text.trim().to_string());
    let parsed = serde_json::from_str::<LlmClassification>(&json_str)
        .with_context(|| format!("LLM output is not a valid classification: {json_str}"))?;
    parsed.validate()
}
