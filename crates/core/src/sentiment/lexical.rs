use super::{Sentiment, SentimentAnalyzer};
use std::collections::HashSet;

const POSITIVE_WORDS: &[&str] = &[
    "excellent", "great", "good", "positive", "gain", "surge", "rocket", "breakthrough",
    "record", "beat", "outperform", "strong", "impressive", "bullish", "growth", "rise",
];

const NEGATIVE_WORDS: &[&str] = &[
    "poor", "bad", "negative", "loss", "decline", "crash", "drop", "fail", "miss",
    "underperform", "weak", "bearish", "down", "slump", "concern", "risk", "warning", "trouble",
];

/// Keyword-counting analyzer.
///
/// score = (pos - neg) / max(1, pos + neg), confidence = min(1, hits / words).
#[derive(Debug, Clone)]
pub struct LexicalAnalyzer {
    positive: HashSet<String>,
    negative: HashSet<String>,
}

impl Default for LexicalAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

impl LexicalAnalyzer {
    pub fn new() -> Self {
        Self::with_lexicon(POSITIVE_WORDS.iter().copied(), NEGATIVE_WORDS.iter().copied())
    }

    pub fn with_lexicon<'a>(
        positive: impl IntoIterator<Item = &'a str>,
        negative: impl IntoIterator<Item = &'a str>,
    ) -> Self {
        Self {
            positive: positive.into_iter().map(|w| w.to_lowercase()).collect(),
            negative: negative.into_iter().map(|w| w.to_lowercase()).collect(),
        }
    }

    pub fn score(&self, text: &str) -> Sentiment {
        let mut words: usize = 0;
        let mut pos: usize = 0;
        let mut neg: usize = 0;

        for raw in text.split_whitespace() {
            words += 1;
            let token = raw.to_lowercase();
            if self.positive.contains(&token) {
                pos += 1;
            } else if self.negative.contains(&token) {
                neg += 1;
            }
        }

        let hits = pos + neg;
        if words == 0 || hits == 0 {
            return Sentiment::NEUTRAL;
        }

        let score = (pos as f64 - neg as f64) / (hits.max(1) as f64);
        let confidence = (hits as f64 / words as f64).min(1.0);
        Sentiment::new(score, confidence)
    }
}

#[async_trait::async_trait]
impl SentimentAnalyzer for LexicalAnalyzer {
    fn name(&self) -> &'static str {
        "lexical"
    }

    async fn analyze(&self, text: &str) -> anyhow::Result<Sentiment> {
        Ok(self.score(text))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_text_is_zero_signal() {
        let a = LexicalAnalyzer::new();
        assert_eq!(a.score(""), Sentiment::NEUTRAL);
        assert_eq!(a.score("   \n\t"), Sentiment::NEUTRAL);
    }

    #[test]
    fn counts_hits_against_total_words() {
        let a = LexicalAnalyzer::new();
        // 2 positive, 1 negative, 6 words.
        let s = a.score("Strong growth despite supply chain concern");
        assert_eq!(s.score, (2.0 - 1.0) / 3.0);
        assert_eq!(s.confidence, 3.0 / 6.0);
    }

    #[test]
    fn case_folds_but_matches_whole_tokens_only() {
        let a = LexicalAnalyzer::new();
        assert_eq!(a.score("CRASH stocks DROP"), Sentiment::new(-1.0, 2.0 / 3.0));

        // "growth," and "strong." are not lexicon words.
        let s = a.score("Strong growth, strong.");
        assert_eq!(s.score, 1.0);
        assert_eq!(s.confidence, 1.0 / 3.0);
        assert_eq!(a.score("CRASH! Stocks DROP."), Sentiment::NEUTRAL);
    }

    #[test]
    fn text_without_lexicon_words_is_neutral() {
        let a = LexicalAnalyzer::new();
        assert_eq!(a.score("The company held its annual meeting"), Sentiment::NEUTRAL);
    }

    #[test]
    fn stays_in_bounds_for_saturated_text() {
        let a = LexicalAnalyzer::new();
        let s = a.score("record record record");
        assert_eq!(s, Sentiment::new(1.0, 1.0));
        assert!(s.is_within_bounds());
    }

    #[tokio::test]
    async fn batch_matches_single_calls_in_order() {
        let a = LexicalAnalyzer::new();
        let texts = vec![
            "strong beat".to_string(),
            String::new(),
            "weak outlook and loss".to_string(),
            "neutral filler words".to_string(),
        ];

        let batch = a.analyze_batch(&texts).await;
        assert_eq!(batch.len(), texts.len());
        for (text, got) in texts.iter().zip(batch) {
            assert_eq!(got.unwrap(), a.analyze(text).await.unwrap());
        }
    }
}
