use crate::llm::Provider;
use serde_json::Value;
use std::fmt;

/// Classifier failure with enough raw context to debug a bad model response.
#[derive(Debug, Clone)]
pub struct LlmDiagnosticsError {
    pub provider: Provider,
    pub stage: &'static str,
    pub detail: String,
    pub raw_output: Option<String>,
    pub raw_response_json: Option<Value>,
}

impl LlmDiagnosticsError {
    /// The model's raw text, or the raw response body when there was no text, clipped to
    /// `max_chars`.
    pub fn raw_excerpt(&self, max_chars: usize) -> Option<String> {
        let raw = match (&self.raw_output, &self.raw_response_json) {
            (Some(text), _) if !text.trim().is_empty() => text.clone(),
            (_, Some(json)) => json.to_string(),
            _ => return None,
        };
        Some(raw.chars().take(max_chars).collect())
    }
}

impl fmt::Display for LlmDiagnosticsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "LLM classification error (provider={:?}, stage={}): {}",
            self.provider, self.stage, self.detail
        )
    }
}

impl std::error::Error for LlmDiagnosticsError {}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn diag(raw_output: Option<&str>, raw_response_json: Option<Value>) -> LlmDiagnosticsError {
        LlmDiagnosticsError {
            provider: Provider::Anthropic,
            stage: "parse_after_repair",
            detail: "bad".to_string(),
            raw_output: raw_output.map(str::to_string),
            raw_response_json,
        }
    }

    #[test]
    fn excerpt_prefers_text_then_falls_back_to_response_json() {
        let body = json!({"content": []});
        assert_eq!(
            diag(Some("not json at all"), Some(body.clone())).raw_excerpt(7).as_deref(),
            Some("not jso")
        );
        assert_eq!(
            diag(Some("  "), Some(body)).raw_excerpt(100).as_deref(),
            Some(r#"{"content":[]}"#)
        );
        assert_eq!(diag(None, None).raw_excerpt(100), None);
    }
}
