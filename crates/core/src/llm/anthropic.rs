use crate::config::Settings;
use crate::llm::error::LlmDiagnosticsError;
use crate::llm::json::{self, LlmClassification};
use crate::llm::Provider;
use crate::sentiment::classifier::{Classification, LabelClassifier};
use anyhow::Context;
use reqwest::header::{HeaderMap, HeaderValue};
use serde::{Deserialize, Serialize};
use std::time::Duration;

const ANTHROPIC_VERSION: &str = "2023-06-01";
const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
const DEFAULT_MODEL: &str = "claude-3-5-haiku-latest";
const DEFAULT_MAX_TOKENS: u32 = 256;
const DEFAULT_TIMEOUT_SECS: u64 = 30;

// Long bodies add cost without changing the label much.
const MAX_INPUT_CHARS: usize = 4000;

const TOOL_NAME_EMIT_SENTIMENT: &str = "emit_sentiment";

/// Financial-news sentiment classifier backed by the Anthropic Messages API.
#[derive(Debug, Clone)]
pub struct AnthropicClassifier {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
    max_tokens: u32,
}

impl AnthropicClassifier {
    pub fn from_settings(settings: &Settings) -> anyhow::Result<Self> {
        let api_key = settings.require_anthropic_api_key()?.to_string();
        let base_url =
            std::env::var("ANTHROPIC_BASE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.to_string());
        let model = std::env::var("ANTHROPIC_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.to_string());
        let max_tokens = std::env::var("ANTHROPIC_MAX_TOKENS")
            .ok()
            .and_then(|s| s.parse::<u32>().ok())
            .unwrap_or(DEFAULT_MAX_TOKENS);

        let timeout_secs = std::env::var("ANTHROPIC_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(DEFAULT_TIMEOUT_SECS);

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .context("failed to build reqwest client")?;

        Ok(Self {
            http,
            api_key,
            base_url,
            model,
            max_tokens,
        })
    }

    async fn create_message(
        &self,
        req: CreateMessageRequest,
    ) -> anyhow::Result<(serde_json::Value, CreateMessageResponse)> {
        let mut headers = HeaderMap::new();
        headers.insert("x-api-key", HeaderValue::from_str(&self.api_key)?);
        headers.insert(
            "anthropic-version",
            HeaderValue::from_static(ANTHROPIC_VERSION),
        );

        let url = format!("{}/v1/messages", self.base_url.trim_end_matches('/'));
        let res = self
            .http
            .post(url)
            .headers(headers)
            .json(&req)
            .send()
            .await
            .context("Anthropic request failed")?;

        let status = res.status();
        let text = res
            .text()
            .await
            .context("failed to read Anthropic response body")?;
        if !status.is_success() {
            let raw_response_json = serde_json::from_str::<serde_json::Value>(&text).ok();
            return Err(LlmDiagnosticsError {
                provider: Provider::Anthropic,
                stage: "http",
                detail: format!("status={status}"),
                raw_output: Some(text),
                raw_response_json,
            }
            .into());
        }

        let raw_json = serde_json::from_str::<serde_json::Value>(&text)
            .with_context(|| format!("failed to parse Anthropic response JSON: {text}"))?;
        let parsed = serde_json::from_value::<CreateMessageResponse>(raw_json.clone())
            .context("failed to decode Anthropic response into CreateMessageResponse")?;
        Ok((raw_json, parsed))
    }

    fn request(&self, content: String) -> CreateMessageRequest {
        CreateMessageRequest {
            model: self.model.clone(),
            max_tokens: self.max_tokens,
            system: Some(Self::system_prompt()),
            messages: vec![Message {
                role: "user",
                content,
            }],
            tools: Some(Self::tools()),
            tool_choice: Some(ToolChoice::Tool {
                name: TOOL_NAME_EMIT_SENTIMENT,
            }),
        }
    }

    fn tools() -> Vec<Tool> {
        let schema = serde_json::json!({
            "type": "object",
            "additionalProperties": false,
            "required": ["label", "confidence"],
            "properties": {
                "label": {"type": "string", "enum": ["positive", "negative", "neutral"]},
                "confidence": {"type": "number", "minimum": 0, "maximum": 1}
            }
        });

        vec![Tool {
            name: TOOL_NAME_EMIT_SENTIMENT,
            description: "Emit the sentiment label of the article for the stock of the company it covers",
            input_schema: schema,
        }]
    }

    fn system_prompt() -> String {
        [
            "You classify a financial news article for its likely effect on the stock of the company it is about.",
            "Return ONLY valid JSON. Do not wrap in markdown.",
            "Output schema: {\"label\": \"positive\" | \"negative\" | \"neutral\", \"confidence\": 0.0}",
            "- confidence must be in [0, 1]",
            "- use neutral when the article carries no clear signal",
        ]
        .join("\n")
    }

    fn user_prompt(text: &str) -> String {
        let clipped: String = text.chars().take(MAX_INPUT_CHARS).collect();
        format!("Article:\n{clipped}")
    }

    fn repair_prompt(previous_output: &str) -> String {
        format!(
            "Your previous message was NOT valid JSON.\n\n\
Output ONLY a single JSON object: {{\"label\": \"positive\" | \"negative\" | \"neutral\", \"confidence\": <number in [0, 1]>}}\n\
No markdown, no prose.\n\n\
INVALID OUTPUT (for reference only):\n{previous_output}"
        )
    }

    fn response_text(res: &CreateMessageResponse) -> String {
        let mut out = String::new();
        for block in &res.content {
            if let ContentBlock::Text { text } = block {
                if !out.is_empty() {
                    out.push('\n');
                }
                out.push_str(text);
            }
        }
        out
    }

    fn response_tool_classification(
        res: &CreateMessageResponse,
    ) -> anyhow::Result<Option<Classification>> {
        for block in &res.content {
            if let ContentBlock::ToolUse { name, input, .. } = block {
                if name == TOOL_NAME_EMIT_SENTIMENT {
                    let parsed = serde_json::from_value::<LlmClassification>(input.clone())
                        .context("failed to decode tool_use.input into LlmClassification")?;
                    return Ok(Some(parsed.validate()?));
                }
            }
        }
        Ok(None)
    }

    /// Like `response_tool_classification`, but a malformed tool input keeps the raw response.
    fn tool_classification_or_diagnostics(
        res: &CreateMessageResponse,
        raw: serde_json::Value,
    ) -> anyhow::Result<Option<Classification>> {
        Self::response_tool_classification(res).map_err(|err| {
            LlmDiagnosticsError {
                provider: Provider::Anthropic,
                stage: "decode_tool_use",
                detail: format!("{err:#}"),
                raw_output: None,
                raw_response_json: Some(raw),
            }
            .into()
        })
    }
}

#[async_trait::async_trait]
impl LabelClassifier for AnthropicClassifier {
    fn name(&self) -> &'static str {
        "anthropic"
    }

    async fn classify(&self, text: &str) -> anyhow::Result<Classification> {
        let (raw, res) = self.create_message(self.request(Self::user_prompt(text))).await?;

        if let Some(classification) = Self::tool_classification_or_diagnostics(&res, raw)? {
            return Ok(classification);
        }

        // Fallback to text (should be rare); one repair attempt.
        let text_out = Self::response_text(&res);
        match json::parse_classification(&text_out) {
            Ok(classification) => Ok(classification),
            Err(first_err) => {
                tracing::warn!(error = %first_err, "classifier output invalid; attempting repair");
                let (repair_raw, repair_res) = self
                    .create_message(self.request(Self::repair_prompt(&text_out)))
                    .await?;
                if let Some(classification) =
                    Self::tool_classification_or_diagnostics(&repair_res, repair_raw.clone())?
                {
                    return Ok(classification);
                }
                let repair_text = Self::response_text(&repair_res);
                json::parse_classification(&repair_text).map_err(|err| {
                    LlmDiagnosticsError {
                        provider: Provider::Anthropic,
                        stage: "parse_after_repair",
                        detail: format!("final_error={err}"),
                        raw_output: Some(repair_text),
                        raw_response_json: Some(repair_raw),
                    }
                    .into()
                })
            }
        }
    }
}

#[derive(Debug, Clone, Serialize)]
struct CreateMessageRequest {
    model: String,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    messages: Vec<Message>,

    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<Tool>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_choice: Option<ToolChoice>,
}

#[derive(Debug, Clone, Serialize)]
struct Message {
    role: &'static str,
    content: String,
}

#[derive(Debug, Clone, Deserialize)]
struct CreateMessageResponse {
    content: Vec<ContentBlock>,
}

#[derive(Debug, Clone, Serialize)]
struct Tool {
    name: &'static str,
    description: &'static str,
    input_schema: serde_json::Value,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
enum ToolChoice {
    #[serde(rename = "tool")]
    Tool { name: &'static str },
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type")]
enum ContentBlock {
    #[serde(rename = "text")]
    Text { text: String },

    #[serde(rename = "tool_use")]
    ToolUse {
        #[serde(default)]
        name: String,
        #[serde(default)]
        input: serde_json::Value,
    },

    #[serde(other)]
    Unknown,
}
