//! Claude API provider implementation.

use std::time::Duration;

use async_trait::async_trait;
use mediphant_core::{Error, Result};

use crate::provider::{CompletionRequest, CompletionResponse, LlmProvider, StopReason, TokenUsage};

/// Default Anthropic Messages API endpoint.
pub const DEFAULT_CLAUDE_URL: &str = "https://api.anthropic.com/v1/messages";

/// LLM provider using Anthropic's Claude API.
pub struct ClaudeProvider {
    api_key: String,
    model: String,
    url: String,
    client: reqwest::Client,
}

impl ClaudeProvider {
    /// Creates a new Claude provider.
    ///
    /// # Arguments
    ///
    /// * `api_key` - Anthropic API key
    /// * `model` - Model ID (e.g., "claude-sonnet-4-20250514")
    /// * `timeout` - Per-request timeout
    pub fn new(
        api_key: impl Into<String>,
        model: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(Error::config("missing Anthropic API key"));
        }
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::config(format!("failed to build Claude HTTP client: {e}")))?;
        Ok(Self {
            api_key,
            model: model.into(),
            url: DEFAULT_CLAUDE_URL.to_string(),
            client,
        })
    }

    /// Send requests to a different Messages endpoint.
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    fn request_body(&self, request: &CompletionRequest) -> serde_json::Value {
        serde_json::json!({
            "model": self.model,
            "max_tokens": request.max_tokens,
            "temperature": request.temperature,
            "messages": [{"role": "user", "content": request.prompt}],
        })
    }
}

#[async_trait]
impl LlmProvider for ClaudeProvider {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse> {
        let body = self.request_body(&request);
        tracing::debug!(model = %self.model, "Calling Claude");

        let response = self
            .client
            .post(&self.url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", "2023-06-01")
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::provider("claude", format!("Failed to call Claude API: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(Error::provider(
                "claude",
                format!("Claude API error {status}: {error_text}"),
            ));
        }

        let response_body: serde_json::Value = response.json().await.map_err(|e| {
            Error::provider("claude", format!("Failed to parse Claude response: {e}"))
        })?;
        parse_response(&response_body)
    }

    fn name(&self) -> &str {
        "claude"
    }

    fn model(&self) -> &str {
        &self.model
    }
}

fn parse_response(body: &serde_json::Value) -> Result<CompletionResponse> {
    // Concatenate every text block; tool or thinking blocks are ignored.
    let content: String = body["content"]
        .as_array()
        .ok_or_else(|| Error::provider("claude", "Missing content in Claude response"))?
        .iter()
        .filter(|block| block["type"] == "text")
        .filter_map(|block| block["text"].as_str())
        .collect();

    let usage = &body["usage"];
    let tokens_used = TokenUsage {
        input: usage["input_tokens"].as_u64().unwrap_or_default(),
        output: usage["output_tokens"].as_u64().unwrap_or_default(),
    };

    let stop_reason = match body["stop_reason"].as_str() {
        Some("end_turn") | None => StopReason::EndTurn,
        Some("max_tokens") => StopReason::MaxTokens,
        Some("refusal") => StopReason::Safety,
        Some(_) => StopReason::Other,
    };

    Ok(CompletionResponse {
        content,
        tokens_used,
        stop_reason,
    })
}
