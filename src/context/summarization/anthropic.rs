//! Anthropic Messages API generation backend.

use std::time::Duration;

use serde_json::json;
use tracing::{debug, warn};

use crate::context::core::config::{DEFAULT_ANTHROPIC_BASE_URL, LlmConfig};
use crate::context::core::errors::{ContextError, ContextResult};
use crate::context::summarization::generator::{GenerateFuture, Generator};

/// API version header value.
const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Maximum number of characters from an HTTP error body kept in error messages.
const MAX_ERROR_BODY_LEN: usize = 200;

/// Generator backed by the Anthropic Messages API.
pub struct AnthropicGenerator {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model_name: String,
    temperature: f64,
}

impl AnthropicGenerator {
    /// Create a new Anthropic generator.
    ///
    /// # Errors
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(config: &LlmConfig, api_key: &str) -> ContextResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;

        let base_url = config
            .base_url
            .as_deref()
            .unwrap_or(DEFAULT_ANTHROPIC_BASE_URL)
            .trim_end_matches('/')
            .to_string();

        Ok(Self {
            client,
            base_url,
            api_key: api_key.to_string(),
            model_name: config.resolved_model().to_string(),
            temperature: config.temperature,
        })
    }

    fn build_body(&self, prompt: &str, max_output_tokens: u64) -> serde_json::Value {
        json!({
            "model": self.model_name,
            "max_tokens": max_output_tokens,
            "temperature": self.temperature,
            "messages": [{
                "role": "user",
                "content": prompt
            }],
        })
    }

    async fn post(&self, body: serde_json::Value) -> ContextResult<serde_json::Value> {
        let url = format!("{}/v1/messages", self.base_url);

        let response = self
            .client
            .post(&url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            return Ok(response.json::<serde_json::Value>().await?);
        }

        let error_body = response
            .text()
            .await
            .unwrap_or_else(|_| "(unreadable body)".to_string());

        Err(map_http_error(status.as_u16(), &error_body))
    }
}

impl Generator for AnthropicGenerator {
    fn generate(
        &self,
        prompt: &str,
        max_output_tokens: u64,
    ) -> GenerateFuture<'_, ContextResult<String>> {
        let body = self.build_body(prompt, max_output_tokens);
        Box::pin(async move {
            debug!(model = %self.model_name, max_output_tokens, "Anthropic completion");
            let raw = self.post(body).await?;
            Ok(parse_text(&raw))
        })
    }

    fn model_name(&self) -> &str {
        &self.model_name
    }
}

/// Join every `text` content block. A response without text blocks yields `""`.
fn parse_text(json: &serde_json::Value) -> String {
    let blocks = json
        .get("content")
        .and_then(serde_json::Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default();

    let parts: Vec<&str> = blocks
        .iter()
        .filter(|block| block.get("type").and_then(serde_json::Value::as_str) == Some("text"))
        .filter_map(|block| block.get("text").and_then(serde_json::Value::as_str))
        .collect();

    if parts.is_empty() && !blocks.is_empty() {
        warn!(blocks = blocks.len(), "Response carried no text content");
    }

    parts.join("\n")
}

fn map_http_error(status: u16, body: &str) -> ContextError {
    let safe_body = if body.chars().count() > MAX_ERROR_BODY_LEN {
        let truncated: String = body.chars().take(MAX_ERROR_BODY_LEN).collect();
        format!("{truncated}...[truncated]")
    } else {
        body.to_string()
    };

    match status {
        401 => ContextError::Generation("unauthorized: check ANTHROPIC_API_KEY".to_string()),
        429 => ContextError::Generation("rate limited by Anthropic API".to_string()),
        s if s >= 500 => ContextError::Generation(format!("Anthropic server error {s}: {safe_body}")),
        s => ContextError::Generation(format!("HTTP {s}: {safe_body}")),
    }
}
