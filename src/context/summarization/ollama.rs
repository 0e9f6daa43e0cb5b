//! Ollama generation backend through Rig.

use reqwest::Client as ReqwestClient;
use rig::client::CompletionClient;
use rig::completion::CompletionModel;
use rig::message::AssistantContent;
use rig::providers::ollama;
use tracing::debug;

use crate::context::core::config::LlmConfig;
use crate::context::core::errors::{ContextError, ContextResult};
use crate::context::summarization::generator::{GenerateFuture, Generator};

/// Generator backed by an Ollama completion model.
pub struct OllamaGenerator {
    model: ollama::CompletionModel,
    model_name: String,
    temperature: f64,
}

impl OllamaGenerator {
    /// Create a new Ollama generator.
    ///
    /// # Errors
    /// Returns an error if the Ollama client cannot be built.
    pub fn new(config: &LlmConfig) -> ContextResult<Self> {
        let builder = ollama::Client::<ReqwestClient>::builder().api_key(rig::client::Nothing);
        let builder = if let Some(base_url) = &config.base_url {
            builder.base_url(base_url)
        } else {
            builder
        };
        let client = builder.build().map_err(ContextError::from)?;
        let model_name = config.resolved_model().to_string();
        let model = client.completion_model(model_name.clone());

        Ok(Self {
            model,
            model_name,
            temperature: config.temperature,
        })
    }
}

impl Generator for OllamaGenerator {
    fn generate(
        &self,
        prompt: &str,
        max_output_tokens: u64,
    ) -> GenerateFuture<'_, ContextResult<String>> {
        let prompt = prompt.to_string();
        Box::pin(async move {
            debug!(
                model = %self.model_name,
                prompt_chars = prompt.len(),
                max_output_tokens,
                "Ollama completion"
            );

            let request = self
                .model
                .completion_request(prompt)
                .temperature(self.temperature)
                .max_tokens(max_output_tokens)
                .build();

            let response = self.model.completion(request).await?;
            Ok(extract_text(&response.choice))
        })
    }

    fn model_name(&self) -> &str {
        &self.model_name
    }
}

/// Concatenate the text parts of an assistant response; other content kinds are ignored.
fn extract_text(choice: &rig::OneOrMany<AssistantContent>) -> String {
    let mut out = String::new();
    for content in choice.iter() {
        if let AssistantContent::Text(text) = content {
            out.push_str(&text.text);
        }
    }
    out
}
