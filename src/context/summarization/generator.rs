//! Text-generation capability used by the summarizer.
//!
//! The summarizer only ever needs "prompt in, text out" with an output
//! ceiling, so backends are hidden behind the single-method [`Generator`]
//! trait and tests substitute deterministic stubs.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tracing::info;

use crate::context::core::config::{LlmConfig, LlmProvider};
use crate::context::core::errors::{ContextError, ContextResult};
use crate::context::summarization::anthropic::AnthropicGenerator;
use crate::context::summarization::ollama::OllamaGenerator;

/// Boxed future type for generation calls.
pub type GenerateFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Trait abstraction over text-generation backends.
pub trait Generator: Send + Sync {
    /// Generate text for `prompt`, producing at most `max_output_tokens` tokens.
    ///
    /// A backend that answers with no text returns an empty string rather
    /// than an error.
    ///
    /// # Errors
    /// Returns an error if the backend rejects the request or is unreachable.
    fn generate(
        &self,
        prompt: &str,
        max_output_tokens: u64,
    ) -> GenerateFuture<'_, ContextResult<String>>;

    /// Model name, for logs.
    fn model_name(&self) -> &str;
}

/// Build the generator selected by the configuration.
///
/// # Errors
/// Returns an error if the provider is missing credentials or its client cannot be built.
pub fn build_generator(config: &LlmConfig) -> ContextResult<Arc<dyn Generator>> {
    let generator: Arc<dyn Generator> = match config.provider {
        LlmProvider::Anthropic => {
            let api_key = config
                .api_key
                .as_deref()
                .filter(|key| !key.trim().is_empty())
                .ok_or_else(|| {
                    ContextError::InvalidConfig("ANTHROPIC_API_KEY not set".to_string())
                })?;
            Arc::new(AnthropicGenerator::new(config, api_key)?)
        }
        LlmProvider::Ollama => Arc::new(OllamaGenerator::new(config)?),
    };

    info!(
        provider = %config.provider,
        model = generator.model_name(),
        "Generation backend ready"
    );
    Ok(generator)
}
