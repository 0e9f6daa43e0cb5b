//! Chunk summarization and summary merging.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::context::core::errors::{ContextError, ContextResult};
use crate::context::ingest::chunker::Chunk;
use crate::context::ingest::message::messages_to_text;
use crate::context::ingest::tokens::estimate_tokens;
use crate::context::summarization::generator::Generator;

/// Separator placed between summaries handed to a merge call.
pub const SUMMARY_SEPARATOR: &str = "\n\n---\n\n";

const CHUNK_PROMPT_HEADER: &str = "You are summarizing a portion of a conversation between a user and an AI coding assistant.

Your task is to create a comprehensive but concise summary that preserves:
1. Key decisions and choices made
2. Important code changes and their purposes
3. Problems solved and bugs fixed
4. Important discoveries or learnings
5. Any ongoing work or next steps

Focus on technical substance. Omit conversational pleasantries and meta-discussion.

Conversation chunk to summarize:";

const CHUNK_PROMPT_FOOTER: &str = "Provide a concise summary in markdown format:";

const MERGE_PROMPT_HEADER: &str = "You are creating a higher-level summary by combining multiple summaries from a conversation between a user and an AI coding assistant.

Your task is to synthesize these summaries into one coherent summary that:
1. Maintains all critical information (decisions, code changes, bugs fixed)
2. Groups related topics together
3. Eliminates redundancy
4. Preserves important technical details
5. Tracks overall progress and outcomes

Combined summaries to synthesize:";

const MERGE_PROMPT_FOOTER: &str = "Provide a comprehensive synthesis in markdown format:";

/// A generated summary and the chunks it descends from.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Summary {
    /// Generated text; empty when the backend returned no text.
    pub text: String,
    /// Estimate of `text`.
    pub token_estimate: usize,
    /// Originating chunk ids, flattened in encounter order across merges.
    pub source_chunk_ids: Vec<usize>,
    /// Tree depth: 1 for chunk summaries, `max(inputs) + 1` for merges.
    pub level: u32,
}

impl Summary {
    fn from_generated(text: String, source_chunk_ids: Vec<usize>, level: u32) -> Self {
        if text.trim().is_empty() {
            warn!(
                level,
                sources = source_chunk_ids.len(),
                "Generation returned no text; keeping an empty summary"
            );
        }
        Self {
            token_estimate: estimate_tokens(&text),
            text,
            source_chunk_ids,
            level,
        }
    }
}

/// Build the instruction prompt for one chunk.
#[must_use]
pub fn chunk_prompt(chunk: &Chunk) -> String {
    let text = messages_to_text(&chunk.messages);
    format!("{CHUNK_PROMPT_HEADER}\n\n{text}\n\n{CHUNK_PROMPT_FOOTER}")
}

/// Build the synthesis prompt for a batch of summaries, in batch order.
#[must_use]
pub fn merge_prompt(summaries: &[Summary]) -> String {
    let combined = summaries
        .iter()
        .map(|s| s.text.as_str())
        .collect::<Vec<_>>()
        .join(SUMMARY_SEPARATOR);
    format!("{MERGE_PROMPT_HEADER}\n\n{combined}\n\n{MERGE_PROMPT_FOOTER}")
}

/// Turns chunks and summary batches into new summaries through a [`Generator`].
#[derive(Clone)]
pub struct SummaryMerger {
    generator: Arc<dyn Generator>,
    max_output_tokens: u64,
}

impl SummaryMerger {
    /// Create a merger that caps every generation at `max_output_tokens`.
    #[must_use]
    pub fn new(generator: Arc<dyn Generator>, max_output_tokens: u64) -> Self {
        Self {
            generator,
            max_output_tokens,
        }
    }

    /// Summarize one chunk into a level-1 summary.
    ///
    /// # Errors
    /// Returns an error if the generation call fails.
    pub async fn summarize_chunk(&self, chunk: &Chunk) -> ContextResult<Summary> {
        debug!(
            chunk_id = chunk.id,
            messages = chunk.messages.len(),
            tokens = chunk.token_estimate,
            "Summarizing chunk"
        );

        let prompt = chunk_prompt(chunk);
        let text = self
            .generator
            .generate(&prompt, self.max_output_tokens)
            .await?;

        Ok(Summary::from_generated(text, vec![chunk.id], 1))
    }

    /// Merge an ordered batch of summaries into one higher-level summary.
    ///
    /// # Errors
    /// Returns an error if the batch is empty or the generation call fails.
    pub async fn summarize_summaries(&self, summaries: Vec<Summary>) -> ContextResult<Summary> {
        let Some(max_level) = summaries.iter().map(|s| s.level).max() else {
            return Err(ContextError::InvalidInput(
                "cannot merge an empty batch of summaries".to_string(),
            ));
        };

        let prompt = merge_prompt(&summaries);
        let source_chunk_ids: Vec<usize> = summaries
            .into_iter()
            .flat_map(|s| s.source_chunk_ids)
            .collect();

        debug!(
            level = max_level + 1,
            sources = source_chunk_ids.len(),
            "Merging summaries"
        );

        let text = self
            .generator
            .generate(&prompt, self.max_output_tokens)
            .await?;

        Ok(Summary::from_generated(text, source_chunk_ids, max_level + 1))
    }
}
