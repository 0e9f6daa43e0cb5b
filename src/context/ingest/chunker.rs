//! Greedy token-bounded chunking of a message sequence.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::context::ingest::message::Message;
use crate::context::ingest::tokens::estimate_tokens;

/// A contiguous run of messages sized for one generation call.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    /// Sequential id, starting at 0 in creation order.
    pub id: usize,
    /// Messages in conversation order. Never empty.
    pub messages: Vec<Message>,
    /// Sum of the per-message estimates.
    pub token_estimate: usize,
}

/// Split messages into chunks of at most `max_tokens_per_chunk` estimated tokens.
///
/// Single pass: a chunk is closed when the next message would push it over the
/// limit and it already holds something. A message larger than the limit is
/// never split; it ends up alone in its chunk.
#[must_use]
pub fn chunk_messages(messages: &[Message], max_tokens_per_chunk: usize) -> Vec<Chunk> {
    let mut chunks = Vec::new();
    let mut current: Vec<Message> = Vec::new();
    let mut current_tokens = 0;

    for message in messages {
        let message_tokens = estimate_tokens(&message.content);

        if current_tokens + message_tokens > max_tokens_per_chunk && !current.is_empty() {
            chunks.push(Chunk {
                id: chunks.len(),
                messages: std::mem::take(&mut current),
                token_estimate: current_tokens,
            });
            current_tokens = 0;
        }

        current.push(message.clone());
        current_tokens += message_tokens;
    }

    if !current.is_empty() {
        chunks.push(Chunk {
            id: chunks.len(),
            messages: current,
            token_estimate: current_tokens,
        });
    }

    debug!(
        messages = messages.len(),
        chunks = chunks.len(),
        max_tokens_per_chunk,
        "Chunked conversation"
    );
    chunks
}

/// Total estimate across chunks.
#[must_use]
pub fn total_tokens(chunks: &[Chunk]) -> usize {
    chunks.iter().map(|chunk| chunk.token_estimate).sum()
}
