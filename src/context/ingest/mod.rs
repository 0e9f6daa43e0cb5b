//! Transcript ingestion: messages, parsing, token estimation and chunking.

pub mod chunker;
pub mod message;
pub mod parser;
pub mod tokens;

pub use chunker::{Chunk, chunk_messages, total_tokens};
pub use message::{Message, Role, messages_to_text};
pub use parser::ConversationParser;
pub use tokens::{CHARS_PER_TOKEN, estimate_tokens};
