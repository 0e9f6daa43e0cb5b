//! Conversation context manager.
//!
//! Turns a long transcript into one bounded summary through recursive,
//! batched summarization, and keeps those summaries per project:
//! - `core`: Configuration, errors, and identifiers
//! - `ingest`: Messages, transcript parsing, token estimation, and chunking
//! - `summarization`: Generation backends, merge step, and recursive reducer
//! - `storage`: Markdown context files and the `SQLite` run ledger
//! - `hooks`: Host hook payloads and responses
//! - `engine`: Save orchestration and the read-only context archive

pub mod core;
pub mod engine;
pub mod hooks;
pub mod ingest;
pub mod storage;
pub mod summarization;

pub use self::core::{
    ChunkingConfig, ContextConfig, ContextError, ContextResult, LlmConfig, LlmProvider, RunId,
    ScheduleConfig, StorageConfig, SummaryConfig,
};
pub use engine::{ContextArchive, ContextBackends, ContextEngine, RestoredContext, SaveOutcome};
pub use hooks::{
    HookResponse, HookResponseOptions, HookSpecificOutput, HookType, StopInput,
    build_hook_response, create_hook_response, stop_summary_message,
};
pub use ingest::{Chunk, ConversationParser, Message, Role, chunk_messages, estimate_tokens};
pub use storage::{
    ContextFile, ContextStorage, RunRecord, RunStats, RunStore, SqliteRunStore, SummaryMetadata,
};
pub use summarization::{
    Generator, ProgressFn, RecursiveReducer, SchedulePolicy, Summary, SummaryMerger,
    build_generator,
};
