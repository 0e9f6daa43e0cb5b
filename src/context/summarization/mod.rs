//! Recursive summarization over a text-generation backend.
//!
//! - `generator`: the prompt-in, text-out capability and its factory
//! - `anthropic` / `ollama`: concrete backends
//! - `merge`: chunk summarization and summary merging
//! - `reducer`: the level-by-level reduction loop and its pacing policy

pub mod anthropic;
pub mod generator;
pub mod merge;
pub mod ollama;
pub mod reducer;

pub use anthropic::AnthropicGenerator;
pub use generator::{GenerateFuture, Generator, build_generator};
pub use merge::{SUMMARY_SEPARATOR, Summary, SummaryMerger, chunk_prompt, merge_prompt};
pub use ollama::OllamaGenerator;
pub use reducer::{
    FINAL_MERGE_MAX_SUMMARIES, MERGE_BATCH_SIZE, ProgressFn, RecursiveReducer, ReducerConfig,
    SchedulePolicy,
};
