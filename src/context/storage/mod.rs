//! Persistence: markdown context files and the run ledger.

pub mod context_files;
pub mod run_store;

pub use context_files::{
    ContextFile, ContextStorage, SummaryMetadata, compression_ratio, format_summary,
    generate_filename, load_context, sanitize_description,
};
pub use run_store::{RunRecord, RunStats, RunStore, SqliteRunStore, StoreFuture};
