//! Core context types: configuration, errors and identifiers.

pub mod config;
pub mod errors;
pub mod ids;

pub use config::{
    ChunkingConfig, ContextConfig, LlmConfig, LlmProvider, ScheduleConfig, StorageConfig,
    SummaryConfig,
};
pub use errors::{ContextError, ContextResult};
pub use ids::RunId;
