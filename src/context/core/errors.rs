//! Error types for the context subsystem.

use thiserror::Error;

/// Context subsystem error type.
#[derive(Debug, Error)]
pub enum ContextError {
    /// Invalid configuration or unsupported values.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    /// Invalid caller input.
    #[error("invalid input: {0}")]
    InvalidInput(String),
    /// Parsing the conversation produced no messages.
    #[error("no messages found in conversation")]
    NoMessages,
    /// Reduction was started without any chunk.
    #[error("no chunks to summarize")]
    NoChunks,
    /// The generation backend rejected the request.
    #[error("generation failed: {0}")]
    Generation(String),
    /// Requested context file does not exist.
    #[error("context file not found: {0}")]
    ContextNotFound(String),
    /// HTTP client error from Rig.
    #[error("http client error: {0}")]
    HttpClient(#[from] rig::http_client::Error),
    /// Completion error.
    #[error("completion error: {0}")]
    Completion(#[from] rig::completion::CompletionError),
    /// Raw HTTP error.
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    /// `SQLite` storage error (sync).
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    /// `SQLite` storage error (async).
    #[error("tokio-rusqlite error: {0}")]
    TokioSqlite(#[from] tokio_rusqlite::Error),
    /// Pattern compilation error.
    #[error("regex error: {0}")]
    Regex(#[from] regex::Error),
    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    /// URL parse error.
    #[error("url parse error: {0}")]
    Url(#[from] url::ParseError),
    /// I/O error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience result alias for context operations.
pub type ContextResult<T> = Result<T, ContextError>;
