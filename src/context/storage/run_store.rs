//! Ledger of completed summarization runs.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;

use chrono::{DateTime, Utc};
use tokio_rusqlite::Connection;

use crate::context::core::errors::{ContextError, ContextResult};
use crate::context::core::ids::RunId;

/// Boxed future type for run store operations.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// One completed save.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RunRecord {
    /// Run identifier.
    pub id: RunId,
    /// Host session that triggered the run, when known.
    pub session_id: Option<String>,
    /// Project the context was saved for.
    pub project_root: PathBuf,
    /// User description.
    pub description: String,
    /// Written context file.
    pub file_path: PathBuf,
    /// Parsed message count.
    pub message_count: u64,
    /// Chunk count.
    pub chunk_count: u64,
    /// Estimate of the whole conversation.
    pub original_tokens: u64,
    /// Estimate of the final summary.
    pub summary_tokens: u64,
    /// Completion time.
    pub created_at: DateTime<Utc>,
}

/// Aggregates over the runs of one host session.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RunStats {
    /// Number of recorded runs.
    pub runs: u64,
    /// Sum of conversation estimates.
    pub total_original_tokens: u64,
    /// Sum of summary estimates.
    pub total_summary_tokens: u64,
}

/// Run ledger trait.
pub trait RunStore: Send + Sync {
    /// Record a completed run.
    ///
    /// # Errors
    /// Returns an error if storage access fails.
    fn record_run(&self, record: RunRecord) -> StoreFuture<'_, ContextResult<()>>;
    /// Aggregates over the runs recorded for `session_id`.
    ///
    /// # Errors
    /// Returns an error if storage access fails.
    fn stats(&self, session_id: &str) -> StoreFuture<'_, ContextResult<RunStats>>;
}

/// `SQLite` implementation of the run ledger. One database lives in each
/// project's context directory.
pub struct SqliteRunStore {
    conn: Connection,
    table: String,
}

impl SqliteRunStore {
    /// Open (or create) the ledger at `path`.
    ///
    /// # Errors
    /// Returns an error if the database cannot be opened.
    pub async fn open(path: &Path, table: &str) -> ContextResult<Self> {
        let conn = Connection::open(path).await?;
        Self::init(conn, table).await
    }

    /// In-memory ledger.
    ///
    /// # Errors
    /// Returns an error if the database cannot be created.
    pub async fn open_in_memory(table: &str) -> ContextResult<Self> {
        let conn = Connection::open_in_memory().await?;
        Self::init(conn, table).await
    }

    async fn init(conn: Connection, table: &str) -> ContextResult<Self> {
        if table.is_empty() || !table.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err(ContextError::InvalidConfig(format!(
                "invalid runs table name: {table:?}"
            )));
        }

        let table = table.to_string();
        let table_name = table.clone();
        conn.call(move |conn| {
            conn.execute_batch(&format!(
                "CREATE TABLE IF NOT EXISTS {table_name} (
                    id TEXT PRIMARY KEY,
                    session_id TEXT,
                    project_root TEXT NOT NULL,
                    description TEXT NOT NULL,
                    file_path TEXT NOT NULL,
                    message_count INTEGER NOT NULL,
                    chunk_count INTEGER NOT NULL,
                    original_tokens INTEGER NOT NULL,
                    summary_tokens INTEGER NOT NULL,
                    created_at INTEGER NOT NULL
                );
                CREATE INDEX IF NOT EXISTS idx_{table_name}_session
                    ON {table_name} (session_id);"
            ))?;
            Ok(())
        })
        .await?;

        Ok(Self { conn, table })
    }
}

fn to_i64(value: u64, field: &str) -> ContextResult<i64> {
    i64::try_from(value).map_err(|_| ContextError::InvalidInput(format!("{field} out of range")))
}

fn to_u64(value: i64) -> u64 {
    u64::try_from(value).unwrap_or_default()
}

impl RunStore for SqliteRunStore {
    fn record_run(&self, record: RunRecord) -> StoreFuture<'_, ContextResult<()>> {
        Box::pin(async move {
            let table = self.table.clone();
            let message_count = to_i64(record.message_count, "message_count")?;
            let chunk_count = to_i64(record.chunk_count, "chunk_count")?;
            let original_tokens = to_i64(record.original_tokens, "original_tokens")?;
            let summary_tokens = to_i64(record.summary_tokens, "summary_tokens")?;
            let created_at = record.created_at.timestamp_millis();
            let project_root = record.project_root.to_string_lossy().into_owned();
            let file_path = record.file_path.to_string_lossy().into_owned();

            self.conn
                .call(move |conn| {
                    conn.execute(
                        &format!(
                            "INSERT INTO {table} (id, session_id, project_root, description, file_path,
                                message_count, chunk_count, original_tokens, summary_tokens, created_at)
                             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)"
                        ),
                        rusqlite::params![
                            record.id,
                            record.session_id,
                            project_root,
                            record.description,
                            file_path,
                            message_count,
                            chunk_count,
                            original_tokens,
                            summary_tokens,
                            created_at
                        ],
                    )?;
                    Ok(())
                })
                .await?;
            Ok(())
        })
    }

    fn stats(&self, session_id: &str) -> StoreFuture<'_, ContextResult<RunStats>> {
        let session_id = session_id.to_string();
        Box::pin(async move {
            let table = self.table.clone();
            let (runs, original, summary) = self
                .conn
                .call(move |conn| {
                    let row = conn.query_row(
                        &format!(
                            "SELECT COUNT(*), COALESCE(SUM(original_tokens), 0), COALESCE(SUM(summary_tokens), 0)
                             FROM {table} WHERE session_id = ?1"
                        ),
                        rusqlite::params![session_id],
                        |row| {
                            let runs: i64 = row.get(0)?;
                            let original: i64 = row.get(1)?;
                            let summary: i64 = row.get(2)?;
                            Ok((runs, original, summary))
                        },
                    )?;
                    Ok(row)
                })
                .await?;

            Ok(RunStats {
                runs: to_u64(runs),
                total_original_tokens: to_u64(original),
                total_summary_tokens: to_u64(summary),
            })
        })
    }
}
