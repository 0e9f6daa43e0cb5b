//! Save orchestration.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::context::core::config::ContextConfig;
use crate::context::core::errors::{ContextError, ContextResult};
use crate::context::core::ids::RunId;
use crate::context::ingest::chunker::{chunk_messages, total_tokens};
use crate::context::ingest::parser::ConversationParser;
use crate::context::storage::context_files::{ContextStorage, SummaryMetadata};
use crate::context::storage::run_store::{RunRecord, RunStore, SqliteRunStore};
use crate::context::summarization::generator::{Generator, build_generator};
use crate::context::summarization::merge::SummaryMerger;
use crate::context::summarization::reducer::{
    ProgressFn, RecursiveReducer, ReducerConfig, SchedulePolicy,
};

/// Result of a completed save.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SaveOutcome {
    /// Written context file.
    pub path: PathBuf,
    /// Parsed message count.
    pub message_count: usize,
    /// Chunk count.
    pub chunk_count: usize,
    /// Estimate of the whole conversation.
    pub original_tokens: usize,
    /// Estimate of the final summary.
    pub summary_tokens: usize,
    /// Final summary text.
    pub summary: String,
}

/// Backend dependencies for the context engine.
pub struct ContextBackends {
    /// Text generation backend.
    pub generator: Arc<dyn Generator>,
    /// Run ledger; saves are not recorded when absent.
    pub run_store: Option<Arc<dyn RunStore>>,
}

impl ContextBackends {
    /// Build the configured generator and the project's `SQLite` ledger.
    ///
    /// # Errors
    /// Returns an error if the generator or the ledger cannot be initialized.
    pub async fn from_config(config: &ContextConfig, project_root: &Path) -> ContextResult<Self> {
        let generator = build_generator(&config.llm)?;
        std::fs::create_dir_all(config.storage.context_dir_for(project_root))?;
        let run_store = SqliteRunStore::open(
            &config.storage.sqlite_path_for(project_root),
            &config.storage.runs_table,
        )
        .await?;
        Ok(Self {
            generator,
            run_store: Some(Arc::new(run_store)),
        })
    }
}

/// Conversation summarization engine.
pub struct ContextEngine {
    config: ContextConfig,
    parser: ConversationParser,
    storage: ContextStorage,
    reducer: RecursiveReducer,
    run_store: Option<Arc<dyn RunStore>>,
}

impl ContextEngine {
    /// Create a new engine.
    ///
    /// # Errors
    /// Returns an error if the configuration is invalid.
    pub fn new(config: ContextConfig, backends: ContextBackends) -> ContextResult<Self> {
        config.validate()?;
        let parser = ConversationParser::new()?;
        let storage = ContextStorage::new(&config.storage)?;
        let merger = SummaryMerger::new(backends.generator, config.summary.max_output_tokens);
        let reducer = RecursiveReducer::new(
            merger,
            ReducerConfig::from(&config.summary),
            SchedulePolicy::from(&config.schedule),
        );

        Ok(Self {
            config,
            parser,
            storage,
            reducer,
            run_store: backends.run_store,
        })
    }

    /// Summarize a conversation and write it to the project's context directory.
    ///
    /// The run is recorded under `session_id` when a ledger is attached.
    /// `project_root` is stored in canonical form.
    ///
    /// # Errors
    /// Returns [`ContextError::NoMessages`] when the text has no role markers,
    /// or the first generation or storage error.
    pub async fn save(
        &self,
        conversation: &str,
        description: &str,
        project_root: &Path,
        session_id: Option<&str>,
        progress: Option<ProgressFn<'_>>,
    ) -> ContextResult<SaveOutcome> {
        let messages = self.parser.parse(conversation);
        if messages.is_empty() {
            return Err(ContextError::NoMessages);
        }

        let chunks = chunk_messages(&messages, self.config.chunking.max_tokens_per_chunk);
        let original_tokens = total_tokens(&chunks);
        info!(
            messages = messages.len(),
            chunks = chunks.len(),
            original_tokens,
            "Conversation prepared"
        );

        let summary = self.reducer.reduce(&chunks, progress).await?;

        self.storage.ensure_context_dir(project_root)?;
        let project_root = std::fs::canonicalize(project_root)?;

        let metadata = SummaryMetadata {
            description: description.to_string(),
            message_count: messages.len(),
            original_tokens,
            summary_tokens: summary.token_estimate,
        };
        let path = self
            .storage
            .save_summary(&project_root, &summary.text, &metadata)?;

        let outcome = SaveOutcome {
            path,
            message_count: messages.len(),
            chunk_count: chunks.len(),
            original_tokens,
            summary_tokens: summary.token_estimate,
            summary: summary.text,
        };
        self.record(&outcome, description, &project_root, session_id)
            .await;
        Ok(outcome)
    }

    async fn record(
        &self,
        outcome: &SaveOutcome,
        description: &str,
        project_root: &Path,
        session_id: Option<&str>,
    ) {
        let Some(store) = &self.run_store else {
            return;
        };

        let record = RunRecord {
            id: RunId::new(),
            session_id: session_id.map(str::to_string),
            project_root: project_root.to_path_buf(),
            description: description.to_string(),
            file_path: outcome.path.clone(),
            message_count: outcome.message_count as u64,
            chunk_count: outcome.chunk_count as u64,
            original_tokens: outcome.original_tokens as u64,
            summary_tokens: outcome.summary_tokens as u64,
            created_at: Utc::now(),
        };
        let run_id = record.id;

        // The context file is already on disk; a ledger failure doesn't undo it.
        match store.record_run(record).await {
            Ok(()) => debug!(run_id = %run_id, "Recorded run"),
            Err(err) => warn!(error = %err, "Failed to record run"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::core::config::ScheduleConfig;
    use crate::context::engine::archive::ContextArchive;
    use crate::context::storage::context_files::load_context;
    use crate::context::summarization::generator::stub::StubGenerator;
    use std::sync::Mutex;

    fn config() -> ContextConfig {
        ContextConfig {
            schedule: ScheduleConfig {
                max_concurrent_calls: 1,
                inter_call_delay_ms: 0,
            },
            ..ContextConfig::default()
        }
    }

    fn engine_with(
        stub: Arc<StubGenerator>,
        run_store: Option<Arc<dyn RunStore>>,
    ) -> ContextResult<ContextEngine> {
        ContextEngine::new(
            config(),
            ContextBackends {
                generator: stub,
                run_store,
            },
        )
    }

    async fn file_ledger(project_root: &Path) -> ContextResult<Arc<dyn RunStore>> {
        let storage = config().storage;
        std::fs::create_dir_all(storage.context_dir_for(project_root))?;
        let store =
            SqliteRunStore::open(&storage.sqlite_path_for(project_root), &storage.runs_table)
                .await?;
        Ok(Arc::new(store))
    }

    /// `path` spelled relative to the current directory.
    fn relative_to_cwd(path: &Path) -> ContextResult<PathBuf> {
        let cwd = std::env::current_dir()?;
        let up = "../".repeat(cwd.components().count());
        let absolute = path.strip_prefix("/").unwrap_or(path);
        Ok(PathBuf::from(up).join(absolute))
    }

    #[tokio::test]
    async fn test_save_without_markers_is_rejected() -> ContextResult<()> {
        let dir = tempfile::tempdir()?;
        let stub = Arc::new(StubGenerator::with_reply("summary"));
        let engine = engine_with(stub.clone(), None)?;

        let result = engine
            .save("just some notes\nwith no roles", "notes", dir.path(), None, None)
            .await;

        assert!(matches!(result, Err(ContextError::NoMessages)));
        assert_eq!(stub.calls(), 0);
        assert!(std::fs::read_dir(dir.path())?.next().is_none());
        Ok(())
    }

    #[tokio::test]
    async fn test_save_writes_file_and_records_run() -> ContextResult<()> {
        let dir = tempfile::tempdir()?;
        let stub = Arc::new(StubGenerator::with_reply("## Work done\n- fixed parser"));
        let engine = engine_with(stub.clone(), Some(file_ledger(dir.path()).await?))?;

        let lines = Mutex::new(Vec::new());
        let progress = |line: &str| {
            if let Ok(mut lines) = lines.lock() {
                lines.push(line.to_string());
            }
        };

        let outcome = engine
            .save(
                "user: hi\nassistant: hello",
                "Parser fix",
                dir.path(),
                Some("session-42"),
                Some(&progress),
            )
            .await?;

        assert_eq!(outcome.message_count, 2);
        assert_eq!(outcome.chunk_count, 1);
        assert_eq!(outcome.original_tokens, 3);
        assert_eq!(outcome.summary, "## Work done\n- fixed parser");
        assert_eq!(stub.calls(), 1);
        let canonical = std::fs::canonicalize(dir.path())?;
        assert!(outcome.path.starts_with(canonical.join(".claude/context")));

        let content = load_context(&outcome.path)?;
        assert!(content.starts_with("# Context Summary - Parser fix"));
        assert!(content.contains("**Messages Processed**: 2"));
        assert!(content.ends_with("- fixed parser\n") || content.ends_with("- fixed parser"));

        let logged = lines.lock().map(|l| l.clone()).unwrap_or_default();
        assert_eq!(logged.first().map(String::as_str), Some("Summarizing 1 chunks..."));

        let archive = ContextArchive::new(&config().storage)?;
        let stats = archive.session_stats(dir.path(), "session-42").await?;
        assert_eq!(stats.runs, 1);
        assert_eq!(stats.total_original_tokens, 3);
        assert_eq!(archive.session_stats(dir.path(), "other").await?.runs, 0);
        Ok(())
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_relative_root_is_found_by_absolute_root() -> ContextResult<()> {
        let dir = tempfile::tempdir()?;
        let relative = relative_to_cwd(dir.path())?;
        assert!(relative.is_relative());

        let stub = Arc::new(StubGenerator::with_reply("summary"));
        let engine = engine_with(stub, Some(file_ledger(&relative).await?))?;
        let outcome = engine
            .save("user: a\nassistant: b", "Relative", &relative, Some("s"), None)
            .await?;

        assert!(outcome.path.is_absolute());
        let archive = ContextArchive::new(&config().storage)?;
        assert_eq!(archive.session_stats(dir.path(), "s").await?.runs, 1);
        assert_eq!(archive.list(dir.path())?.len(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_save_without_ledger_still_writes_file() -> ContextResult<()> {
        let dir = tempfile::tempdir()?;
        let engine = engine_with(Arc::new(StubGenerator::with_tokens(10)), None)?;

        let outcome = engine
            .save("user: q\nassistant: a", "No ledger", dir.path(), Some("s"), None)
            .await?;

        assert!(outcome.path.is_file());
        assert!(!config().storage.sqlite_path_for(dir.path()).exists());
        Ok(())
    }

    #[tokio::test]
    async fn test_generation_failure_writes_nothing() -> ContextResult<()> {
        let dir = tempfile::tempdir()?;
        let stub = Arc::new(StubGenerator::with_reply("x").failing_on_call(1));
        let engine = engine_with(stub, Some(file_ledger(dir.path()).await?))?;

        let result = engine
            .save("user: a\nassistant: b", "Broken", dir.path(), Some("s"), None)
            .await;

        assert!(matches!(result, Err(ContextError::Generation(_))));
        let archive = ContextArchive::new(&config().storage)?;
        assert!(archive.list(dir.path())?.is_empty());
        assert_eq!(archive.session_stats(dir.path(), "s").await?.runs, 0);
        Ok(())
    }
}
