//! Read side of saved contexts: listing, restoring and ledger totals.

use std::path::Path;

use tracing::debug;

use crate::context::core::config::StorageConfig;
use crate::context::core::errors::ContextResult;
use crate::context::storage::context_files::{ContextFile, ContextStorage, load_context};
use crate::context::storage::run_store::{RunStats, RunStore, SqliteRunStore};

/// A context file and its contents.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RestoredContext {
    /// File that was loaded.
    pub file: ContextFile,
    /// Full document.
    pub content: String,
}

/// Saved contexts of a project. Needs no generation backend.
pub struct ContextArchive {
    config: StorageConfig,
    storage: ContextStorage,
}

impl ContextArchive {
    /// Create an archive over the configured context directory.
    ///
    /// # Errors
    /// Returns an error if the storage layer cannot be initialized.
    pub fn new(config: &StorageConfig) -> ContextResult<Self> {
        Ok(Self {
            config: config.clone(),
            storage: ContextStorage::new(config)?,
        })
    }

    /// Context files of a project, newest first.
    ///
    /// # Errors
    /// Returns an error if the context directory cannot be read.
    pub fn list(&self, project_root: &Path) -> ContextResult<Vec<ContextFile>> {
        self.storage.list_context_files(project_root)
    }

    /// Load `filename`, or the most recent context when `None`.
    ///
    /// Returns `Ok(None)` only when no name is given and nothing was saved yet.
    ///
    /// # Errors
    /// Returns [`crate::context::core::errors::ContextError::ContextNotFound`]
    /// when `filename` doesn't exist, or an I/O error.
    pub fn restore(
        &self,
        project_root: &Path,
        filename: Option<&str>,
    ) -> ContextResult<Option<RestoredContext>> {
        let file = match filename {
            Some(name) => Some(self.storage.find_context(project_root, name)?),
            None => self.storage.most_recent_context(project_root)?,
        };

        file.map(|file| {
            let content = load_context(&file.path)?;
            Ok(RestoredContext { file, content })
        })
        .transpose()
    }

    /// Ledger totals for `session_id`. A project without a ledger reports
    /// zero and is left untouched.
    ///
    /// # Errors
    /// Returns an error if an existing ledger cannot be read.
    pub async fn session_stats(
        &self,
        project_root: &Path,
        session_id: &str,
    ) -> ContextResult<RunStats> {
        let path = self.config.sqlite_path_for(project_root);
        if !path.is_file() {
            debug!(path = %path.display(), "No run ledger yet");
            return Ok(RunStats::default());
        }

        let store = SqliteRunStore::open(&path, &self.config.runs_table).await?;
        store.stats(session_id).await
    }
}
