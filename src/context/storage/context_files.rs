//! Markdown context files under the project's context directory.
//!
//! Files are named `YYYYMMDD-HHmm - <description>.md` (local time) so that
//! listing can recover both the timestamp and the description from the name.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local, NaiveDateTime};
use regex::Regex;
use tracing::{debug, info};

use crate::context::core::config::StorageConfig;
use crate::context::core::errors::{ContextError, ContextResult};

/// Longest description kept in a file name.
const MAX_DESCRIPTION_CHARS: usize = 50;

/// Metadata rendered in the document header.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SummaryMetadata {
    /// Free-form description given by the user.
    pub description: String,
    /// Number of parsed messages.
    pub message_count: usize,
    /// Estimate of the whole conversation.
    pub original_tokens: usize,
    /// Estimate of the final summary.
    pub summary_tokens: usize,
}

/// A context file found on disk.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ContextFile {
    /// File name without directory.
    pub filename: String,
    /// Full path.
    pub path: PathBuf,
    /// Timestamp from the file name, or the modification time when the name doesn't carry one.
    pub timestamp: NaiveDateTime,
    /// Description from the file name.
    pub description: String,
}

/// Reads and writes context files.
pub struct ContextStorage {
    config: StorageConfig,
    filename_pattern: Regex,
}

impl ContextStorage {
    /// Create a storage handle.
    ///
    /// # Errors
    /// Returns an error if the file name pattern is invalid.
    pub fn new(config: &StorageConfig) -> ContextResult<Self> {
        Ok(Self {
            config: config.clone(),
            filename_pattern: Regex::new(r"^(\d{8})-(\d{4}) - (.+)\.md$")?,
        })
    }

    /// Context directory of a project.
    #[must_use]
    pub fn context_dir(&self, project_root: &Path) -> PathBuf {
        self.config.context_dir_for(project_root)
    }

    /// Create the context directory if needed.
    ///
    /// # Errors
    /// Returns an error if the directory cannot be created.
    pub fn ensure_context_dir(&self, project_root: &Path) -> ContextResult<PathBuf> {
        let dir = self.context_dir(project_root);
        fs::create_dir_all(&dir)?;
        Ok(dir)
    }

    /// Write a summary document stamped with the current local time.
    ///
    /// # Errors
    /// Returns an error if the directory or file cannot be written.
    pub fn save_summary(
        &self,
        project_root: &Path,
        summary: &str,
        metadata: &SummaryMetadata,
    ) -> ContextResult<PathBuf> {
        self.save_summary_at(project_root, summary, metadata, Local::now().naive_local())
    }

    /// Write a summary document stamped with `now`.
    ///
    /// # Errors
    /// Returns an error if the directory or file cannot be written.
    pub fn save_summary_at(
        &self,
        project_root: &Path,
        summary: &str,
        metadata: &SummaryMetadata,
        now: NaiveDateTime,
    ) -> ContextResult<PathBuf> {
        let dir = self.ensure_context_dir(project_root)?;
        let path = dir.join(generate_filename(&metadata.description, now));
        fs::write(&path, format_summary(summary, metadata, now))?;

        info!(path = %path.display(), "Saved context summary");
        Ok(path)
    }

    /// List context files, newest first.
    ///
    /// # Errors
    /// Returns an error if the directory exists but cannot be read.
    pub fn list_context_files(&self, project_root: &Path) -> ContextResult<Vec<ContextFile>> {
        let dir = self.context_dir(project_root);
        if !dir.is_dir() {
            return Ok(Vec::new());
        }

        let mut files = Vec::new();
        for entry in fs::read_dir(&dir)? {
            let entry = entry?;
            let filename = entry.file_name().to_string_lossy().into_owned();
            if !filename.ends_with(".md") || !entry.file_type()?.is_file() {
                continue;
            }

            let path = entry.path();
            let file = match self.parse_filename(&filename) {
                Some((timestamp, description)) => ContextFile {
                    filename,
                    path,
                    timestamp,
                    description,
                },
                None => {
                    let modified = entry.metadata()?.modified()?;
                    let timestamp = DateTime::<Local>::from(modified).naive_local();
                    let description = filename.trim_end_matches(".md").to_string();
                    ContextFile {
                        filename,
                        path,
                        timestamp,
                        description,
                    }
                }
            };
            files.push(file);
        }

        files.sort_by(|a, b| {
            b.timestamp
                .cmp(&a.timestamp)
                .then_with(|| b.filename.cmp(&a.filename))
        });
        debug!(count = files.len(), dir = %dir.display(), "Listed context files");
        Ok(files)
    }

    /// Most recent context file, if any.
    ///
    /// # Errors
    /// Returns an error if the directory cannot be read.
    pub fn most_recent_context(&self, project_root: &Path) -> ContextResult<Option<ContextFile>> {
        Ok(self.list_context_files(project_root)?.into_iter().next())
    }

    /// Find a context file by exact file name.
    ///
    /// # Errors
    /// Returns [`ContextError::ContextNotFound`] when no file has that name.
    pub fn find_context(&self, project_root: &Path, filename: &str) -> ContextResult<ContextFile> {
        self.list_context_files(project_root)?
            .into_iter()
            .find(|file| file.filename == filename)
            .ok_or_else(|| ContextError::ContextNotFound(filename.to_string()))
    }

    fn parse_filename(&self, filename: &str) -> Option<(NaiveDateTime, String)> {
        let caps = self.filename_pattern.captures(filename)?;
        let stamp = format!("{}{}", caps.get(1)?.as_str(), caps.get(2)?.as_str());
        let timestamp = NaiveDateTime::parse_from_str(&stamp, "%Y%m%d%H%M").ok()?;
        Some((timestamp, caps.get(3)?.as_str().to_string()))
    }
}

/// Read a context file.
///
/// # Errors
/// Returns an error if the file cannot be read.
pub fn load_context(path: &Path) -> ContextResult<String> {
    Ok(fs::read_to_string(path)?)
}

/// Keep letters, digits, whitespace and `-`; collapse whitespace; cap the length.
#[must_use]
pub fn sanitize_description(description: &str) -> String {
    let kept: String = description
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || c.is_whitespace() || *c == '-')
        .collect();
    kept.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .chars()
        .take(MAX_DESCRIPTION_CHARS)
        .collect()
}

/// File name for a summary saved at `now`.
#[must_use]
pub fn generate_filename(description: &str, now: NaiveDateTime) -> String {
    format!(
        "{} - {}.md",
        now.format("%Y%m%d-%H%M"),
        sanitize_description(description)
    )
}

/// `original:summary (p% reduction)`, with `p` rounded; 0% for an empty original.
#[must_use]
#[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation)]
pub fn compression_ratio(original_tokens: usize, summary_tokens: usize) -> String {
    let reduction = if original_tokens == 0 {
        0
    } else {
        ((1.0 - summary_tokens as f64 / original_tokens as f64) * 100.0).round() as i64
    };
    format!("{original_tokens}:{summary_tokens} ({reduction}% reduction)")
}

/// Render the markdown document for a summary.
#[must_use]
pub fn format_summary(summary: &str, metadata: &SummaryMetadata, now: NaiveDateTime) -> String {
    format!(
        "# Context Summary - {description}\n\n\
         **Date**: {date}\n\
         **Messages Processed**: {messages}\n\
         **Compression Ratio**: {ratio}\n\n\
         ---\n\n\
         {summary}\n",
        description = metadata.description,
        date = now.format("%Y-%m-%d %H:%M"),
        messages = metadata.message_count,
        ratio = compression_ratio(metadata.original_tokens, metadata.summary_tokens),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(hour: u32, minute: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 3, 7)
            .and_then(|d| d.and_hms_opt(hour, minute, 0))
            .unwrap_or_default()
    }

    fn metadata(description: &str) -> SummaryMetadata {
        SummaryMetadata {
            description: description.to_string(),
            message_count: 12,
            original_tokens: 20_000,
            summary_tokens: 1_000,
        }
    }

    fn storage() -> Option<ContextStorage> {
        ContextStorage::new(&StorageConfig::default()).ok()
    }

    #[test]
    fn test_sanitize_description() {
        assert_eq!(sanitize_description("  Fix: auth/login   flow!! "), "Fix authlogin flow");
        assert_eq!(sanitize_description("keep-dashes ok"), "keep-dashes ok");
        assert_eq!(sanitize_description(&"a".repeat(80)).len(), 50);
    }

    #[test]
    fn test_generate_filename() {
        assert_eq!(
            generate_filename("Feature implementation", at(9, 5)),
            "20260307-0905 - Feature implementation.md"
        );
    }

    #[test]
    fn test_compression_ratio() {
        assert_eq!(compression_ratio(20_000, 1_000), "20000:1000 (95% reduction)");
        assert_eq!(compression_ratio(0, 0), "0:0 (0% reduction)");
        assert_eq!(compression_ratio(100, 150), "100:150 (-50% reduction)");
    }

    #[test]
    fn test_format_summary() {
        let doc = format_summary("## Work\n- did things", &metadata("Auth work"), at(14, 30));
        assert!(doc.starts_with("# Context Summary - Auth work\n\n**Date**: 2026-03-07 14:30\n"));
        assert!(doc.contains("**Messages Processed**: 12\n"));
        assert!(doc.contains("**Compression Ratio**: 20000:1000 (95% reduction)\n"));
        assert!(doc.ends_with("---\n\n## Work\n- did things\n"));
    }

    #[test]
    fn test_save_list_and_load() -> ContextResult<()> {
        let dir = tempfile::tempdir()?;
        let Some(storage) = storage() else {
            panic!("storage init failed");
        };

        let older = storage.save_summary_at(dir.path(), "old", &metadata("first"), at(8, 0))?;
        let newer = storage.save_summary_at(dir.path(), "new", &metadata("second"), at(10, 0))?;
        fs::write(storage.context_dir(dir.path()).join("notes.txt"), "ignored")?;

        let files = storage.list_context_files(dir.path())?;
        assert_eq!(files.len(), 2);
        assert_eq!(files[0].path, newer);
        assert_eq!(files[0].description, "second");
        assert_eq!(files[0].timestamp, at(10, 0));
        assert_eq!(files[1].path, older);

        let recent = storage.most_recent_context(dir.path())?;
        assert_eq!(recent.map(|f| f.filename), Some("20260307-1000 - second.md".to_string()));

        let content = load_context(&newer)?;
        assert!(content.contains("\nnew\n"));
        Ok(())
    }

    #[test]
    fn test_unpatterned_markdown_uses_mtime() -> ContextResult<()> {
        let dir = tempfile::tempdir()?;
        let Some(storage) = storage() else {
            panic!("storage init failed");
        };
        let context_dir = storage.ensure_context_dir(dir.path())?;
        fs::write(context_dir.join("handwritten.md"), "# notes")?;

        let files = storage.list_context_files(dir.path())?;
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].description, "handwritten");
        Ok(())
    }

    #[test]
    fn test_missing_dir_lists_nothing() -> ContextResult<()> {
        let dir = tempfile::tempdir()?;
        let Some(storage) = storage() else {
            panic!("storage init failed");
        };
        assert!(storage.list_context_files(dir.path())?.is_empty());
        assert!(storage.most_recent_context(dir.path())?.is_none());
        Ok(())
    }

    #[test]
    fn test_find_unknown_context() -> ContextResult<()> {
        let dir = tempfile::tempdir()?;
        let Some(storage) = storage() else {
            panic!("storage init failed");
        };
        storage.save_summary_at(dir.path(), "s", &metadata("one"), at(1, 2))?;

        assert!(storage.find_context(dir.path(), "20260307-0102 - one.md").is_ok());
        assert!(matches!(
            storage.find_context(dir.path(), "nope.md"),
            Err(ContextError::ContextNotFound(_))
        ));
        Ok(())
    }
}
