//! Configuration for the context subsystem.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::context::core::errors::{ContextError, ContextResult};

/// Default Anthropic model used when none is configured.
pub const DEFAULT_ANTHROPIC_MODEL: &str = "claude-sonnet-4-20250514";
/// Default Ollama model used when none is configured.
pub const DEFAULT_OLLAMA_MODEL: &str = "ministral-3:8b-instruct-2512-q8_0";
/// Default Anthropic API base URL.
pub const DEFAULT_ANTHROPIC_BASE_URL: &str = "https://api.anthropic.com";

/// Top-level configuration for the context manager.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ContextConfig {
    /// Chunking settings.
    pub chunking: ChunkingConfig,
    /// Summary reduction settings.
    pub summary: SummaryConfig,
    /// Generation call pacing.
    pub schedule: ScheduleConfig,
    /// Generation backend settings.
    pub llm: LlmConfig,
    /// Storage settings.
    pub storage: StorageConfig,
}

impl ContextConfig {
    /// Load configuration from an optional JSON file, then apply the overrides
    /// `lookup` returns (usually the process environment).
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or parsed, or if validation fails.
    pub fn load<F>(path: Option<&Path>, lookup: F) -> ContextResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_overrides(lookup)?;
        config.validate()?;
        Ok(config)
    }

    /// Read a JSON configuration file. Missing sections fall back to defaults.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or is not valid JSON.
    pub fn from_file(path: &Path) -> ContextResult<Self> {
        let raw = std::fs::read_to_string(path)?;
        let config = serde_json::from_str(&raw)?;
        Ok(config)
    }

    /// Apply `CONTEXT_MANAGER_*` and `ANTHROPIC_*` overrides read through `lookup`.
    ///
    /// # Errors
    /// Returns an error if a numeric or provider override cannot be parsed.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> ContextResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(provider) = lookup("CONTEXT_MANAGER_PROVIDER") {
            self.llm.provider = provider.parse().map_err(|value| {
                ContextError::InvalidConfig(format!("unknown provider: {value}"))
            })?;
        }

        if let Some(model) = lookup("CONTEXT_MANAGER_MODEL") {
            self.llm.model = Some(model);
        }

        match self.llm.provider {
            LlmProvider::Anthropic => {
                if let Some(key) = lookup("ANTHROPIC_API_KEY") {
                    self.llm.api_key = Some(key);
                }
                if let Some(url) = lookup("ANTHROPIC_BASE_URL") {
                    self.llm.base_url = Some(url);
                }
            }
            LlmProvider::Ollama => {
                if let Some(url) = lookup("CONTEXT_MANAGER_OLLAMA_URL") {
                    self.llm.base_url = Some(url);
                }
            }
        }

        if let Some(value) = lookup("CONTEXT_MANAGER_MAX_TOKENS_PER_CHUNK") {
            self.chunking.max_tokens_per_chunk = parse_number(&value, "max_tokens_per_chunk")?;
        }
        if let Some(value) = lookup("CONTEXT_MANAGER_TARGET_SUMMARY_TOKENS") {
            self.summary.target_summary_tokens = parse_number(&value, "target_summary_tokens")?;
        }
        if let Some(value) = lookup("CONTEXT_MANAGER_MAX_OUTPUT_TOKENS") {
            self.summary.max_output_tokens = parse_number(&value, "max_output_tokens")?;
        }
        if let Some(value) = lookup("CONTEXT_MANAGER_DELAY_MS") {
            self.schedule.inter_call_delay_ms = parse_number(&value, "inter_call_delay_ms")?;
        }

        Ok(())
    }

    /// Validate configuration invariants.
    ///
    /// # Errors
    /// Returns an error if any values are out of range or invalid.
    pub fn validate(&self) -> ContextResult<()> {
        if self.chunking.max_tokens_per_chunk == 0 {
            return Err(ContextError::InvalidConfig(
                "chunking.max_tokens_per_chunk must be > 0".to_string(),
            ));
        }

        if self.summary.target_summary_tokens == 0 {
            return Err(ContextError::InvalidConfig(
                "summary.target_summary_tokens must be > 0".to_string(),
            ));
        }

        if self.summary.max_output_tokens == 0 {
            return Err(ContextError::InvalidConfig(
                "summary.max_output_tokens must be > 0".to_string(),
            ));
        }

        if self.schedule.max_concurrent_calls == 0 {
            return Err(ContextError::InvalidConfig(
                "schedule.max_concurrent_calls must be > 0".to_string(),
            ));
        }

        if self.storage.context_dir.as_os_str().is_empty() {
            return Err(ContextError::InvalidConfig(
                "storage.context_dir must not be empty".to_string(),
            ));
        }

        if let Some(base_url) = &self.llm.base_url {
            Url::parse(base_url)?;
        }

        Ok(())
    }
}

fn parse_number<T: FromStr>(value: &str, field: &str) -> ContextResult<T> {
    value
        .trim()
        .parse()
        .map_err(|_| ContextError::InvalidConfig(format!("{field} must be a number, got {value:?}")))
}

/// Chunking settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingConfig {
    /// Ceiling on the estimated tokens of one chunk.
    pub max_tokens_per_chunk: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            max_tokens_per_chunk: 6000,
        }
    }
}

/// Summary reduction settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct SummaryConfig {
    /// Aggregate estimate under which the final merge happens.
    pub target_summary_tokens: usize,
    /// Output ceiling passed to every generation call.
    pub max_output_tokens: u64,
}

impl Default for SummaryConfig {
    fn default() -> Self {
        Self {
            target_summary_tokens: 5000,
            max_output_tokens: 4096,
        }
    }
}

/// Pacing of generation calls.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ScheduleConfig {
    /// Calls allowed in flight at once.
    pub max_concurrent_calls: usize,
    /// Pause between consecutive calls, in milliseconds.
    pub inter_call_delay_ms: u64,
}

impl ScheduleConfig {
    /// Pause between consecutive calls.
    #[must_use]
    pub const fn inter_call_delay(&self) -> Duration {
        Duration::from_millis(self.inter_call_delay_ms)
    }
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            max_concurrent_calls: 1,
            inter_call_delay_ms: 500,
        }
    }
}

/// Generation backend selector.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LlmProvider {
    /// Anthropic Messages API.
    #[default]
    Anthropic,
    /// Local or remote Ollama through Rig.
    Ollama,
}

impl LlmProvider {
    /// Stable string form.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Anthropic => "anthropic",
            Self::Ollama => "ollama",
        }
    }
}

impl fmt::Display for LlmProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for LlmProvider {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "anthropic" => Ok(Self::Anthropic),
            "ollama" => Ok(Self::Ollama),
            _ => Err(value.to_string()),
        }
    }
}

/// Generation backend settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Which backend serves generation calls.
    pub provider: LlmProvider,
    /// Model name; the provider default is used when unset.
    pub model: Option<String>,
    /// Temperature for generation.
    pub temperature: f64,
    /// Optional custom base URL.
    pub base_url: Option<String>,
    /// API key for hosted providers.
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    /// HTTP timeout for a single generation call, in seconds.
    pub request_timeout_secs: u64,
}

impl LlmConfig {
    /// Model name to use for the configured provider.
    #[must_use]
    pub fn resolved_model(&self) -> &str {
        self.model.as_deref().unwrap_or(match self.provider {
            LlmProvider::Anthropic => DEFAULT_ANTHROPIC_MODEL,
            LlmProvider::Ollama => DEFAULT_OLLAMA_MODEL,
        })
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: LlmProvider::default(),
            model: None,
            temperature: 0.3,
            base_url: None,
            api_key: None,
            request_timeout_secs: 120,
        }
    }
}

/// Storage configuration for saved contexts.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Context directory, relative to the project root.
    pub context_dir: PathBuf,
    /// Run ledger database file name inside the context directory.
    pub sqlite_file: String,
    /// Run ledger table name.
    pub runs_table: String,
}

impl StorageConfig {
    /// Absolute context directory for a project.
    #[must_use]
    pub fn context_dir_for(&self, project_root: &Path) -> PathBuf {
        project_root.join(&self.context_dir)
    }

    /// Run ledger database path for a project.
    #[must_use]
    pub fn sqlite_path_for(&self, project_root: &Path) -> PathBuf {
        self.context_dir_for(project_root).join(&self.sqlite_file)
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            context_dir: PathBuf::from(".claude").join("context"),
            sqlite_file: "runs.sqlite".to_string(),
            runs_table: "context_runs".to_string(),
        }
    }
}
