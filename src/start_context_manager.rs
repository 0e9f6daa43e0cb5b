//! Command-line entry point for the context manager.
//!
//! Progress and results go to stdout; logs go to stderr so hook responses
//! stay machine-readable.

use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::Context;
use clap::{Parser, Subcommand};

use crate::context::core::config::{ContextConfig, LlmProvider};
use crate::context::engine::{ContextArchive, ContextBackends, ContextEngine};
use crate::context::hooks::{
    HookResponseOptions, HookType, StopInput, create_hook_response, stop_summary_message,
};
use crate::context::storage::context_files::compression_ratio;

/// Recursive conversation summarizer.
#[derive(Debug, Parser)]
#[command(name = "context-manager", version, about)]
pub struct Cli {
    /// JSON configuration file.
    #[arg(long, global = true, env = "CONTEXT_MANAGER_CONFIG")]
    pub config: Option<PathBuf>,
    /// Generation backend (`anthropic` or `ollama`).
    #[arg(long, global = true)]
    pub provider: Option<LlmProvider>,
    /// Model name for the selected backend.
    #[arg(long, global = true)]
    pub model: Option<String>,
    /// Command to run.
    #[command(subcommand)]
    pub command: Command,
}

/// Subcommands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Summarize a conversation file and save it under the project's context directory.
    Save {
        /// Transcript with `user:` / `assistant:` / `system:` markers.
        conversation_file: PathBuf,
        /// Short description used in the file name and header.
        description: String,
        /// Project root (defaults to the current directory).
        project_root: Option<PathBuf>,
        /// Host session to record the run under.
        #[arg(long, env = "CONTEXT_MANAGER_SESSION_ID")]
        session_id: Option<String>,
    },
    /// Print a saved context (the most recent one by default).
    Restore {
        /// Exact file name to load.
        filename: Option<String>,
    },
    /// List saved contexts, newest first.
    List,
    /// Answer a host hook; the payload is read from stdin.
    Hook {
        /// Event name, e.g. `stop` or `session-start`.
        event: String,
    },
}

/// Parse the command line and run it.
///
/// # Returns
/// `ExitCode::SUCCESS` on success, `1` on failure.
#[must_use]
pub fn run() -> ExitCode {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let rt = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            tracing::error!("Failed to create runtime: {e}");
            return ExitCode::from(1);
        }
    };

    match rt.block_on(execute(cli)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("\nError: {e:#}");
            ExitCode::from(1)
        }
    }
}

/// Load the configuration: defaults, then the file, then the environment, then CLI flags.
///
/// # Errors
/// Returns an error if the file cannot be read or the result is invalid.
pub fn load_config(cli: &Cli) -> anyhow::Result<ContextConfig> {
    let provider = cli.provider.map(|p| p.as_str().to_string());
    let model = cli.model.clone();
    let config = ContextConfig::load(cli.config.as_deref(), |key| match key {
        "CONTEXT_MANAGER_PROVIDER" => provider.clone().or_else(|| std::env::var(key).ok()),
        "CONTEXT_MANAGER_MODEL" => model.clone().or_else(|| std::env::var(key).ok()),
        _ => std::env::var(key).ok(),
    })
    .context("loading configuration")?;
    Ok(config)
}

async fn execute(cli: Cli) -> anyhow::Result<()> {
    let config = load_config(&cli)?;
    let cwd = std::env::current_dir().context("resolving current directory")?;

    match cli.command {
        Command::Save {
            conversation_file,
            description,
            project_root,
            session_id,
        } => {
            let project_root = project_root.unwrap_or(cwd);
            save(
                config,
                &conversation_file,
                &description,
                &project_root,
                session_id.as_deref(),
            )
            .await
        }
        Command::Restore { filename } => restore(&config, &cwd, filename.as_deref()),
        Command::List => list(&config, &cwd),
        Command::Hook { event } => hook(&config, &HookType::from(event.as_str())).await,
    }
}

async fn save(
    config: ContextConfig,
    conversation_file: &Path,
    description: &str,
    project_root: &Path,
    session_id: Option<&str>,
) -> anyhow::Result<()> {
    println!("Starting context save...\n");

    let conversation = std::fs::read_to_string(conversation_file).with_context(|| {
        format!("conversation file not found: {}", conversation_file.display())
    })?;

    let backends = ContextBackends::from_config(&config, project_root).await?;
    let engine = ContextEngine::new(config, backends)?;

    let progress = |line: &str| println!("   {line}");
    let outcome = engine
        .save(&conversation, description, project_root, session_id, Some(&progress))
        .await?;

    println!("\nSummarization complete!");
    println!("   Messages: {}", outcome.message_count);
    println!("   Chunks: {}", outcome.chunk_count);
    println!("   Summary tokens: {}", outcome.summary_tokens);
    println!(
        "   Compression: {}",
        compression_ratio(outcome.original_tokens, outcome.summary_tokens)
    );
    println!("\nSaved to: {}\n", outcome.path.display());
    Ok(())
}

fn restore(config: &ContextConfig, project_root: &Path, filename: Option<&str>) -> anyhow::Result<()> {
    let archive = ContextArchive::new(&config.storage)?;
    let Some(restored) = archive.restore(project_root, filename)? else {
        println!("No saved context files found.\n");
        return Ok(());
    };

    let rule = "-".repeat(80);
    println!("\nLoading context: {}\n", restored.file.filename);
    println!("{rule}");
    println!("{}", restored.content);
    println!("{rule}");
    Ok(())
}

fn list(config: &ContextConfig, project_root: &Path) -> anyhow::Result<()> {
    let files = ContextArchive::new(&config.storage)?.list(project_root)?;
    if files.is_empty() {
        println!("No saved context files found.\n");
        return Ok(());
    }

    println!("\nAvailable context files ({}):\n", files.len());
    for (index, file) in files.iter().enumerate() {
        println!("{}. {}", index + 1, file.filename);
        println!("   {}", file.timestamp.format("%Y-%m-%d %H:%M"));
        println!("   {}\n", file.description);
    }
    Ok(())
}

async fn hook(config: &ContextConfig, hook: &HookType) -> anyhow::Result<()> {
    let mut raw = String::new();
    std::io::stdin()
        .read_to_string(&mut raw)
        .context("reading hook payload")?;

    let input: Option<StopInput> = serde_json::from_str(&raw).ok();
    let project_root = input
        .as_ref()
        .map_or_else(|| std::env::current_dir().unwrap_or_default(), |i| PathBuf::from(&i.cwd));

    let (success, options) = match hook {
        HookType::Stop => stop_options(config, input.as_ref(), &project_root).await,
        HookType::SessionStart => session_start_options(config, &project_root),
        _ => (true, HookResponseOptions::default()),
    };

    println!("{}", create_hook_response(hook, success, &options)?);
    Ok(())
}

async fn stop_options(
    config: &ContextConfig,
    input: Option<&StopInput>,
    project_root: &Path,
) -> (bool, HookResponseOptions) {
    let Some(input) = input else {
        tracing::warn!("Stop hook called without a valid payload");
        return (false, HookResponseOptions::default());
    };

    let stats = match ContextArchive::new(&config.storage) {
        Ok(archive) => archive.session_stats(project_root, &input.session_id).await,
        Err(e) => Err(e),
    };

    match stats {
        Ok(stats) => {
            tracing::debug!(session_id = %input.session_id, runs = stats.runs, "Stop hook");
            (
                true,
                HookResponseOptions {
                    reason: None,
                    context: Some(stop_summary_message(stats.runs)),
                },
            )
        }
        Err(e) => {
            tracing::warn!(error = %e, "Failed to read run ledger");
            (false, HookResponseOptions::default())
        }
    }
}

fn session_start_options(config: &ContextConfig, project_root: &Path) -> (bool, HookResponseOptions) {
    let latest = ContextArchive::new(&config.storage)
        .and_then(|archive| archive.restore(project_root, None));

    match latest {
        Ok(restored) => (
            true,
            HookResponseOptions {
                reason: None,
                context: restored.map(|r| r.content),
            },
        ),
        Err(e) => {
            tracing::warn!(error = %e, "Failed to load latest context");
            (false, HookResponseOptions::default())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::core::ids::RunId;
    use crate::context::storage::context_files::{ContextStorage, SummaryMetadata};
    use crate::context::storage::run_store::{RunRecord, RunStore, SqliteRunStore};

    #[test]
    fn test_cli_parses_save() {
        let cli = Cli::try_parse_from([
            "context-manager",
            "--provider",
            "ollama",
            "save",
            "/tmp/conv.txt",
            "Feature work",
            "/tmp/project",
        ]);
        let Ok(cli) = cli else {
            panic!("save command should parse");
        };
        assert_eq!(cli.provider, Some(LlmProvider::Ollama));
        assert!(matches!(
            cli.command,
            Command::Save { ref description, ref project_root, .. }
                if description == "Feature work" && project_root.as_deref() == Some(Path::new("/tmp/project"))
        ));
    }

    #[test]
    fn test_cli_parses_restore_and_hook() {
        let restore = Cli::try_parse_from(["context-manager", "restore"]);
        assert!(matches!(restore, Ok(Cli { command: Command::Restore { filename: None }, .. })));

        let hook = Cli::try_parse_from(["context-manager", "hook", "session-start", "--model", "m"]);
        let Ok(hook) = hook else {
            panic!("hook command should parse");
        };
        assert_eq!(hook.model.as_deref(), Some("m"));
        assert!(matches!(hook.command, Command::Hook { ref event } if event == "session-start"));
    }

    #[test]
    fn test_cli_flags_override_config_file() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"chunking": {"max_tokens_per_chunk": 1234}}"#)?;
        let path_arg = path.to_string_lossy().into_owned();

        let cli = Cli::try_parse_from([
            "context-manager",
            "--config",
            path_arg.as_str(),
            "--provider",
            "ollama",
            "--model",
            "tiny",
            "list",
        ])?;
        let config = load_config(&cli)?;

        assert_eq!(config.chunking.max_tokens_per_chunk, 1234);
        assert_eq!(config.llm.provider, LlmProvider::Ollama);
        assert_eq!(config.llm.resolved_model(), "tiny");
        Ok(())
    }

    #[test]
    fn test_cli_parses_session_id() {
        let cli = Cli::try_parse_from([
            "context-manager",
            "save",
            "conv.txt",
            "Work",
            "--session-id",
            "abc-123",
        ]);
        assert!(matches!(
            cli,
            Ok(Cli { command: Command::Save { ref session_id, .. }, .. })
                if session_id.as_deref() == Some("abc-123")
        ));
    }

    #[test]
    fn test_session_start_without_contexts() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let (success, options) = session_start_options(&ContextConfig::default(), dir.path());
        assert!(success);
        assert!(options.context.is_none());
        Ok(())
    }

    #[test]
    fn test_session_start_injects_latest_context() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let config = ContextConfig::default();
        let metadata = SummaryMetadata {
            description: "Earlier work".to_string(),
            message_count: 4,
            original_tokens: 400,
            summary_tokens: 40,
        };
        ContextStorage::new(&config.storage)?.save_summary(dir.path(), "- parser done", &metadata)?;

        let (success, options) = session_start_options(&config, dir.path());
        assert!(success);
        assert!(options.context.is_some_and(|c| c.contains("- parser done")));
        Ok(())
    }

    #[tokio::test]
    async fn test_stop_reports_zero_runs_and_leaves_project_untouched() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let input = StopInput {
            session_id: "s".to_string(),
            cwd: dir.path().to_string_lossy().into_owned(),
        };
        let (success, options) =
            stop_options(&ContextConfig::default(), Some(&input), dir.path()).await;
        assert!(success);
        assert_eq!(options.context.as_deref(), Some("context-manager: Session summarized"));
        assert!(std::fs::read_dir(dir.path())?.next().is_none());
        Ok(())
    }

    #[tokio::test]
    async fn test_stop_counts_only_this_session() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let config = ContextConfig::default();
        std::fs::create_dir_all(config.storage.context_dir_for(dir.path()))?;
        let store = SqliteRunStore::open(
            &config.storage.sqlite_path_for(dir.path()),
            &config.storage.runs_table,
        )
        .await?;
        for session in ["mine", "mine", "theirs"] {
            store
                .record_run(RunRecord {
                    id: RunId::new(),
                    session_id: Some(session.to_string()),
                    project_root: dir.path().to_path_buf(),
                    description: "run".to_string(),
                    file_path: dir.path().join("x.md"),
                    message_count: 2,
                    chunk_count: 1,
                    original_tokens: 10,
                    summary_tokens: 1,
                    created_at: chrono::Utc::now(),
                })
                .await?;
        }

        let input = StopInput {
            session_id: "mine".to_string(),
            cwd: dir.path().to_string_lossy().into_owned(),
        };
        let (success, options) = stop_options(&config, Some(&input), dir.path()).await;
        assert!(success);
        assert_eq!(
            options.context.as_deref(),
            Some("context-manager: Session summarized | 2 summaries saved")
        );
        Ok(())
    }
}
