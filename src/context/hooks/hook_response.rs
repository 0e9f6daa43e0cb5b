//! Hook responses in the host's JSON shape.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::context::core::errors::ContextResult;

const TOOL_NAME: &str = "context-manager";

/// Host lifecycle event.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum HookType {
    /// Before the host compacts its context window.
    PreCompact,
    /// New or resumed session.
    SessionStart,
    /// User submitted a prompt.
    UserPromptSubmit,
    /// A tool call finished.
    PostToolUse,
    /// Session is stopping.
    Stop,
    /// Any event this crate has no specific rule for.
    Other(String),
}

impl HookType {
    /// Event name as the host spells it.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::PreCompact => "PreCompact",
            Self::SessionStart => "SessionStart",
            Self::UserPromptSubmit => "UserPromptSubmit",
            Self::PostToolUse => "PostToolUse",
            Self::Stop => "Stop",
            Self::Other(name) => name,
        }
    }
}

impl fmt::Display for HookType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&str> for HookType {
    /// Accepts `PreCompact`, `pre-compact`, `pre_compact` and similar spellings.
    fn from(name: &str) -> Self {
        let folded: String = name
            .chars()
            .filter(|c| *c != '-' && *c != '_')
            .flat_map(char::to_lowercase)
            .collect();
        match folded.as_str() {
            "precompact" => Self::PreCompact,
            "sessionstart" => Self::SessionStart,
            "userpromptsubmit" => Self::UserPromptSubmit,
            "posttooluse" => Self::PostToolUse,
            "stop" => Self::Stop,
            _ => Self::Other(name.to_string()),
        }
    }
}

impl FromStr for HookType {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::from(s))
    }
}

/// Optional inputs to [`build_hook_response`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct HookResponseOptions {
    /// Stop reason on failure.
    pub reason: Option<String>,
    /// Extra context for the host to inject.
    pub context: Option<String>,
}

/// Event-specific payload.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HookSpecificOutput {
    /// Event this output belongs to.
    pub hook_event_name: String,
    /// Text the host adds to the model context.
    pub additional_context: String,
}

/// Response printed to stdout for the host.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HookResponse {
    /// Whether the host should carry on.
    #[serde(rename = "continue", skip_serializing_if = "Option::is_none")]
    pub continue_: Option<bool>,
    /// Hide the hook's stdout from the transcript.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suppress_output: Option<bool>,
    /// Why the host should stop.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop_reason: Option<String>,
    /// Event-specific payload.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hook_specific_output: Option<HookSpecificOutput>,
}

impl HookResponse {
    fn proceed() -> Self {
        Self {
            continue_: Some(true),
            suppress_output: Some(true),
            ..Self::default()
        }
    }

    fn with_context(mut self, hook: &HookType, context: impl Into<String>) -> Self {
        self.hook_specific_output = Some(HookSpecificOutput {
            hook_event_name: hook.as_str().to_string(),
            additional_context: context.into(),
        });
        self
    }

    /// Serialize to the JSON line the host reads.
    ///
    /// # Errors
    /// Returns an error if serialization fails.
    pub fn to_json(&self) -> ContextResult<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Payload the host sends to the `Stop` hook.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct StopInput {
    /// Host session id.
    pub session_id: String,
    /// Working directory of the session.
    pub cwd: String,
}

/// Build the response for `hook`.
#[must_use]
pub fn build_hook_response(
    hook: &HookType,
    success: bool,
    options: &HookResponseOptions,
) -> HookResponse {
    match hook {
        HookType::PreCompact if success => HookResponse::proceed(),
        HookType::PreCompact => HookResponse {
            continue_: Some(false),
            suppress_output: Some(true),
            stop_reason: Some(
                options
                    .reason
                    .clone()
                    .unwrap_or_else(|| "Pre-compact operation failed".to_string()),
            ),
            hook_specific_output: None,
        },
        HookType::SessionStart => match options.context.as_deref() {
            Some(context) if success && !context.is_empty() => {
                HookResponse::proceed().with_context(hook, context)
            }
            _ => HookResponse::proceed(),
        },
        HookType::UserPromptSubmit => HookResponse::proceed().with_context(
            hook,
            status_line(success, "Prompt tracked", "Tracking failed"),
        ),
        HookType::PostToolUse => HookResponse::proceed().with_context(
            hook,
            status_line(success, "Tool observation saved", "Save failed"),
        ),
        HookType::Stop => {
            let context = match options.context.as_deref() {
                Some(context) if success => context.to_string(),
                _ => status_line(success, "Session summarized", "Summary failed"),
            };
            HookResponse::proceed().with_context(hook, context)
        }
        HookType::Other(_) => HookResponse {
            continue_: Some(success),
            suppress_output: Some(true),
            stop_reason: if success { None } else { options.reason.clone() },
            hook_specific_output: None,
        },
    }
}

/// Build and serialize in one step.
///
/// # Errors
/// Returns an error if serialization fails.
pub fn create_hook_response(
    hook: &HookType,
    success: bool,
    options: &HookResponseOptions,
) -> ContextResult<String> {
    build_hook_response(hook, success, options).to_json()
}

/// Context line for the `Stop` hook given the number of saved summaries.
#[must_use]
pub fn stop_summary_message(saved_summaries: u64) -> String {
    if saved_summaries > 0 {
        format!("{TOOL_NAME}: Session summarized | {saved_summaries} summaries saved")
    } else {
        format!("{TOOL_NAME}: Session summarized")
    }
}

fn status_line(success: bool, ok: &str, failed: &str) -> String {
    if success {
        format!("{TOOL_NAME}: {ok}")
    } else {
        format!("{TOOL_NAME}: {failed}")
    }
}
