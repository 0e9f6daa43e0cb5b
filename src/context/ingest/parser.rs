//! Plain-text transcript parsing.
//!
//! A transcript is a sequence of lines where `user:`, `assistant:` or
//! `system:` at the start of a line (any case) opens a new message. Every
//! following line belongs to that message until the next marker.

use regex::Regex;
use tracing::debug;

use crate::context::ingest::message::{Message, Role};

/// Line-oriented parser for role-tagged transcripts.
pub struct ConversationParser {
    role_marker: Regex,
}

impl ConversationParser {
    /// Create a parser.
    ///
    /// # Errors
    /// Returns an error if the role marker pattern is invalid.
    pub fn new() -> Result<Self, regex::Error> {
        Ok(Self {
            role_marker: Regex::new(r"(?i)^(user|assistant|system):")?,
        })
    }

    /// Parse raw transcript text into ordered messages.
    ///
    /// Never fails: text without any role marker yields an empty vector, lines
    /// before the first marker are discarded, and messages whose trimmed
    /// content is empty are dropped.
    #[must_use]
    pub fn parse(&self, text: &str) -> Vec<Message> {
        let mut messages = Vec::new();
        let mut current: Option<(Role, Vec<&str>)> = None;

        for raw_line in text.split('\n') {
            let line = raw_line.strip_suffix('\r').unwrap_or(raw_line);

            let marker = self
                .role_marker
                .captures(line)
                .and_then(|caps| Some((caps.get(0)?.end(), caps.get(1)?.as_str().parse().ok()?)));

            match marker {
                Some((marker_end, role)) => {
                    if let Some((role, lines)) = current.take() {
                        push_message(&mut messages, role, &lines);
                    }
                    current = Some((role, vec![line[marker_end..].trim()]));
                }
                None => {
                    if let Some((_, lines)) = current.as_mut() {
                        lines.push(line);
                    }
                }
            }
        }

        if let Some((role, lines)) = current {
            push_message(&mut messages, role, &lines);
        }

        debug!(count = messages.len(), "Parsed conversation");
        messages
    }
}

fn push_message(messages: &mut Vec<Message>, role: Role, lines: &[&str]) {
    let content = lines.join("\n").trim().to_string();
    if !content.is_empty() {
        messages.push(Message::new(role, content));
    }
}
