//! Factory Droid adapter
//!
//! Reads session logs from `~/.factory/sessions/<workspaceSlug>/<uuid>.jsonl`
//! with a companion `<uuid>.settings.json`. Events are `session_start`,
//! `message` (claude-style content blocks), `todo_state` (free-text numbered
//! todo lines), and `compaction_state`.
//!
//! The externally visible session identifier is the composite
//! `"<slug>:<uuid>"`; a bare uuid is accepted and resolved by search. The
//! settings file is an optional companion: reading it degrades gracefully.

use crate::adapters::util::{
    self, normalize_role, parse_timestamp_str, paths_equal, value_to_text, CaptureBuilder,
};
use crate::adapters::Adapter;
use crate::error::{Error, Result};
use crate::registry::{storage_root, Platform};
use crate::types::{Agent, CapturedSession, Role, SessionInfo};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

/// Adapter for Factory Droid session storage.
pub struct DroidAdapter {
    root: Option<PathBuf>,
}

impl DroidAdapter {
    /// Create an adapter rooted at the default storage path (~/.factory).
    pub fn new() -> Self {
        Self {
            root: storage_root(Agent::Droid, Platform::current()),
        }
    }

    /// Create an adapter with a custom root path (for testing).
    pub fn with_root(root: PathBuf) -> Self {
        Self { root: Some(root) }
    }

    /// `(slug, uuid, log path)` for every session file.
    fn session_files(&self) -> Vec<(String, String, PathBuf)> {
        let Some(ref root) = self.root else {
            return Vec::new();
        };
        let pattern = root.join("sessions/*/*.jsonl");
        let mut files = Vec::new();
        if let Ok(entries) = glob::glob(&pattern.to_string_lossy()) {
            for path in entries.flatten() {
                let Some(uuid) = path.file_stem().and_then(|s| s.to_str()) else {
                    continue;
                };
                // settings companions share the directory; only real logs count
                if uuid.ends_with(".settings") {
                    continue;
                }
                let Some(slug) = path
                    .parent()
                    .and_then(|p| p.file_name())
                    .and_then(|n| n.to_str())
                else {
                    continue;
                };
                files.push((slug.to_string(), uuid.to_string(), path.clone()));
            }
        }
        files
    }

    /// Resolve `"<slug>:<uuid>"` (or a bare uuid) to a session file.
    fn find_session_file(&self, session_id: &str) -> Option<(String, String, PathBuf)> {
        let (slug, uuid) = match session_id.split_once(':') {
            Some((slug, uuid)) => (Some(slug), uuid),
            None => (None, session_id),
        };
        self.session_files()
            .into_iter()
            .find(|(s, u, _)| u == uuid && slug.map(|wanted| wanted == s).unwrap_or(true))
    }
}

impl Default for DroidAdapter {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================
// Raw JSONL record types (serde deserialization)
// ============================================

#[derive(Debug, Deserialize, Default)]
#[serde(default, rename_all = "camelCase")]
struct RawEvent {
    #[serde(rename = "type")]
    event_type: Option<String>,
    timestamp: Option<String>,
    cwd: Option<String>,
    message: Option<RawMessage>,
    todos: Option<String>,
    content: Option<String>,
    summary: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct RawMessage {
    role: Option<String>,
    content: Option<RawContent>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawContent {
    Text(String),
    Blocks(Vec<ContentBlock>),
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum ContentBlock {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(rename = "thinking")]
    Thinking { thinking: String },
    #[serde(rename = "tool_use")]
    ToolUse {
        name: String,
        input: serde_json::Value,
    },
    #[serde(rename = "tool_result")]
    ToolResult {
        #[serde(default)]
        content: serde_json::Value,
    },
    #[serde(other)]
    Unknown,
}

/// Optional `<uuid>.settings.json` companion.
#[derive(Debug, Deserialize, Default)]
#[serde(default, rename_all = "camelCase")]
struct SessionSettings {
    cwd: Option<String>,
    title: Option<String>,
}

fn read_settings(log_path: &Path) -> SessionSettings {
    let Some(stem) = log_path.file_stem().and_then(|s| s.to_str()) else {
        return SessionSettings::default();
    };
    let settings_path = log_path.with_file_name(format!("{}.settings.json", stem));
    std::fs::read_to_string(settings_path)
        .ok()
        .and_then(|content| serde_json::from_str(&content).ok())
        .unwrap_or_default()
}

// ============================================
// Todo-state parsing
// ============================================

/// Parsed task lists from one `todo_state` event.
#[derive(Debug, Default, PartialEq)]
struct TodoState {
    completed: Vec<String>,
    remaining: Vec<String>,
    in_progress: Option<String>,
}

/// Parse free-text numbered todo lines of the form `"1. [status] text"`.
///
/// Statuses: `completed`/`done` finish a task, `in_progress`/`in-progress`
/// marks the active one (which still counts as remaining), `pending` is
/// remaining. Lines that do not match the shape are ignored.
fn parse_todo_lines(text: &str) -> TodoState {
    let mut state = TodoState::default();

    for line in text.lines() {
        let trimmed = line.trim();
        let Some(rest) = trimmed
            .split_once('.')
            .filter(|(num, _)| num.chars().all(|c| c.is_ascii_digit()) && !num.is_empty())
            .map(|(_, rest)| rest.trim())
        else {
            continue;
        };
        let Some(status_end) = rest.starts_with('[').then(|| rest.find(']')).flatten() else {
            continue;
        };
        let status = rest[1..status_end].trim().to_lowercase();
        let task = rest[status_end + 1..].trim();
        if task.is_empty() {
            continue;
        }

        match status.as_str() {
            "completed" | "done" => state.completed.push(task.to_string()),
            "in_progress" | "in-progress" => {
                state.in_progress = Some(task.to_string());
                state.remaining.push(task.to_string());
            }
            "pending" => state.remaining.push(task.to_string()),
            _ => {}
        }
    }

    state
}

#[derive(Debug, Default)]
struct FileSummary {
    message_count: usize,
    first_timestamp: Option<DateTime<Utc>>,
    last_timestamp: Option<DateTime<Utc>>,
    cwd: Option<String>,
    preview: Option<String>,
}

fn summarize_file(path: &Path) -> Option<FileSummary> {
    let file = File::open(path).ok()?;
    let mut summary = FileSummary::default();

    for line in BufReader::new(file).lines() {
        let Ok(line) = line else { break };
        if line.trim().is_empty() {
            continue;
        }
        let Ok(event) = serde_json::from_str::<RawEvent>(&line) else {
            continue;
        };
        let timestamp = event.timestamp.as_deref().and_then(parse_timestamp_str);
        if summary.first_timestamp.is_none() {
            summary.first_timestamp = timestamp;
        }
        if timestamp.is_some() {
            summary.last_timestamp = timestamp;
        }
        if summary.cwd.is_none() {
            summary.cwd = event.cwd.clone();
        }
        if event.event_type.as_deref() == Some("message") {
            summary.message_count += 1;
            if summary.preview.is_none() {
                if let Some(ref message) = event.message {
                    if message.role.as_deref() == Some("user") {
                        if let Some(RawContent::Text(ref text)) = message.content {
                            summary.preview = util::preview_text(text);
                        } else if let Some(RawContent::Blocks(ref blocks)) = message.content {
                            summary.preview = blocks
                                .iter()
                                .find_map(|b| match b {
                                    ContentBlock::Text { text } => util::preview_text(text),
                                    _ => None,
                                });
                        }
                    }
                }
            }
        }
    }

    Some(summary)
}

impl Adapter for DroidAdapter {
    fn agent(&self) -> Agent {
        Agent::Droid
    }

    fn detect(&self) -> bool {
        !self.session_files().is_empty()
    }

    fn list_sessions(&self, project: Option<&Path>) -> Result<Vec<SessionInfo>> {
        let mut sessions = Vec::new();

        for (slug, uuid, path) in self.session_files() {
            let Some(summary) = summarize_file(&path) else {
                tracing::debug!(path = %path.display(), "skipping unreadable session file");
                continue;
            };
            if summary.message_count == 0 {
                continue;
            }
            let settings = read_settings(&path);
            let cwd = summary.cwd.clone().or(settings.cwd);
            if let Some(project) = project {
                let matches = cwd
                    .as_deref()
                    .map(|c| paths_equal(Path::new(c), project))
                    .unwrap_or(false);
                if !matches {
                    continue;
                }
            }
            let last_active = summary.last_timestamp.or_else(|| {
                std::fs::metadata(&path)
                    .and_then(|m| m.modified())
                    .ok()
                    .map(DateTime::from)
            });

            sessions.push(SessionInfo {
                id: format!("{}:{}", slug, uuid),
                started_at: summary.first_timestamp,
                last_active_at: last_active,
                message_count: Some(summary.message_count),
                project_path: cwd.map(PathBuf::from),
                preview: summary.preview.or(settings.title),
            });
        }

        util::sort_sessions(&mut sessions);
        Ok(sessions)
    }

    fn capture(&self, session_id: &str) -> Result<CapturedSession> {
        let (slug, uuid, path) = self
            .find_session_file(session_id)
            .ok_or_else(|| Error::SessionNotFound(session_id.to_string()))?;

        let file = File::open(&path).map_err(|e| Error::ParseFailure {
            agent: Agent::Droid.to_string(),
            message: format!("failed to open {}: {}", path.display(), e),
        })?;

        let mut builder = CaptureBuilder::new(Agent::Droid, format!("{}:{}", slug, uuid));
        let settings = read_settings(&path);
        if let Some(cwd) = settings.cwd {
            builder.set_project_path(cwd);
        }

        let mut parsed_records = 0usize;
        let mut todo_state: Option<TodoState> = None;

        for line in BufReader::new(file).lines() {
            let Ok(line) = line else { break };
            if line.trim().is_empty() {
                continue;
            }
            let event: RawEvent = match serde_json::from_str(&line) {
                Ok(e) => e,
                Err(e) => {
                    tracing::debug!(error = %e, "skipping malformed session line");
                    continue;
                }
            };
            parsed_records += 1;

            let timestamp = event.timestamp.as_deref().and_then(parse_timestamp_str);
            builder.observe_timestamp(timestamp);
            if let Some(ref cwd) = event.cwd {
                builder.set_project_path(cwd);
            }

            match event.event_type.as_deref() {
                Some("session_start") => {}
                Some("message") => {
                    let Some(message) = event.message else {
                        continue;
                    };
                    let role = message
                        .role
                        .as_deref()
                        .map(normalize_role)
                        .unwrap_or(Role::Assistant);
                    match message.content {
                        Some(RawContent::Text(text)) => builder.push_text(role, &text, timestamp),
                        Some(RawContent::Blocks(blocks)) => {
                            for block in blocks {
                                match block {
                                    ContentBlock::Text { text } => {
                                        builder.push_text(role, &text, timestamp)
                                    }
                                    ContentBlock::Thinking { thinking } => {
                                        builder.push_thought(&thinking)
                                    }
                                    ContentBlock::ToolUse { name, input } => {
                                        builder.push_tool_use(&name, &input, timestamp)
                                    }
                                    ContentBlock::ToolResult { content } => builder
                                        .push_tool_result(
                                            None,
                                            value_to_text(&content),
                                            timestamp,
                                        ),
                                    ContentBlock::Unknown => {}
                                }
                            }
                        }
                        None => {}
                    }
                }
                Some("todo_state") => {
                    // latest todo snapshot wins wholesale
                    let text = event.todos.as_deref().or(event.content.as_deref());
                    if let Some(text) = text {
                        todo_state = Some(parse_todo_lines(text));
                    }
                }
                Some("compaction_state") => {
                    if let Some(ref summary) = event.summary {
                        builder.push_thought(summary);
                    }
                }
                _ => {}
            }
        }

        if parsed_records == 0 {
            return Err(Error::ParseFailure {
                agent: Agent::Droid.to_string(),
                message: format!("no parseable records in {}", path.display()),
            });
        }

        if let Some(todos) = todo_state {
            if let Some(ref current) = todos.in_progress {
                builder.set_in_progress(current);
            }
            builder.set_task_lists(todos.completed, todos.remaining);
        }

        builder.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_todo_lines() {
        let state = parse_todo_lines(
            "1. [in_progress] Fix auth bug\n2. [pending] Add tests\n3. [completed] Setup project",
        );
        assert_eq!(state.in_progress.as_deref(), Some("Fix auth bug"));
        assert_eq!(state.remaining, vec!["Fix auth bug", "Add tests"]);
        assert_eq!(state.completed, vec!["Setup project"]);
    }

    #[test]
    fn test_parse_todo_lines_accepts_done_and_dash() {
        let state = parse_todo_lines("1. [done] Ship it\n2. [in-progress] Polish\n");
        assert_eq!(state.completed, vec!["Ship it"]);
        assert_eq!(state.in_progress.as_deref(), Some("Polish"));
    }

    #[test]
    fn test_parse_todo_lines_ignores_garbage() {
        let state = parse_todo_lines("not a todo\n12 missing dot [pending] x\n3. no status\n");
        assert_eq!(state, TodoState::default());
    }
}
