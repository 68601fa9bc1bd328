//! Claude Code JSONL adapter
//!
//! Reads session logs from `~/.claude/projects/<encoded-path>/<sessionId>.jsonl`.
//! Each line is a user or assistant event whose message content is a list of
//! typed blocks (`text`, `tool_use`, `tool_result`, `thinking`). Token counts
//! come from the per-assistant-line usage object.
//!
//! Malformed lines are skipped with a debug log; only a file that yields no
//! parseable record at all is a [`Error::ParseFailure`].

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

/// Adapter for Claude Code session storage.
pub struct ClaudeCodeAdapter {
    root: Option<PathBuf>,
}

impl ClaudeCodeAdapter {
    /// Create an adapter rooted at the default storage path (~/.claude).
    pub fn new() -> Self {
        Self {
            root: storage_root(Agent::ClaudeCode, Platform::current()),
        }
    }

    /// Create an adapter with a custom root path (for testing).
    pub fn with_root(root: PathBuf) -> Self {
        Self { root: Some(root) }
    }

    /// All main-session log files (agent sidechain files are excluded).
    fn session_files(&self) -> Vec<PathBuf> {
        let Some(ref root) = self.root else {
            return Vec::new();
        };
        let pattern = root.join("projects/*/*.jsonl");
        let mut files = Vec::new();
        if let Ok(entries) = glob::glob(&pattern.to_string_lossy()) {
            for path in entries.flatten() {
                let stem = path
                    .file_stem()
                    .and_then(|s| s.to_str())
                    .unwrap_or_default();
                if !stem.starts_with("agent-") {
                    files.push(path);
                }
            }
        }
        files
    }

    fn find_session_file(&self, session_id: &str) -> Option<PathBuf> {
        self.session_files().into_iter().find(|p| {
            p.file_stem()
                .and_then(|s| s.to_str())
                .map(|s| s == session_id)
                .unwrap_or(false)
        })
    }
}

impl Default for ClaudeCodeAdapter {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================
// Raw JSONL record types (serde deserialization)
// ============================================

/// One line of a Claude Code session log.
///
/// Uses `#[serde(default)]` liberally so missing fields never fail a line.
#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
struct RawRecord {
    #[serde(rename = "type")]
    record_type: Option<String>,
    timestamp: Option<String>,
    cwd: Option<String>,
    is_sidechain: Option<bool>,
    message: Option<RawMessage>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct RawMessage {
    role: Option<String>,
    content: Option<RawContent>,
    usage: Option<RawUsage>,
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

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct RawUsage {
    input_tokens: Option<i64>,
    output_tokens: Option<i64>,
    cache_creation_input_tokens: Option<i64>,
}

/// Cheap per-file scan backing `list_sessions`.
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
        let Ok(record) = serde_json::from_str::<RawRecord>(&line) else {
            continue;
        };
        if record.is_sidechain.unwrap_or(false) {
            continue;
        }
        let is_message = matches!(record.record_type.as_deref(), Some("user" | "assistant"));
        if !is_message {
            continue;
        }
        summary.message_count += 1;

        let timestamp = record.timestamp.as_deref().and_then(parse_timestamp_str);
        if summary.first_timestamp.is_none() {
            summary.first_timestamp = timestamp;
        }
        if timestamp.is_some() {
            summary.last_timestamp = timestamp;
        }
        if summary.cwd.is_none() {
            summary.cwd = record.cwd.clone();
        }
        if summary.preview.is_none() && record.record_type.as_deref() == Some("user") {
            if let Some(text) = record.message.as_ref().and_then(first_text) {
                summary.preview = util::preview_text(&text);
            }
        }
    }

    Some(summary)
}

fn first_text(message: &RawMessage) -> Option<String> {
    match message.content.as_ref()? {
        RawContent::Text(s) => Some(s.clone()),
        RawContent::Blocks(blocks) => blocks.iter().find_map(|b| match b {
            ContentBlock::Text { text } => Some(text.clone()),
            _ => None,
        }),
    }
}

impl Adapter for ClaudeCodeAdapter {
    fn agent(&self) -> Agent {
        Agent::ClaudeCode
    }

    fn detect(&self) -> bool {
        self.root.as_ref().map(|r| r.exists()).unwrap_or(false)
            && !self.session_files().is_empty()
    }

    fn list_sessions(&self, project: Option<&Path>) -> Result<Vec<SessionInfo>> {
        let mut sessions = Vec::new();

        for path in self.session_files() {
            let Some(summary) = summarize_file(&path) else {
                tracing::debug!(path = %path.display(), "skipping unreadable session file");
                continue;
            };
            if summary.message_count == 0 {
                continue;
            }
            if let Some(project) = project {
                let matches = summary
                    .cwd
                    .as_ref()
                    .map(|cwd| paths_equal(Path::new(cwd), project))
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
                id: path
                    .file_stem()
                    .and_then(|s| s.to_str())
                    .unwrap_or_default()
                    .to_string(),
                started_at: summary.first_timestamp,
                last_active_at: last_active,
                message_count: Some(summary.message_count),
                project_path: summary.cwd.map(PathBuf::from),
                preview: summary.preview,
            });
        }

        util::sort_sessions(&mut sessions);
        Ok(sessions)
    }

    fn capture(&self, session_id: &str) -> Result<CapturedSession> {
        let path = self
            .find_session_file(session_id)
            .ok_or_else(|| Error::SessionNotFound(session_id.to_string()))?;

        let file = File::open(&path).map_err(|e| Error::ParseFailure {
            agent: Agent::ClaudeCode.to_string(),
            message: format!("failed to open {}: {}", path.display(), e),
        })?;

        let mut builder = CaptureBuilder::new(Agent::ClaudeCode, session_id);
        let mut parsed_records = 0usize;
        let mut skipped_lines = 0usize;

        for line in BufReader::new(file).lines() {
            let line = match line {
                Ok(l) => l,
                Err(e) => {
                    tracing::warn!(error = %e, "read error in session log");
                    break;
                }
            };
            if line.trim().is_empty() {
                continue;
            }
            let record: RawRecord = match serde_json::from_str(&line) {
                Ok(r) => r,
                Err(e) => {
                    skipped_lines += 1;
                    tracing::debug!(error = %e, "skipping malformed session line");
                    continue;
                }
            };
            parsed_records += 1;

            if record.is_sidechain.unwrap_or(false) {
                continue;
            }
            if let Some(ref cwd) = record.cwd {
                builder.set_project_path(cwd);
            }

            let timestamp = record.timestamp.as_deref().and_then(parse_timestamp_str);
            builder.observe_timestamp(timestamp);

            let Some(message) = record.message else {
                continue;
            };
            let role = message
                .role
                .as_deref()
                .or(record.record_type.as_deref())
                .map(normalize_role)
                .unwrap_or(Role::Assistant);

            if let Some(usage) = message.usage {
                builder.add_usage(
                    usage.input_tokens,
                    usage.output_tokens,
                    usage.cache_creation_input_tokens,
                );
            }

            match message.content {
                Some(RawContent::Text(text)) => builder.push_text(role, &text, timestamp),
                Some(RawContent::Blocks(blocks)) => {
                    for block in blocks {
                        match block {
                            ContentBlock::Text { text } => {
                                builder.push_text(role, &text, timestamp)
                            }
                            ContentBlock::Thinking { thinking } => builder.push_thought(&thinking),
                            ContentBlock::ToolUse { name, input } => {
                                builder.push_tool_use(&name, &input, timestamp)
                            }
                            ContentBlock::ToolResult { content } => {
                                builder.push_tool_result(None, value_to_text(&content), timestamp)
                            }
                            ContentBlock::Unknown => {}
                        }
                    }
                }
                None => {}
            }
        }

        if parsed_records == 0 {
            return Err(Error::ParseFailure {
                agent: Agent::ClaudeCode.to_string(),
                message: format!("no parseable records in {}", path.display()),
            });
        }
        if skipped_lines > 0 {
            tracing::warn!(
                skipped = skipped_lines,
                path = %path.display(),
                "skipped malformed lines during capture"
            );
        }

        builder.finish()
    }
}
