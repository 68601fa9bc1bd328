//! Codex CLI JSONL adapter
//!
//! Reads rollout logs from `~/.codex/sessions/YYYY/MM/DD/rollout-*.jsonl`.
//! Every line wraps a typed payload: `session_meta` carries the session id
//! and working directory, `response_item` carries messages, function calls
//! and reasoning, `event_msg` carries user/agent text and token counts.
//!
//! The block structure mirrors claude-code closely enough that this adapter
//! is mostly payload routing on top of the shared capture protocol.

use crate::adapters::util::{
    self, json_or_string, normalize_role, parse_timestamp_str, paths_equal, CaptureBuilder,
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

/// Adapter for Codex CLI session storage.
pub struct CodexAdapter {
    root: Option<PathBuf>,
}

impl CodexAdapter {
    /// Create an adapter rooted at the default storage path (~/.codex).
    pub fn new() -> Self {
        Self {
            root: storage_root(Agent::Codex, Platform::current()),
        }
    }

    /// Create an adapter with a custom root path (for testing).
    pub fn with_root(root: PathBuf) -> Self {
        Self { root: Some(root) }
    }

    fn session_files(&self) -> Vec<PathBuf> {
        let Some(ref root) = self.root else {
            return Vec::new();
        };
        // Rollouts are nested by date; tolerate flat layouts too.
        let patterns = [
            root.join("sessions/*/*/*/rollout-*.jsonl"),
            root.join("sessions/*.jsonl"),
        ];
        let mut files = Vec::new();
        for pattern in patterns {
            if let Ok(entries) = glob::glob(&pattern.to_string_lossy()) {
                files.extend(entries.flatten());
            }
        }
        files
    }

    /// Match a session by meta id or by file stem.
    fn find_session_file(&self, session_id: &str) -> Option<PathBuf> {
        self.session_files().into_iter().find(|path| {
            let stem = path
                .file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or_default();
            if stem == session_id {
                return true;
            }
            meta_of(path)
                .map(|meta| meta.id.as_deref() == Some(session_id))
                .unwrap_or(false)
        })
    }
}

impl Default for CodexAdapter {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================
// Raw JSONL record types (serde deserialization)
// ============================================

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct RawEvent {
    timestamp: Option<String>,
    #[serde(rename = "type")]
    event_type: Option<String>,
    payload: serde_json::Value,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct SessionMetaPayload {
    id: Option<String>,
    cwd: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct ResponseItemPayload {
    #[serde(rename = "type")]
    item_type: Option<String>,
    role: Option<String>,
    content: Option<Vec<ContentBlock>>,
    name: Option<String>,
    arguments: Option<String>,
    output: Option<String>,
    summary: Option<Vec<serde_json::Value>>,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(tag = "type")]
enum ContentBlock {
    #[serde(rename = "input_text")]
    InputText { text: String },
    #[serde(rename = "output_text")]
    OutputText { text: String },
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(other)]
    Unknown,
}

impl ContentBlock {
    fn text(&self) -> Option<&str> {
        match self {
            ContentBlock::InputText { text }
            | ContentBlock::OutputText { text }
            | ContentBlock::Text { text } => Some(text),
            ContentBlock::Unknown => None,
        }
    }
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct EventMsgPayload {
    #[serde(rename = "type")]
    msg_type: Option<String>,
    message: Option<String>,
    info: Option<TokenInfo>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct TokenInfo {
    last_token_usage: Option<TokenUsage>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct TokenUsage {
    input_tokens: Option<i64>,
    output_tokens: Option<i64>,
    cached_input_tokens: Option<i64>,
}

fn meta_of(path: &Path) -> Option<SessionMetaPayload> {
    let file = File::open(path).ok()?;
    for line in BufReader::new(file).lines().take(5) {
        let Ok(line) = line else { break };
        let Ok(event) = serde_json::from_str::<RawEvent>(&line) else {
            continue;
        };
        if event.event_type.as_deref() == Some("session_meta") {
            return serde_json::from_value(event.payload).ok();
        }
    }
    None
}

#[derive(Debug, Default)]
struct FileSummary {
    message_count: usize,
    first_timestamp: Option<DateTime<Utc>>,
    last_timestamp: Option<DateTime<Utc>>,
    session_id: Option<String>,
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

        match event.event_type.as_deref() {
            Some("session_meta") => {
                if let Ok(meta) = serde_json::from_value::<SessionMetaPayload>(event.payload) {
                    if summary.session_id.is_none() {
                        summary.session_id = meta.id;
                    }
                    if summary.cwd.is_none() {
                        summary.cwd = meta.cwd;
                    }
                }
            }
            Some("response_item") => {
                let Ok(item) = serde_json::from_value::<ResponseItemPayload>(event.payload) else {
                    continue;
                };
                if item.item_type.as_deref() == Some("message") {
                    summary.message_count += 1;
                    if summary.preview.is_none() && item.role.as_deref() == Some("user") {
                        let text = item
                            .content
                            .iter()
                            .flatten()
                            .find_map(ContentBlock::text)
                            .unwrap_or_default();
                        summary.preview = util::preview_text(text);
                    }
                }
            }
            Some("event_msg") => {
                if let Ok(msg) = serde_json::from_value::<EventMsgPayload>(event.payload) {
                    if matches!(
                        msg.msg_type.as_deref(),
                        Some("user_message" | "agent_message")
                    ) {
                        summary.message_count += 1;
                    }
                }
            }
            _ => {}
        }
    }

    Some(summary)
}

impl Adapter for CodexAdapter {
    fn agent(&self) -> Agent {
        Agent::Codex
    }

    fn detect(&self) -> bool {
        self.root.as_ref().map(|r| r.exists()).unwrap_or(false)
            && !self.session_files().is_empty()
    }

    fn list_sessions(&self, project: Option<&Path>) -> Result<Vec<SessionInfo>> {
        let mut sessions = Vec::new();

        for path in self.session_files() {
            let Some(summary) = summarize_file(&path) else {
                tracing::debug!(path = %path.display(), "skipping unreadable rollout file");
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
            let id = summary.session_id.clone().unwrap_or_else(|| {
                path.file_stem()
                    .and_then(|s| s.to_str())
                    .unwrap_or_default()
                    .to_string()
            });
            sessions.push(SessionInfo {
                id,
                started_at: summary.first_timestamp,
                last_active_at: summary.last_timestamp,
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
            agent: Agent::Codex.to_string(),
            message: format!("failed to open {}: {}", path.display(), e),
        })?;

        let mut builder = CaptureBuilder::new(Agent::Codex, session_id);
        let mut parsed_records = 0usize;
        // Pending function-call names let the following output carry its tool
        let mut last_tool_name: Option<String> = None;

        for line in BufReader::new(file).lines() {
            let Ok(line) = line else { break };
            if line.trim().is_empty() {
                continue;
            }
            let event: RawEvent = match serde_json::from_str(&line) {
                Ok(e) => e,
                Err(e) => {
                    tracing::debug!(error = %e, "skipping malformed rollout line");
                    continue;
                }
            };
            parsed_records += 1;

            let timestamp = event.timestamp.as_deref().and_then(parse_timestamp_str);
            builder.observe_timestamp(timestamp);

            match event.event_type.as_deref() {
                Some("session_meta") => {
                    if let Ok(meta) = serde_json::from_value::<SessionMetaPayload>(event.payload) {
                        if let Some(cwd) = meta.cwd {
                            builder.set_project_path(cwd);
                        }
                    }
                }
                Some("response_item") => {
                    let Ok(item) = serde_json::from_value::<ResponseItemPayload>(event.payload)
                    else {
                        continue;
                    };
                    match item.item_type.as_deref() {
                        Some("message") => {
                            let role = item
                                .role
                                .as_deref()
                                .map(normalize_role)
                                .unwrap_or(Role::Assistant);
                            let text: Vec<&str> = item
                                .content
                                .iter()
                                .flatten()
                                .filter_map(ContentBlock::text)
                                .collect();
                            if !text.is_empty() {
                                builder.push_text(role, &text.join("\n"), timestamp);
                            }
                        }
                        Some("function_call") => {
                            let name = item.name.unwrap_or_else(|| "function".to_string());
                            let input = item
                                .arguments
                                .as_deref()
                                .map(json_or_string)
                                .unwrap_or(serde_json::Value::Null);
                            builder.push_tool_use(&name, &input, timestamp);
                            last_tool_name = Some(name);
                        }
                        Some("function_call_output") => {
                            builder.push_tool_result(
                                last_tool_name.take().as_deref(),
                                item.output.unwrap_or_default(),
                                timestamp,
                            );
                        }
                        Some("reasoning") => {
                            for chunk in item.summary.iter().flatten() {
                                builder.push_thought(&util::value_to_text(chunk));
                            }
                        }
                        _ => {}
                    }
                }
                Some("event_msg") => {
                    let Ok(msg) = serde_json::from_value::<EventMsgPayload>(event.payload) else {
                        continue;
                    };
                    match msg.msg_type.as_deref() {
                        Some("user_message") => {
                            builder.push_text(
                                Role::User,
                                msg.message.as_deref().unwrap_or_default(),
                                timestamp,
                            );
                        }
                        Some("agent_message") => {
                            builder.push_text(
                                Role::Assistant,
                                msg.message.as_deref().unwrap_or_default(),
                                timestamp,
                            );
                        }
                        Some("token_count") => {
                            if let Some(usage) =
                                msg.info.and_then(|info| info.last_token_usage)
                            {
                                builder.add_usage(
                                    usage.input_tokens,
                                    usage.output_tokens,
                                    usage.cached_input_tokens,
                                );
                            }
                        }
                        _ => {}
                    }
                }
                _ => {}
            }
        }

        if parsed_records == 0 {
            return Err(Error::ParseFailure {
                agent: Agent::Codex.to_string(),
                message: format!("no parseable records in {}", path.display()),
            });
        }

        builder.finish()
    }
}
