//! Gemini CLI adapter
//!
//! Reads one JSON document per session from
//! `~/.gemini/tmp/<projectHash>/chats/session-*.json`. Messages carry
//! `parts[]`, optional `toolCalls[]` with a rich `resultDisplay` (whose
//! `diffStat` becomes a `+X -Y` diff summary), and `thoughts[]`. The `model`
//! role normalizes to assistant.
//!
//! Unlike the line-delimited formats, the whole document must decode: an
//! unreadable or undecodable file is a [`Error::ParseFailure`].

use crate::adapters::util::{
    self, first_str, normalize_role, parse_timestamp, parse_timestamp_str, paths_equal, to_number,
    value_to_text, CaptureBuilder,
};
use crate::adapters::Adapter;
use crate::error::{Error, Result};
use crate::registry::{storage_root, Platform};
use crate::types::{Agent, CapturedSession, FileChange, Role, SessionInfo};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;
use std::path::{Path, PathBuf};

/// Adapter for Gemini CLI session storage.
pub struct GeminiAdapter {
    root: Option<PathBuf>,
}

impl GeminiAdapter {
    /// Create an adapter rooted at the default storage path (~/.gemini).
    pub fn new() -> Self {
        Self {
            root: storage_root(Agent::Gemini, Platform::current()),
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
        let pattern = root.join("tmp/*/chats/session-*.json");
        glob::glob(&pattern.to_string_lossy())
            .map(|entries| entries.flatten().collect())
            .unwrap_or_default()
    }

    fn find_session_file(&self, session_id: &str) -> Option<PathBuf> {
        self.session_files().into_iter().find(|path| {
            let stem = path
                .file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or_default();
            stem == session_id
                || stem.strip_prefix("session-") == Some(session_id)
                || read_document(path)
                    .map(|(doc, _)| doc.session_id.as_deref() == Some(session_id))
                    .unwrap_or(false)
        })
    }
}

impl Default for GeminiAdapter {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================
// Raw document types (serde deserialization)
// ============================================

#[derive(Debug, Deserialize, Default)]
#[serde(default, rename_all = "camelCase")]
struct ChatDocument {
    session_id: Option<String>,
    start_time: Option<String>,
    last_updated: Option<String>,
    messages: Vec<ChatMessage>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default, rename_all = "camelCase")]
struct ChatMessage {
    role: Option<String>,
    #[serde(rename = "type")]
    kind: Option<String>,
    parts: Option<Value>,
    content: Option<Value>,
    timestamp: Option<Value>,
    tokens: Option<TokenBlock>,
    tool_calls: Vec<ToolCall>,
    thoughts: Vec<Value>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default, rename_all = "camelCase")]
struct TokenBlock {
    input: Option<i64>,
    output: Option<i64>,
    cached: Option<i64>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default, rename_all = "camelCase")]
struct ToolCall {
    name: Option<String>,
    args: Option<Value>,
    result_display: Option<Value>,
}

impl ChatMessage {
    fn role(&self) -> Role {
        self.role
            .as_deref()
            .or(self.kind.as_deref())
            .map(normalize_role)
            .unwrap_or(Role::Assistant)
    }

    fn text(&self) -> String {
        let from_parts = self.parts.as_ref().map(value_to_text).unwrap_or_default();
        if !from_parts.is_empty() {
            return from_parts;
        }
        self.content.as_ref().map(value_to_text).unwrap_or_default()
    }
}

/// `diffStat { model_added_lines, model_removed_lines }` becomes `"+X -Y"`.
fn diff_summary(result_display: &Value) -> Option<String> {
    let stat = result_display.get("diffStat")?;
    let added = stat.get("model_added_lines").and_then(to_number)?;
    let removed = stat.get("model_removed_lines").and_then(to_number)?;
    Some(format!("+{} -{}", added, removed))
}

fn read_document(path: &Path) -> Result<(ChatDocument, Value)> {
    let content = std::fs::read_to_string(path).map_err(|e| Error::ParseFailure {
        agent: Agent::Gemini.to_string(),
        message: format!("failed to read {}: {}", path.display(), e),
    })?;
    let value: Value = serde_json::from_str(&content).map_err(|e| Error::ParseFailure {
        agent: Agent::Gemini.to_string(),
        message: format!("failed to decode {}: {}", path.display(), e),
    })?;
    let doc: ChatDocument = serde_json::from_value(value.clone()).map_err(|e| {
        Error::ParseFailure {
            agent: Agent::Gemini.to_string(),
            message: format!("unexpected chat shape in {}: {}", path.display(), e),
        }
    })?;
    Ok((doc, value))
}

fn session_id_of(doc: &ChatDocument, path: &Path) -> String {
    doc.session_id.clone().unwrap_or_else(|| {
        path.file_stem()
            .and_then(|s| s.to_str())
            .and_then(|s| s.strip_prefix("session-"))
            .or_else(|| path.file_stem().and_then(|s| s.to_str()))
            .unwrap_or_default()
            .to_string()
    })
}

impl Adapter for GeminiAdapter {
    fn agent(&self) -> Agent {
        Agent::Gemini
    }

    fn detect(&self) -> bool {
        self.root.as_ref().map(|r| r.exists()).unwrap_or(false)
            && !self.session_files().is_empty()
    }

    fn list_sessions(&self, project: Option<&Path>) -> Result<Vec<SessionInfo>> {
        let mut sessions = Vec::new();

        for path in self.session_files() {
            let (doc, raw) = match read_document(&path) {
                Ok(parsed) => parsed,
                Err(e) => {
                    tracing::debug!(path = %path.display(), error = %e, "skipping chat file");
                    continue;
                }
            };
            if doc.messages.is_empty() {
                continue;
            }
            let cwd = first_str(&raw, &["projectPath", "cwd", "workspace"]).map(PathBuf::from);
            if let Some(project) = project {
                let matches = cwd
                    .as_deref()
                    .map(|c| paths_equal(c, project))
                    .unwrap_or(false);
                if !matches {
                    continue;
                }
            }
            let last_active = doc
                .last_updated
                .as_deref()
                .and_then(parse_timestamp_str)
                .or_else(|| {
                    std::fs::metadata(&path)
                        .and_then(|m| m.modified())
                        .ok()
                        .map(DateTime::<Utc>::from)
                });
            let preview = doc
                .messages
                .iter()
                .find(|m| m.role() == Role::User)
                .and_then(|m| util::preview_text(&m.text()));

            sessions.push(SessionInfo {
                id: session_id_of(&doc, &path),
                started_at: doc.start_time.as_deref().and_then(parse_timestamp_str),
                last_active_at: last_active,
                message_count: Some(doc.messages.len()),
                project_path: cwd,
                preview,
            });
        }

        util::sort_sessions(&mut sessions);
        Ok(sessions)
    }

    fn capture(&self, session_id: &str) -> Result<CapturedSession> {
        let path = self
            .find_session_file(session_id)
            .ok_or_else(|| Error::SessionNotFound(session_id.to_string()))?;
        let (doc, raw) = read_document(&path)?;

        let mut builder = CaptureBuilder::new(Agent::Gemini, session_id);
        if let Some(cwd) = first_str(&raw, &["projectPath", "cwd", "workspace"]) {
            builder.set_project_path(cwd);
        }
        if let Some(started) = doc.start_time.as_deref().and_then(parse_timestamp_str) {
            builder.set_started_at(started);
        }

        for message in &doc.messages {
            let timestamp = message.timestamp.as_ref().and_then(parse_timestamp);
            let role = message.role();

            let text = message.text();
            if !text.trim().is_empty() {
                builder.push_text(role, &text, timestamp);
            }

            for thought in &message.thoughts {
                let text = match (
                    first_str(thought, &["subject"]),
                    first_str(thought, &["description"]),
                ) {
                    (Some(subject), Some(description)) => format!("{}: {}", subject, description),
                    _ => value_to_text(thought),
                };
                builder.push_thought(&text);
            }

            for call in &message.tool_calls {
                let name = call.name.as_deref().unwrap_or("tool");
                let args = call.args.clone().unwrap_or(Value::Null);
                builder.push_tool_use(name, &args, timestamp);

                if let Some(ref display) = call.result_display {
                    if let Some(diff) = diff_summary(display) {
                        let file_path = first_str(display, &["fileName", "filePath"])
                            .map(str::to_string)
                            .or_else(|| util::tool_file_path(&args));
                        if let Some(file_path) = file_path {
                            let language = util::language_for_path(&file_path);
                            builder.upsert_file_change(FileChange {
                                change_type: util::change_type_for_tool(name),
                                path: file_path,
                                diff: Some(diff),
                                language,
                            });
                        }
                    }
                    let display_text = value_to_text(display);
                    if !display_text.trim().is_empty() {
                        builder.push_tool_result(Some(name), display_text, timestamp);
                    }
                }
            }

            if let Some(ref tokens) = message.tokens {
                builder.add_usage(tokens.input, tokens.output, tokens.cached);
            }
        }

        builder.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_diff_summary_formats_plus_minus() {
        let display = json!({
            "fileName": "src/app.py",
            "diffStat": {"model_added_lines": 5, "model_removed_lines": 2}
        });
        assert_eq!(diff_summary(&display).as_deref(), Some("+5 -2"));
    }

    #[test]
    fn test_diff_summary_requires_both_counts() {
        let display = json!({"diffStat": {"model_added_lines": 5}});
        assert!(diff_summary(&display).is_none());
        assert!(diff_summary(&json!({"markdown": "ok"})).is_none());
    }
}
