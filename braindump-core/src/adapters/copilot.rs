//! GitHub Copilot CLI adapter
//!
//! Reads per-session directories under `~/.copilot/session-state/<id>/`:
//! a lightweight `workspace.yaml` (flat `key: value` metadata plus an
//! optional multi-line `summary: |` block) and `events.jsonl` whose entries
//! are `session.start`, `user.message`, or `assistant.message` (possibly
//! carrying `toolRequests`).
//!
//! The metadata file is simple enough that it is parsed by hand; the events
//! file is the primary artifact and follows the shared JSONL rules.

use crate::adapters::util::{self, parse_timestamp_str, paths_equal, CaptureBuilder};
use crate::adapters::Adapter;
use crate::error::{Error, Result};
use crate::registry::{storage_root, Platform};
use crate::types::{Agent, CapturedSession, Role, SessionInfo};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

/// Adapter for Copilot CLI session storage.
pub struct CopilotAdapter {
    root: Option<PathBuf>,
}

impl CopilotAdapter {
    /// Create an adapter rooted at the default storage path (~/.copilot).
    pub fn new() -> Self {
        Self {
            root: storage_root(Agent::Copilot, Platform::current()),
        }
    }

    /// Create an adapter with a custom root path (for testing).
    pub fn with_root(root: PathBuf) -> Self {
        Self { root: Some(root) }
    }

    fn session_dirs(&self) -> Vec<PathBuf> {
        let Some(ref root) = self.root else {
            return Vec::new();
        };
        let state_dir = root.join("session-state");
        let Ok(entries) = std::fs::read_dir(state_dir) else {
            return Vec::new();
        };
        entries
            .flatten()
            .map(|e| e.path())
            .filter(|p| {
                p.is_dir()
                    && (p.join("events.jsonl").exists() || p.join("workspace.yaml").exists())
            })
            .collect()
    }

    fn session_dir(&self, session_id: &str) -> Option<PathBuf> {
        let dir = self.root.as_ref()?.join("session-state").join(session_id);
        dir.is_dir().then_some(dir)
    }
}

impl Default for CopilotAdapter {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================
// workspace.yaml
// ============================================

/// Metadata parsed from `workspace.yaml`.
#[derive(Debug, Default)]
struct WorkspaceMeta {
    fields: HashMap<String, String>,
    summary: Option<String>,
}

impl WorkspaceMeta {
    fn get(&self, key: &str) -> Option<&str> {
        self.fields.get(key).map(String::as_str)
    }

    fn cwd(&self) -> Option<&str> {
        self.get("cwd").or_else(|| self.get("workspace"))
    }
}

/// Hand-parse the flat metadata file.
///
/// Supported shape: `key: value` lines, comments starting with `#`, and one
/// optional `summary: |` block whose indented lines belong to the summary.
fn parse_workspace_meta(content: &str) -> WorkspaceMeta {
    let mut meta = WorkspaceMeta::default();
    let mut summary_lines: Vec<String> = Vec::new();
    let mut in_summary = false;

    for line in content.lines() {
        if in_summary {
            if let Some(stripped) = line.strip_prefix("  ") {
                summary_lines.push(stripped.to_string());
                continue;
            }
            if line.trim().is_empty() {
                summary_lines.push(String::new());
                continue;
            }
            in_summary = false;
        }
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let Some((key, value)) = trimmed.split_once(':') else {
            continue;
        };
        let key = key.trim();
        let value = value.trim();
        if key == "summary" && (value == "|" || value == "|-") {
            in_summary = true;
            continue;
        }
        if !value.is_empty() {
            meta.fields
                .insert(key.to_string(), value.trim_matches('"').to_string());
        }
    }

    let summary = summary_lines.join("\n").trim().to_string();
    if !summary.is_empty() {
        meta.summary = Some(summary);
    }
    meta
}

fn read_workspace_meta(dir: &Path) -> WorkspaceMeta {
    std::fs::read_to_string(dir.join("workspace.yaml"))
        .map(|content| parse_workspace_meta(&content))
        .unwrap_or_default()
}

// ============================================
// events.jsonl
// ============================================

#[derive(Debug, Deserialize, Default)]
#[serde(default, rename_all = "camelCase")]
struct RawEvent {
    #[serde(rename = "type")]
    event_type: Option<String>,
    timestamp: Option<String>,
    content: Option<String>,
    text: Option<String>,
    context: Option<EventContext>,
    tool_requests: Vec<ToolRequest>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct EventContext {
    cwd: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct ToolRequest {
    name: Option<String>,
    arguments: serde_json::Value,
}

impl RawEvent {
    fn text(&self) -> &str {
        self.content
            .as_deref()
            .or(self.text.as_deref())
            .unwrap_or_default()
    }
}

#[derive(Debug, Default)]
struct EventsSummary {
    message_count: usize,
    first_timestamp: Option<DateTime<Utc>>,
    last_timestamp: Option<DateTime<Utc>>,
    cwd: Option<String>,
    preview: Option<String>,
}

fn summarize_events(path: &Path) -> Option<EventsSummary> {
    let file = File::open(path).ok()?;
    let mut summary = EventsSummary::default();

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
            Some("session.start") => {
                if summary.cwd.is_none() {
                    summary.cwd = event.context.and_then(|c| c.cwd);
                }
            }
            Some("user.message") => {
                summary.message_count += 1;
                if summary.preview.is_none() {
                    summary.preview = util::preview_text(event.text());
                }
            }
            Some("assistant.message") => summary.message_count += 1,
            _ => {}
        }
    }

    Some(summary)
}

impl Adapter for CopilotAdapter {
    fn agent(&self) -> Agent {
        Agent::Copilot
    }

    fn detect(&self) -> bool {
        !self.session_dirs().is_empty()
    }

    fn list_sessions(&self, project: Option<&Path>) -> Result<Vec<SessionInfo>> {
        let mut sessions = Vec::new();

        for dir in self.session_dirs() {
            let meta = read_workspace_meta(&dir);
            let summary = summarize_events(&dir.join("events.jsonl")).unwrap_or_default();

            let cwd = summary
                .cwd
                .clone()
                .or_else(|| meta.cwd().map(str::to_string));
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
                std::fs::metadata(dir.join("events.jsonl"))
                    .and_then(|m| m.modified())
                    .ok()
                    .map(DateTime::from)
            });

            sessions.push(SessionInfo {
                id: dir
                    .file_name()
                    .map(|n| n.to_string_lossy().to_string())
                    .unwrap_or_default(),
                started_at: summary
                    .first_timestamp
                    .or_else(|| meta.get("created_at").and_then(parse_timestamp_str)),
                last_active_at: last_active,
                message_count: Some(summary.message_count),
                project_path: cwd.map(PathBuf::from),
                preview: summary.preview,
            });
        }

        util::sort_sessions(&mut sessions);
        Ok(sessions)
    }

    fn capture(&self, session_id: &str) -> Result<CapturedSession> {
        let dir = self
            .session_dir(session_id)
            .ok_or_else(|| Error::SessionNotFound(session_id.to_string()))?;

        let meta = read_workspace_meta(&dir);
        let events_path = dir.join("events.jsonl");
        let file = File::open(&events_path).map_err(|e| Error::ParseFailure {
            agent: Agent::Copilot.to_string(),
            message: format!("failed to open {}: {}", events_path.display(), e),
        })?;

        let mut builder = CaptureBuilder::new(Agent::Copilot, session_id);
        if let Some(cwd) = meta.cwd() {
            builder.set_project_path(cwd);
        }
        if let Some(summary) = meta.summary.as_deref() {
            builder.push_thought(summary);
        }

        let mut parsed_records = 0usize;

        for line in BufReader::new(file).lines() {
            let Ok(line) = line else { break };
            if line.trim().is_empty() {
                continue;
            }
            let event: RawEvent = match serde_json::from_str(&line) {
                Ok(e) => e,
                Err(e) => {
                    tracing::debug!(error = %e, "skipping malformed event line");
                    continue;
                }
            };
            parsed_records += 1;

            let timestamp = event.timestamp.as_deref().and_then(parse_timestamp_str);
            builder.observe_timestamp(timestamp);

            match event.event_type.as_deref() {
                Some("session.start") => {
                    if let Some(cwd) = event.context.as_ref().and_then(|c| c.cwd.as_deref()) {
                        builder.set_project_path(cwd);
                    }
                }
                Some("user.message") => builder.push_text(Role::User, event.text(), timestamp),
                Some("assistant.message") => {
                    builder.push_text(Role::Assistant, event.text(), timestamp);
                    for request in &event.tool_requests {
                        let name = request.name.as_deref().unwrap_or("tool");
                        builder.push_tool_use(name, &request.arguments, timestamp);
                    }
                }
                _ => {}
            }
        }

        if parsed_records == 0 {
            return Err(Error::ParseFailure {
                agent: Agent::Copilot.to_string(),
                message: format!("no parseable events in {}", events_path.display()),
            });
        }

        builder.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_workspace_meta_flat_fields() {
        let meta = parse_workspace_meta(
            "session_id: abc-123\ncwd: /home/user/project\ncreated_at: 2025-03-01T10:00:00Z\n",
        );
        assert_eq!(meta.get("session_id"), Some("abc-123"));
        assert_eq!(meta.cwd(), Some("/home/user/project"));
        assert!(meta.summary.is_none());
    }

    #[test]
    fn test_parse_workspace_meta_summary_block() {
        let meta = parse_workspace_meta(
            "cwd: /tmp/p\nsummary: |\n  Refactored the auth module.\n  Tests still failing.\nmodel: gpt-5\n",
        );
        assert_eq!(
            meta.summary.as_deref(),
            Some("Refactored the auth module.\nTests still failing.")
        );
        assert_eq!(meta.get("model"), Some("gpt-5"));
    }

    #[test]
    fn test_parse_workspace_meta_ignores_comments() {
        let meta = parse_workspace_meta("# header\ncwd: /x\n\n# trailing\n");
        assert_eq!(meta.cwd(), Some("/x"));
        assert_eq!(meta.fields.len(), 1);
    }
}
