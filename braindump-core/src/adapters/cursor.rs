//! Cursor adapter
//!
//! Cursor persists chat state in SQLite: one `state.vscdb` per workspace
//! under `workspaceStorage/<hash>/` (table `ItemTable`, key
//! `composer.composerData` listing the workspace's composers) and a global
//! `globalStorage/state.vscdb` (table `cursorDiskKV`) whose
//! `bubbleId:<composerId>:<bubbleId>` rows carry the messages as JSON blobs.
//!
//! Databases are opened read-only with must-exist semantics; a workspace
//! database that fails to open is skipped, a failing global database is a
//! [`Error::ParseFailure`] for capture.

use crate::adapters::util::{
    self, first_str, json_or_string, parse_timestamp, paths_equal, to_number, CaptureBuilder,
};
use crate::adapters::Adapter;
use crate::error::{Error, Result};
use crate::registry::{storage_root, Platform};
use crate::types::{Agent, CapturedSession, Role, SessionInfo};
use chrono::{DateTime, Utc};
use rusqlite::{Connection, OpenFlags, OptionalExtension};
use serde_json::Value;
use std::path::{Path, PathBuf};

/// Adapter for Cursor session storage.
pub struct CursorAdapter {
    root: Option<PathBuf>,
}

/// Composer metadata joined with its workspace folder.
#[derive(Debug, Clone)]
struct ComposerMeta {
    id: String,
    name: Option<String>,
    created_at: Option<DateTime<Utc>>,
    last_updated_at: Option<DateTime<Utc>>,
    folder: Option<PathBuf>,
}

impl CursorAdapter {
    /// Create an adapter rooted at the platform's Cursor user directory.
    pub fn new() -> Self {
        Self {
            root: storage_root(Agent::Cursor, Platform::current()),
        }
    }

    /// Create an adapter with a custom root path (for testing).
    pub fn with_root(root: PathBuf) -> Self {
        Self { root: Some(root) }
    }

    fn global_db_path(&self) -> Option<PathBuf> {
        self.root
            .as_ref()
            .map(|r| r.join("globalStorage/state.vscdb"))
    }

    fn workspace_dirs(&self) -> Vec<PathBuf> {
        let Some(ref root) = self.root else {
            return Vec::new();
        };
        let Ok(entries) = std::fs::read_dir(root.join("workspaceStorage")) else {
            return Vec::new();
        };
        entries
            .flatten()
            .map(|e| e.path())
            .filter(|p| p.join("state.vscdb").exists())
            .collect()
    }

    /// All composers across workspaces, newest first.
    fn composers(&self) -> Vec<ComposerMeta> {
        let mut composers = Vec::new();
        for dir in self.workspace_dirs() {
            let folder = workspace_folder(&dir);
            let db_path = dir.join("state.vscdb");
            let conn = match open_read_only(&db_path) {
                Ok(conn) => conn,
                Err(e) => {
                    tracing::debug!(path = %db_path.display(), error = %e, "skipping workspace db");
                    continue;
                }
            };
            match read_composer_list(&conn) {
                Ok(list) => {
                    for mut meta in list {
                        meta.folder = folder.clone();
                        composers.push(meta);
                    }
                }
                Err(e) => {
                    tracing::debug!(path = %db_path.display(), error = %e, "no composer data");
                }
            }
        }
        composers
    }

    fn find_composer(&self, composer_id: &str) -> Option<ComposerMeta> {
        self.composers().into_iter().find(|c| c.id == composer_id)
    }
}

impl Default for CursorAdapter {
    fn default() -> Self {
        Self::new()
    }
}

/// Open a SQLite database read-only; the file must already exist.
fn open_read_only(path: &Path) -> rusqlite::Result<Connection> {
    Connection::open_with_flags(
        path,
        OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )
}

/// `workspace.json` records the opened folder as a `file://` URI.
fn workspace_folder(dir: &Path) -> Option<PathBuf> {
    let content = std::fs::read_to_string(dir.join("workspace.json")).ok()?;
    let value: Value = serde_json::from_str(&content).ok()?;
    let folder = first_str(&value, &["folder", "workspace"])?;
    let path = folder.strip_prefix("file://").unwrap_or(folder);
    Some(PathBuf::from(path))
}

fn read_composer_list(conn: &Connection) -> rusqlite::Result<Vec<ComposerMeta>> {
    let raw: Option<String> = conn
        .query_row(
            "SELECT value FROM ItemTable WHERE key = 'composer.composerData'",
            [],
            |row| row.get(0),
        )
        .optional()?;

    let Some(raw) = raw else {
        return Ok(Vec::new());
    };
    let value = json_or_string(&raw);
    let composers = value
        .get("allComposers")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();

    Ok(composers
        .iter()
        .filter_map(|entry| {
            let id = first_str(entry, &["composerId", "id"])?.to_string();
            Some(ComposerMeta {
                id,
                name: first_str(entry, &["name", "title"]).map(str::to_string),
                created_at: entry.get("createdAt").and_then(parse_timestamp),
                last_updated_at: entry.get("lastUpdatedAt").and_then(parse_timestamp),
                folder: None,
            })
        })
        .collect())
}

/// Count bubbles for a composer in the global store.
fn bubble_count(conn: &Connection, composer_id: &str) -> rusqlite::Result<usize> {
    let pattern = format!("bubbleId:{}:%", composer_id);
    conn.query_row(
        "SELECT COUNT(*) FROM cursorDiskKV WHERE key LIKE ?1",
        [pattern],
        |row| row.get::<_, i64>(0),
    )
    .map(|n| n as usize)
}

/// Message bubbles for a composer, in insertion order.
fn bubbles(conn: &Connection, composer_id: &str) -> rusqlite::Result<Vec<Value>> {
    let pattern = format!("bubbleId:{}:%", composer_id);
    let mut stmt =
        conn.prepare("SELECT value FROM cursorDiskKV WHERE key LIKE ?1 ORDER BY rowid")?;
    let rows = stmt
        .query_map([pattern], |row| row.get::<_, String>(0))?
        .collect::<rusqlite::Result<Vec<String>>>()?;
    Ok(rows.iter().map(|raw| json_or_string(raw)).collect())
}

impl Adapter for CursorAdapter {
    fn agent(&self) -> Agent {
        Agent::Cursor
    }

    fn detect(&self) -> bool {
        let has_global = self
            .global_db_path()
            .map(|p| p.exists())
            .unwrap_or(false);
        has_global || !self.workspace_dirs().is_empty()
    }

    fn list_sessions(&self, project: Option<&Path>) -> Result<Vec<SessionInfo>> {
        let global = self
            .global_db_path()
            .filter(|p| p.exists())
            .and_then(|p| open_read_only(&p).ok());

        let mut sessions = Vec::new();
        for composer in self.composers() {
            if let Some(project) = project {
                let matches = composer
                    .folder
                    .as_deref()
                    .map(|f| paths_equal(f, project))
                    .unwrap_or(false);
                if !matches {
                    continue;
                }
            }
            let message_count = global
                .as_ref()
                .and_then(|conn| bubble_count(conn, &composer.id).ok());

            sessions.push(SessionInfo {
                id: composer.id,
                started_at: composer.created_at,
                last_active_at: composer.last_updated_at.or(composer.created_at),
                message_count,
                project_path: composer.folder,
                preview: composer.name.as_deref().and_then(util::preview_text),
            });
        }

        util::sort_sessions(&mut sessions);
        Ok(sessions)
    }

    fn capture(&self, session_id: &str) -> Result<CapturedSession> {
        let composer = self
            .find_composer(session_id)
            .ok_or_else(|| Error::SessionNotFound(session_id.to_string()))?;

        let global_path = self
            .global_db_path()
            .filter(|p| p.exists())
            .ok_or_else(|| Error::ParseFailure {
                agent: Agent::Cursor.to_string(),
                message: "global state.vscdb is missing".to_string(),
            })?;
        let conn = open_read_only(&global_path).map_err(|e| Error::ParseFailure {
            agent: Agent::Cursor.to_string(),
            message: format!("failed to open {}: {}", global_path.display(), e),
        })?;
        let bubbles = bubbles(&conn, session_id).map_err(|e| Error::ParseFailure {
            agent: Agent::Cursor.to_string(),
            message: format!("failed to read bubbles: {}", e),
        })?;

        let mut builder = CaptureBuilder::new(Agent::Cursor, session_id);
        if let Some(ref folder) = composer.folder {
            builder.set_project_path(folder);
        }
        if let Some(created) = composer.created_at {
            builder.set_started_at(created);
        }

        for bubble in &bubbles {
            let timestamp = bubble.get("createdAt").and_then(parse_timestamp);
            // bubble type 1 is the user, 2 the assistant
            let role = match bubble.get("type").and_then(to_number) {
                Some(1) => Role::User,
                _ => Role::Assistant,
            };
            if let Some(text) = first_str(bubble, &["text", "richText"]) {
                builder.push_text(role, text, timestamp);
            }
            // tool calls ride along on assistant bubbles
            if let Some(tool) = bubble.get("toolFormerData") {
                let name = first_str(tool, &["name", "tool"]).unwrap_or("tool");
                let args = tool
                    .get("params")
                    .cloned()
                    .or_else(|| {
                        first_str(tool, &["rawArgs"]).map(json_or_string)
                    })
                    .unwrap_or(Value::Null);
                builder.push_tool_use(name, &args, timestamp);
                if let Some(result) = first_str(tool, &["result", "output"]) {
                    builder.push_tool_result(Some(name), result.to_string(), timestamp);
                }
            }
            if let Some(usage) = bubble.get("tokenCount") {
                builder.add_usage(
                    usage.get("inputTokens").and_then(to_number),
                    usage.get("outputTokens").and_then(to_number),
                    None,
                );
            }
        }

        builder.finish()
    }
}
