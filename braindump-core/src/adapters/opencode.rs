//! OpenCode adapter
//!
//! Primary store: `opencode.db` in the agent's data directory, with tables
//! `session`, `project`, `message`, and `part` whose `data` columns carry
//! JSON payloads (part types `text` and `tool-invocation`). Fallback: a
//! directory tree `storage/{session,message,part}/…/*.json` with equivalent
//! content.
//!
//! The database is tried first; on open failure, query failure, or an empty
//! result, the directory tree is consulted. Only when both sources miss does
//! an operation fail.

use crate::adapters::util::{
    self, first_str, normalize_role, parse_timestamp, paths_equal, to_number, CaptureBuilder,
};
use crate::adapters::Adapter;
use crate::error::{Error, Result};
use crate::registry::{storage_root, Platform};
use crate::types::{Agent, CapturedSession, Role, SessionInfo};
use chrono::{DateTime, Utc};
use rusqlite::{Connection, OpenFlags};
use serde_json::Value;
use std::path::{Path, PathBuf};

/// Adapter for OpenCode session storage.
pub struct OpencodeAdapter {
    root: Option<PathBuf>,
}

impl OpencodeAdapter {
    /// Create an adapter rooted at the default data directory.
    pub fn new() -> Self {
        Self {
            root: storage_root(Agent::Opencode, Platform::current()),
        }
    }

    /// Create an adapter with a custom root path (for testing).
    pub fn with_root(root: PathBuf) -> Self {
        Self { root: Some(root) }
    }

    fn db_path(&self) -> Option<PathBuf> {
        self.root.as_ref().map(|r| r.join("opencode.db"))
    }

    fn storage_dir(&self) -> Option<PathBuf> {
        self.root.as_ref().map(|r| r.join("storage"))
    }

    fn open_db(&self) -> Option<Connection> {
        let path = self.db_path().filter(|p| p.exists())?;
        match Connection::open_with_flags(
            &path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        ) {
            Ok(conn) => Some(conn),
            Err(e) => {
                tracing::debug!(path = %path.display(), error = %e, "failed to open opencode.db");
                None
            }
        }
    }
}

impl Default for OpencodeAdapter {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================
// Shared payload handling
// ============================================

/// Session payload fields common to both stores.
#[derive(Debug, Default)]
struct SessionRecord {
    id: String,
    directory: Option<String>,
    title: Option<String>,
    created: Option<DateTime<Utc>>,
    updated: Option<DateTime<Utc>>,
}

fn session_record(data: &Value) -> Option<SessionRecord> {
    let id = first_str(data, &["id"])?.to_string();
    let time = data.get("time").cloned().unwrap_or(Value::Null);
    Some(SessionRecord {
        id,
        directory: first_str(data, &["directory", "cwd"]).map(str::to_string),
        title: first_str(data, &["title"]).map(str::to_string),
        created: time.get("created").and_then(parse_timestamp),
        updated: time.get("updated").and_then(parse_timestamp),
    })
}

fn message_role(data: &Value) -> Role {
    first_str(data, &["role"])
        .map(normalize_role)
        .unwrap_or(Role::Assistant)
}

fn message_timestamp(data: &Value) -> Option<DateTime<Utc>> {
    data.get("time")
        .and_then(|t| t.get("created"))
        .and_then(parse_timestamp)
}

/// Feed one message's parts into the builder.
fn push_parts(builder: &mut CaptureBuilder, role: Role, timestamp: Option<DateTime<Utc>>, parts: &[Value]) {
    for part in parts {
        match first_str(part, &["type"]) {
            Some("text") => {
                if let Some(text) = first_str(part, &["text"]) {
                    builder.push_text(role, text, timestamp);
                }
            }
            Some("tool-invocation") | Some("tool") => {
                let name = first_str(part, &["tool", "name"]).unwrap_or("tool");
                let state = part.get("state").cloned().unwrap_or(Value::Null);
                let input = state.get("input").cloned().unwrap_or(Value::Null);
                builder.push_tool_use(name, &input, timestamp);
                if let Some(output) = first_str(&state, &["output"]) {
                    builder.push_tool_result(Some(name), output.to_string(), timestamp);
                }
            }
            _ => {}
        }
    }
}

fn add_message_usage(builder: &mut CaptureBuilder, data: &Value) {
    if let Some(tokens) = data.get("tokens") {
        builder.add_usage(
            tokens.get("input").and_then(to_number),
            tokens.get("output").and_then(to_number),
            tokens
                .get("cache")
                .and_then(|c| c.get("write"))
                .and_then(to_number),
        );
    }
}

// ============================================
// Primary store (opencode.db)
// ============================================

fn db_sessions(conn: &Connection) -> rusqlite::Result<Vec<SessionRecord>> {
    let mut stmt = conn.prepare("SELECT data FROM session")?;
    let rows = stmt
        .query_map([], |row| row.get::<_, String>(0))?
        .collect::<rusqlite::Result<Vec<String>>>()?;
    Ok(rows
        .iter()
        .filter_map(|raw| serde_json::from_str::<Value>(raw).ok())
        .filter_map(|data| session_record(&data))
        .collect())
}

fn db_message_count(conn: &Connection, session_id: &str) -> rusqlite::Result<usize> {
    conn.query_row(
        "SELECT COUNT(*) FROM message WHERE session_id = ?1",
        [session_id],
        |row| row.get::<_, i64>(0),
    )
    .map(|n| n as usize)
}

/// `(message data, part data list)` pairs for a session, in message order.
fn db_messages(conn: &Connection, session_id: &str) -> rusqlite::Result<Vec<(Value, Vec<Value>)>> {
    let mut stmt =
        conn.prepare("SELECT id, data FROM message WHERE session_id = ?1 ORDER BY id")?;
    let messages = stmt
        .query_map([session_id], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?
        .collect::<rusqlite::Result<Vec<(String, String)>>>()?;

    let mut part_stmt =
        conn.prepare("SELECT data FROM part WHERE message_id = ?1 ORDER BY id")?;

    let mut result = Vec::new();
    for (message_id, raw) in messages {
        let Ok(data) = serde_json::from_str::<Value>(&raw) else {
            continue;
        };
        let parts = part_stmt
            .query_map([&message_id], |row| row.get::<_, String>(0))?
            .collect::<rusqlite::Result<Vec<String>>>()?
            .iter()
            .filter_map(|raw| serde_json::from_str::<Value>(raw).ok())
            .collect();
        result.push((data, parts));
    }
    Ok(result)
}

// ============================================
// Fallback store (storage/ directory tree)
// ============================================

fn json_files(pattern: PathBuf) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = glob::glob(&pattern.to_string_lossy())
        .map(|entries| entries.flatten().collect())
        .unwrap_or_default();
    files.sort();
    files
}

fn read_json(path: &Path) -> Option<Value> {
    let content = std::fs::read_to_string(path).ok()?;
    serde_json::from_str(&content).ok()
}

fn tree_sessions(storage: &Path) -> Vec<SessionRecord> {
    json_files(storage.join("session/**/*.json"))
        .iter()
        .filter_map(|p| read_json(p))
        .filter_map(|data| session_record(&data))
        .collect()
}

fn tree_message_count(storage: &Path, session_id: &str) -> usize {
    json_files(storage.join("message").join(session_id).join("*.json")).len()
}

fn tree_messages(storage: &Path, session_id: &str) -> Vec<(Value, Vec<Value>)> {
    json_files(storage.join("message").join(session_id).join("*.json"))
        .iter()
        .filter_map(|path| {
            let data = read_json(path)?;
            let message_id = path.file_stem()?.to_str()?.to_string();
            let parts = json_files(
                storage
                    .join("part")
                    .join(session_id)
                    .join(&message_id)
                    .join("*.json"),
            )
            .iter()
            .filter_map(|p| read_json(p))
            .collect();
            Some((data, parts))
        })
        .collect()
}

impl OpencodeAdapter {
    /// Sessions from the primary store, or `None` when it is unusable/empty.
    fn primary_sessions(&self) -> Option<Vec<SessionRecord>> {
        let conn = self.open_db()?;
        match db_sessions(&conn) {
            Ok(sessions) if !sessions.is_empty() => Some(sessions),
            Ok(_) => None,
            Err(e) => {
                tracing::debug!(error = %e, "opencode.db query failed, using storage tree");
                None
            }
        }
    }

    fn capture_from(
        &self,
        record: &SessionRecord,
        messages: Vec<(Value, Vec<Value>)>,
    ) -> Result<CapturedSession> {
        let mut builder = CaptureBuilder::new(Agent::Opencode, record.id.as_str());
        if let Some(ref directory) = record.directory {
            builder.set_project_path(directory);
        }
        if let Some(created) = record.created {
            builder.set_started_at(created);
        }

        for (data, parts) in &messages {
            let role = message_role(data);
            let timestamp = message_timestamp(data);
            push_parts(&mut builder, role, timestamp, parts);
            add_message_usage(&mut builder, data);
        }

        builder.finish()
    }
}

impl Adapter for OpencodeAdapter {
    fn agent(&self) -> Agent {
        Agent::Opencode
    }

    fn detect(&self) -> bool {
        let has_db = self.db_path().map(|p| p.exists()).unwrap_or(false);
        let has_tree = self
            .storage_dir()
            .map(|s| s.join("session").exists())
            .unwrap_or(false);
        has_db || has_tree
    }

    fn list_sessions(&self, project: Option<&Path>) -> Result<Vec<SessionInfo>> {
        let (records, from_db) = match self.primary_sessions() {
            Some(records) => (records, true),
            None => {
                let storage = self.storage_dir().unwrap_or_default();
                (tree_sessions(&storage), false)
            }
        };

        let conn = from_db.then(|| self.open_db()).flatten();
        let storage = self.storage_dir().unwrap_or_default();

        let mut sessions = Vec::new();
        for record in records {
            if let Some(project) = project {
                let matches = record
                    .directory
                    .as_deref()
                    .map(|d| paths_equal(Path::new(d), project))
                    .unwrap_or(false);
                if !matches {
                    continue;
                }
            }
            let message_count = match conn {
                Some(ref conn) => db_message_count(conn, &record.id).ok(),
                None => Some(tree_message_count(&storage, &record.id)),
            };
            sessions.push(SessionInfo {
                id: record.id,
                started_at: record.created,
                last_active_at: record.updated.or(record.created),
                message_count,
                project_path: record.directory.map(PathBuf::from),
                preview: record.title.as_deref().and_then(util::preview_text),
            });
        }

        util::sort_sessions(&mut sessions);
        Ok(sessions)
    }

    fn capture(&self, session_id: &str) -> Result<CapturedSession> {
        // primary store first
        if let Some(conn) = self.open_db() {
            match db_sessions(&conn) {
                Ok(records) => {
                    if let Some(record) = records.into_iter().find(|r| r.id == session_id) {
                        let messages =
                            db_messages(&conn, session_id).map_err(|e| Error::ParseFailure {
                                agent: Agent::Opencode.to_string(),
                                message: format!("failed to read messages: {}", e),
                            })?;
                        return self.capture_from(&record, messages);
                    }
                }
                Err(e) => {
                    tracing::debug!(error = %e, "opencode.db unusable, trying storage tree");
                }
            }
        }

        // directory-tree fallback
        let storage = self.storage_dir().unwrap_or_default();
        let record = tree_sessions(&storage)
            .into_iter()
            .find(|r| r.id == session_id)
            .ok_or_else(|| Error::SessionNotFound(session_id.to_string()))?;
        let messages = tree_messages(&storage, session_id);
        self.capture_from(&record, messages)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn seed_tree(root: &Path, session_id: &str) {
        let storage = root.join("storage");
        std::fs::create_dir_all(storage.join("session/info")).unwrap();
        std::fs::write(
            storage.join(format!("session/info/{}.json", session_id)),
            json!({
                "id": session_id,
                "directory": "/tmp/opencode-project",
                "title": "Wire up the queue",
                "time": {"created": 1740830400000i64, "updated": 1740834000000i64}
            })
            .to_string(),
        )
        .unwrap();

        let msg_dir = storage.join("message").join(session_id);
        std::fs::create_dir_all(&msg_dir).unwrap();
        std::fs::write(
            msg_dir.join("msg-1.json"),
            json!({"id": "msg-1", "role": "user", "time": {"created": 1740830400000i64}})
                .to_string(),
        )
        .unwrap();
        std::fs::write(
            msg_dir.join("msg-2.json"),
            json!({"id": "msg-2", "role": "assistant", "time": {"created": 1740830500000i64}})
                .to_string(),
        )
        .unwrap();

        let part_dir = storage.join("part").join(session_id);
        std::fs::create_dir_all(part_dir.join("msg-1")).unwrap();
        std::fs::create_dir_all(part_dir.join("msg-2")).unwrap();
        std::fs::write(
            part_dir.join("msg-1/prt-1.json"),
            json!({"id": "prt-1", "type": "text", "text": "Wire up the job queue"}).to_string(),
        )
        .unwrap();
        std::fs::write(
            part_dir.join("msg-2/prt-2.json"),
            json!({"id": "prt-2", "type": "text", "text": "Queue wiring is in place."})
                .to_string(),
        )
        .unwrap();
    }

    #[test]
    fn test_tree_fallback_when_db_is_corrupt() {
        let root = TempDir::new().unwrap();
        // garbage bytes where a SQLite header should be
        std::fs::write(root.path().join("opencode.db"), b"this is not a database").unwrap();
        seed_tree(root.path(), "json-fallback");

        let adapter = OpencodeAdapter::with_root(root.path().to_path_buf());
        assert!(adapter.detect());

        let captured = adapter.capture("json-fallback").unwrap();
        assert_eq!(captured.session_id, "json-fallback");
        assert_eq!(captured.conversation.message_count, 2);
        assert_eq!(captured.conversation.messages[1].role, Role::Assistant);
        assert_eq!(
            captured.conversation.messages[1].content,
            "Queue wiring is in place."
        );
    }

    #[test]
    fn test_primary_store_wins_when_usable() {
        let root = TempDir::new().unwrap();
        let conn = Connection::open(root.path().join("opencode.db")).unwrap();
        conn.execute("CREATE TABLE session (id TEXT PRIMARY KEY, data TEXT)", [])
            .unwrap();
        conn.execute(
            "CREATE TABLE message (id TEXT PRIMARY KEY, session_id TEXT, data TEXT)",
            [],
        )
        .unwrap();
        conn.execute(
            "CREATE TABLE part (id TEXT PRIMARY KEY, message_id TEXT, session_id TEXT, data TEXT)",
            [],
        )
        .unwrap();
        conn.execute(
            "INSERT INTO session (id, data) VALUES ('s-1', ?1)",
            [json!({"id": "s-1", "directory": "/tmp/p", "title": "db session",
                    "time": {"created": 1740830400000i64, "updated": 1740830400000i64}})
            .to_string()],
        )
        .unwrap();
        conn.execute(
            "INSERT INTO message (id, session_id, data) VALUES ('m-1', 's-1', ?1)",
            [json!({"id": "m-1", "role": "user", "time": {"created": 1740830400000i64}})
                .to_string()],
        )
        .unwrap();
        conn.execute(
            "INSERT INTO part (id, message_id, session_id, data) VALUES ('p-1', 'm-1', 's-1', ?1)",
            [json!({"id": "p-1", "type": "text", "text": "hello from the db"}).to_string()],
        )
        .unwrap();
        drop(conn);

        let adapter = OpencodeAdapter::with_root(root.path().to_path_buf());
        let sessions = adapter.list_sessions(None).unwrap();
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].id, "s-1");
        assert_eq!(sessions[0].message_count, Some(1));

        let captured = adapter.capture("s-1").unwrap();
        assert_eq!(captured.conversation.messages[0].content, "hello from the db");
    }

    #[test]
    fn test_missing_session_everywhere() {
        let root = TempDir::new().unwrap();
        seed_tree(root.path(), "known");
        let adapter = OpencodeAdapter::with_root(root.path().to_path_buf());
        assert!(matches!(
            adapter.capture("unknown"),
            Err(Error::SessionNotFound(_))
        ));
    }
}
