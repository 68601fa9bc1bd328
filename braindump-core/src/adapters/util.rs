//! Shared adapter primitives
//!
//! Role normalization, path equality, timestamp parsing, typed JSON
//! extractors, deduplicating list building, tool classing, and the shared
//! capture protocol all live here. Adapters compose these helpers rather than
//! inheriting a base type; none of them carries per-agent knowledge.

use crate::analyze;
use crate::enrich;
use crate::error::Result;
use crate::tokens::estimate_tokens;
use crate::types::{
    Agent, CapturedSession, ChangeType, Conversation, ConversationMessage, FileChange, Role,
    SessionInfo, TaskState, ToolActivity, ToolClass, SCHEMA_VERSION,
};
use crate::validate;
use chrono::{DateTime, TimeZone, Utc};
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path, PathBuf};

const MAX_IN_PROGRESS_CHARS: usize = 200;
const MAX_PREVIEW_CHARS: usize = 200;
const MAX_TOOL_SAMPLES: usize = 3;
const MAX_SAMPLE_CHARS: usize = 80;

// ============================================
// Role normalization
// ============================================

/// Map a source role string onto the closed canonical role set.
///
/// `model` is Gemini's assistant, `human` appears in exported transcripts;
/// anything unrecognized defaults to assistant as the safe choice.
pub fn normalize_role(raw: &str) -> Role {
    match raw.trim().to_lowercase().as_str() {
        "user" | "human" => Role::User,
        "system" => Role::System,
        "tool" => Role::Tool,
        _ => Role::Assistant,
    }
}

// ============================================
// Path equality
// ============================================

/// Canonical comparison key for a filesystem path.
///
/// Normalizes separators to forward slashes, resolves relative paths against
/// the process working directory, strips a trailing slash, and lowercases.
pub fn normalize_path_key(path: &Path) -> String {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .map(|cwd| cwd.join(path))
            .unwrap_or_else(|_| path.to_path_buf())
    };
    let mut key = absolute.to_string_lossy().replace('\\', "/");
    while key.len() > 1 && key.ends_with('/') {
        key.pop();
    }
    key.to_lowercase()
}

/// Separator-, case-, and relative-form-insensitive path equality.
pub fn paths_equal(a: &Path, b: &Path) -> bool {
    normalize_path_key(a) == normalize_path_key(b)
}

// ============================================
// Timestamp parsing
// ============================================

/// Parse an RFC 3339 timestamp string.
pub fn parse_timestamp_str(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
        .or_else(|| {
            // Some agents omit the zone suffix; treat naive stamps as UTC
            chrono::NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
                .ok()
                .map(|naive| Utc.from_utc_datetime(&naive))
        })
}

/// Parse a timestamp out of a heterogeneous JSON value.
///
/// Accepts RFC 3339 strings, epoch seconds, and epoch milliseconds.
pub fn parse_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::String(s) => parse_timestamp_str(s),
        Value::Number(n) => {
            let n = n.as_f64()?;
            if n <= 0.0 {
                return None;
            }
            // Anything past the year 33658 in seconds is really milliseconds
            if n >= 1e12 {
                Utc.timestamp_millis_opt(n as i64).single()
            } else {
                Utc.timestamp_opt(n as i64, 0).single()
            }
        }
        _ => None,
    }
}

// ============================================
// Typed JSON extractors
// ============================================

/// First non-empty string found under any of the given keys.
pub fn first_str<'a>(value: &'a Value, keys: &[&str]) -> Option<&'a str> {
    keys.iter()
        .filter_map(|k| value.get(k))
        .filter_map(Value::as_str)
        .find(|s| !s.trim().is_empty())
}

/// Coerce a JSON number or numeric string to i64.
pub fn to_number(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Parse a string that may itself carry JSON (tool arguments are often
/// double-encoded); falls back to a plain string value.
pub fn json_or_string(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

/// Flatten a heterogeneous content value (string, block, or block list)
/// into plain text.
pub fn value_to_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Array(items) => items
            .iter()
            .map(value_to_text)
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join("\n"),
        Value::Object(_) => first_str(value, &["text", "content", "message", "output"])
            .map(str::to_string)
            .unwrap_or_default(),
        _ => String::new(),
    }
}

// ============================================
// Dedup list
// ============================================

/// Build-order-preserving deduplicator on trimmed strings.
///
/// Blank entries are discarded; the first occurrence of a string wins.
#[derive(Debug, Default)]
pub struct DedupList {
    seen: HashSet<String>,
    items: Vec<String>,
}

impl DedupList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, entry: impl AsRef<str>) {
        let trimmed = entry.as_ref().trim();
        if trimmed.is_empty() {
            return;
        }
        if self.seen.insert(trimmed.to_string()) {
            self.items.push(trimmed.to_string());
        }
    }

    pub fn extend<I: IntoIterator<Item = S>, S: AsRef<str>>(&mut self, entries: I) {
        for entry in entries {
            self.push(entry);
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn into_vec(self) -> Vec<String> {
        self.items
    }
}

// ============================================
// Text shaping
// ============================================

/// Hard-truncate to at most `max` characters, on a char boundary.
pub fn truncate_chars(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        s.chars().take(max).collect()
    }
}

/// Truncate with a trailing ellipsis, total length at most `max` characters.
pub fn truncate_with_ellipsis(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}

/// First non-blank line, control characters stripped, at most 200 characters.
pub fn preview_text(s: &str) -> Option<String> {
    let line = s.lines().find(|l| !l.trim().is_empty())?;
    let printable: String = line.chars().filter(|c| !c.is_control()).collect();
    let trimmed = printable.trim();
    if trimmed.is_empty() {
        return None;
    }
    Some(truncate_chars(trimmed, MAX_PREVIEW_CHARS))
}

// ============================================
// Session ordering
// ============================================

fn cmp_instants_desc(a: Option<DateTime<Utc>>, b: Option<DateTime<Utc>>) -> Ordering {
    match (a, b) {
        (Some(x), Some(y)) => y.cmp(&x),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

/// Sort sessions by last-active-at descending, ties by started-at descending;
/// sessions without timestamps sort last.
pub fn sort_sessions(sessions: &mut [SessionInfo]) {
    sessions.sort_by(|a, b| {
        cmp_instants_desc(a.last_active_at, b.last_active_at)
            .then_with(|| cmp_instants_desc(a.started_at, b.started_at))
    });
}

// ============================================
// File-change derivation
// ============================================

/// Change type implied by a tool name: create/write tools create, delete and
/// remove tools delete, everything else modifies.
pub fn change_type_for_tool(tool_name: &str) -> ChangeType {
    let lower = tool_name.to_lowercase();
    if lower.contains("delete") || lower.contains("remove") {
        ChangeType::Deleted
    } else if lower.contains("create") || lower.contains("write") {
        ChangeType::Created
    } else {
        ChangeType::Modified
    }
}

const LANGUAGE_EXTENSIONS: &[&str] = &[
    "rs", "ts", "tsx", "js", "jsx", "mjs", "py", "go", "rb", "java", "kt", "swift", "c", "h",
    "cpp", "hpp", "cs", "php", "sh", "sql", "html", "css", "scss", "json", "yaml", "yml", "toml",
    "md",
];

/// Language tag inferred from the filename extension, when recognized.
pub fn language_for_path(path: &str) -> Option<String> {
    let ext = Path::new(path).extension()?.to_str()?.to_lowercase();
    LANGUAGE_EXTENSIONS
        .contains(&ext.as_str())
        .then_some(ext)
}

/// File path mentioned in tool arguments, under any of the common key names.
pub fn tool_file_path(input: &Value) -> Option<String> {
    first_str(
        input,
        &["file_path", "filePath", "path", "target_file", "targetFile", "filename", "fileName"],
    )
    .map(str::to_string)
}

/// Short human-readable preview of tool arguments for activity samples.
pub fn tool_arg_preview(input: &Value) -> Option<String> {
    first_str(
        input,
        &["command", "file_path", "filePath", "path", "pattern", "query", "description", "prompt"],
    )
    .map(|s| truncate_with_ellipsis(s.lines().next().unwrap_or(s), MAX_SAMPLE_CHARS))
}

/// Ordered, path-keyed file-change set. Last upsert for a path wins while the
/// first-insertion order is preserved.
#[derive(Debug, Default)]
pub struct FileChangeSet {
    order: Vec<String>,
    map: HashMap<String, FileChange>,
}

impl FileChangeSet {
    pub fn upsert(&mut self, change: FileChange) {
        if change.path.trim().is_empty() {
            return;
        }
        if !self.map.contains_key(&change.path) {
            self.order.push(change.path.clone());
        }
        self.map.insert(change.path.clone(), change);
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn into_vec(mut self) -> Vec<FileChange> {
        self.order
            .iter()
            .filter_map(|path| self.map.remove(path))
            .collect()
    }
}

// ============================================
// Tool activity
// ============================================

/// Accumulates per-class tool counts and up to three argument samples.
#[derive(Debug, Default)]
pub struct ToolActivityCollector {
    counts: BTreeMap<ToolClass, (usize, Vec<String>)>,
}

impl ToolActivityCollector {
    pub fn record(&mut self, tool_name: &str, sample: Option<String>) {
        let entry = self
            .counts
            .entry(ToolClass::classify(tool_name))
            .or_insert((0, Vec::new()));
        entry.0 += 1;
        if let Some(sample) = sample {
            if entry.1.len() < MAX_TOOL_SAMPLES && !sample.trim().is_empty() {
                entry.1.push(sample);
            }
        }
    }

    /// Finish into a count-descending activity list; `None` when no tool ran.
    pub fn finish(self) -> Option<Vec<ToolActivity>> {
        if self.counts.is_empty() {
            return None;
        }
        let mut activity: Vec<ToolActivity> = self
            .counts
            .into_iter()
            .map(|(tool, (count, samples))| ToolActivity {
                tool,
                count,
                samples,
            })
            .collect();
        activity.sort_by(|a, b| b.count.cmp(&a.count).then(a.tool.cmp(&b.tool)));
        Some(activity)
    }
}

// ============================================
// Shared capture protocol
// ============================================

/// Accumulates one session's normalized state during capture and finishes it
/// into a validated [`CapturedSession`].
///
/// Adapters stream their primary artifact into this builder: text blocks,
/// tool uses and results, thought blocks, usage counters, and the detected
/// working directory. `finish` runs the conversation analyzer and project
/// enricher, assembles the task block, and validates the record.
#[derive(Debug)]
pub struct CaptureBuilder {
    agent: Agent,
    session_id: String,
    messages: Vec<ConversationMessage>,
    file_changes: FileChangeSet,
    tools: ToolActivityCollector,
    thoughts: Vec<String>,
    usage_tokens: usize,
    started_at: Option<DateTime<Utc>>,
    last_assistant_text: Option<String>,
    in_progress: Option<String>,
    completed: Vec<String>,
    remaining: Vec<String>,
    blockers: Vec<String>,
    project_path: Option<PathBuf>,
}

impl CaptureBuilder {
    pub fn new(agent: Agent, session_id: impl Into<String>) -> Self {
        Self {
            agent,
            session_id: session_id.into(),
            messages: Vec::new(),
            file_changes: FileChangeSet::default(),
            tools: ToolActivityCollector::default(),
            thoughts: Vec::new(),
            usage_tokens: 0,
            started_at: None,
            last_assistant_text: None,
            in_progress: None,
            completed: Vec::new(),
            remaining: Vec::new(),
            blockers: Vec::new(),
            project_path: None,
        }
    }

    /// Record the session's working directory (first detection wins).
    pub fn set_project_path(&mut self, path: impl Into<PathBuf>) {
        if self.project_path.is_none() {
            self.project_path = Some(path.into());
        }
    }

    pub fn project_path(&self) -> Option<&Path> {
        self.project_path.as_deref()
    }

    /// Record an explicit session start time (first call wins).
    pub fn set_started_at(&mut self, at: DateTime<Utc>) {
        if self.started_at.is_none() {
            self.started_at = Some(at);
        }
    }

    /// The first observed event timestamp doubles as session-started-at.
    pub fn observe_timestamp(&mut self, at: Option<DateTime<Utc>>) {
        if let (None, Some(at)) = (self.started_at, at) {
            self.started_at = Some(at);
        }
    }

    /// Append a plain text message.
    pub fn push_text(&mut self, role: Role, text: &str, timestamp: Option<DateTime<Utc>>) {
        self.observe_timestamp(timestamp);
        if role == Role::Assistant && !text.trim().is_empty() {
            self.last_assistant_text = Some(text.to_string());
        }
        self.messages.push(ConversationMessage {
            role,
            content: text.to_string(),
            tool_name: None,
            timestamp,
        });
    }

    /// Flatten a tool-use block: appends a `tool` message carrying the
    /// serialized arguments, records an activity sample, and upserts a file
    /// change when the arguments name a path.
    pub fn push_tool_use(
        &mut self,
        tool_name: &str,
        input: &Value,
        timestamp: Option<DateTime<Utc>>,
    ) {
        self.observe_timestamp(timestamp);
        self.tools.record(tool_name, tool_arg_preview(input));

        if let Some(path) = tool_file_path(input) {
            let change_type = change_type_for_tool(tool_name);
            let language = language_for_path(&path);
            self.file_changes.upsert(FileChange {
                path,
                change_type,
                diff: None,
                language,
            });
        }

        let content = serde_json::to_string(input).unwrap_or_default();
        self.messages.push(ConversationMessage {
            role: Role::Tool,
            content,
            tool_name: Some(tool_name.to_string()),
            timestamp,
        });
    }

    /// Append a tool-result message following a tool use.
    pub fn push_tool_result(
        &mut self,
        tool_name: Option<&str>,
        content: String,
        timestamp: Option<DateTime<Utc>>,
    ) {
        self.observe_timestamp(timestamp);
        self.messages.push(ConversationMessage {
            role: Role::Tool,
            content,
            tool_name: tool_name.map(str::to_string),
            timestamp,
        });
    }

    /// Record reasoning/thought text; it feeds the decision list.
    pub fn push_thought(&mut self, text: &str) {
        let trimmed = text.trim();
        if !trimmed.is_empty() {
            self.thoughts.push(trimmed.to_string());
        }
    }

    /// Upsert a file change derived outside the tool-use path (e.g. a diff
    /// summary carried by the source log).
    pub fn upsert_file_change(&mut self, change: FileChange) {
        self.file_changes.upsert(change);
    }

    /// Accumulate token usage from a per-message or global usage block.
    pub fn add_usage(&mut self, input: Option<i64>, output: Option<i64>, cache_creation: Option<i64>) {
        let total = input.unwrap_or(0) + output.unwrap_or(0) + cache_creation.unwrap_or(0);
        if total > 0 {
            self.usage_tokens += total as usize;
        }
    }

    /// Explicit in-progress description (e.g. droid todo state); overrides the
    /// last-assistant-text fallback.
    pub fn set_in_progress(&mut self, text: &str) {
        let trimmed = text.trim();
        if !trimmed.is_empty() {
            self.in_progress = Some(truncate_chars(trimmed, MAX_IN_PROGRESS_CHARS));
        }
    }

    /// Replace the explicit task lists (latest todo state wins wholesale).
    pub fn set_task_lists(&mut self, completed: Vec<String>, remaining: Vec<String>) {
        self.completed = completed;
        self.remaining = remaining;
    }

    pub fn add_blocker(&mut self, text: &str) {
        let trimmed = text.trim();
        if !trimmed.is_empty() {
            self.blockers.push(trimmed.to_string());
        }
    }

    pub fn message_count(&self) -> usize {
        self.messages.len()
    }

    /// Finish the capture: enrich the project, analyze the conversation,
    /// assemble the task block, and validate the canonical record.
    pub fn finish(self) -> Result<CapturedSession> {
        let project_path = self
            .project_path
            .clone()
            .or_else(|| std::env::current_dir().ok())
            .unwrap_or_else(|| PathBuf::from("."));
        let project = enrich::enrich_project(&project_path);

        let analysis = analyze::analyze(&self.messages, &self.thoughts);

        let mut completed = DedupList::new();
        completed.extend(self.completed.iter());
        completed.extend(analysis.completed.iter());

        let mut remaining = DedupList::new();
        remaining.extend(self.remaining.iter());

        let mut blockers = DedupList::new();
        blockers.extend(self.blockers.iter());
        blockers.extend(analysis.blockers.iter());
        let blockers = blockers.into_vec();

        let in_progress = self.in_progress.or_else(|| {
            self.last_assistant_text
                .as_deref()
                .and_then(preview_text)
                .map(|s| truncate_chars(&s, MAX_IN_PROGRESS_CHARS))
        });

        let estimated_tokens = if self.usage_tokens > 0 {
            self.usage_tokens
        } else {
            self.messages
                .iter()
                .map(|m| estimate_tokens(&m.content))
                .sum()
        };

        let session = CapturedSession {
            version: SCHEMA_VERSION.to_string(),
            source: self.agent,
            captured_at: Utc::now(),
            session_id: self.session_id,
            session_started_at: self.started_at,
            project,
            conversation: Conversation {
                message_count: self.messages.len(),
                estimated_tokens,
                messages: self.messages,
            },
            file_changes: self.file_changes.into_vec(),
            decisions: analysis.decisions,
            blockers: blockers.clone(),
            task: TaskState {
                description: analysis.task_description,
                completed: completed.into_vec(),
                remaining: remaining.into_vec(),
                in_progress,
                blockers,
            },
            tool_activity: self.tools.finish(),
        };

        validate::validate(&session)?;
        Ok(session)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_normalize_role() {
        assert_eq!(normalize_role("user"), Role::User);
        assert_eq!(normalize_role("human"), Role::User);
        assert_eq!(normalize_role("model"), Role::Assistant);
        assert_eq!(normalize_role("assistant"), Role::Assistant);
        assert_eq!(normalize_role("system"), Role::System);
        assert_eq!(normalize_role("tool"), Role::Tool);
        assert_eq!(normalize_role("weird-thing"), Role::Assistant);
    }

    #[test]
    fn test_paths_equal_normalizes() {
        assert!(paths_equal(
            Path::new("/Home/User/Project/"),
            Path::new("/home/user/project")
        ));
        assert!(!paths_equal(Path::new("/a/b"), Path::new("/a/c")));
    }

    #[test]
    fn test_parse_timestamp_variants() {
        let iso = parse_timestamp(&json!("2025-03-01T12:00:00Z")).unwrap();
        assert_eq!(iso.timestamp(), 1740830400);
        let secs = parse_timestamp(&json!(1740830400)).unwrap();
        assert_eq!(secs, iso);
        let millis = parse_timestamp(&json!(1740830400000i64)).unwrap();
        assert_eq!(millis, iso);
        assert!(parse_timestamp(&json!(null)).is_none());
    }

    #[test]
    fn test_dedup_list_preserves_first_occurrence() {
        let mut list = DedupList::new();
        list.push("  alpha ");
        list.push("beta");
        list.push("alpha");
        list.push("   ");
        assert_eq!(list.into_vec(), vec!["alpha", "beta"]);
    }

    #[test]
    fn test_change_type_for_tool() {
        assert_eq!(change_type_for_tool("Write"), ChangeType::Created);
        assert_eq!(change_type_for_tool("create_file"), ChangeType::Created);
        assert_eq!(change_type_for_tool("delete_file"), ChangeType::Deleted);
        assert_eq!(change_type_for_tool("Edit"), ChangeType::Modified);
    }

    #[test]
    fn test_language_for_path() {
        assert_eq!(language_for_path("src/index.ts").as_deref(), Some("ts"));
        assert_eq!(language_for_path("lib/util.rs").as_deref(), Some("rs"));
        assert_eq!(language_for_path("Makefile"), None);
    }

    #[test]
    fn test_file_change_set_last_write_wins() {
        let mut set = FileChangeSet::default();
        set.upsert(FileChange {
            path: "a.rs".into(),
            change_type: ChangeType::Created,
            diff: None,
            language: Some("rs".into()),
        });
        set.upsert(FileChange {
            path: "b.rs".into(),
            change_type: ChangeType::Created,
            diff: None,
            language: Some("rs".into()),
        });
        set.upsert(FileChange {
            path: "a.rs".into(),
            change_type: ChangeType::Deleted,
            diff: None,
            language: Some("rs".into()),
        });
        let changes = set.into_vec();
        assert_eq!(changes.len(), 2);
        assert_eq!(changes[0].path, "a.rs");
        assert_eq!(changes[0].change_type, ChangeType::Deleted);
        assert_eq!(changes[1].path, "b.rs");
    }

    #[test]
    fn test_sort_sessions_missing_timestamps_last() {
        let at = |secs: i64| Utc.timestamp_opt(secs, 0).single();
        let mut sessions = vec![
            SessionInfo {
                id: "old".into(),
                started_at: at(100),
                last_active_at: at(100),
                message_count: None,
                project_path: None,
                preview: None,
            },
            SessionInfo {
                id: "untimed".into(),
                started_at: None,
                last_active_at: None,
                message_count: None,
                project_path: None,
                preview: None,
            },
            SessionInfo {
                id: "new".into(),
                started_at: at(200),
                last_active_at: at(900),
                message_count: None,
                project_path: None,
                preview: None,
            },
        ];
        sort_sessions(&mut sessions);
        let ids: Vec<_> = sessions.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["new", "old", "untimed"]);
    }

    #[test]
    fn test_builder_flattens_tool_use() {
        let mut builder = CaptureBuilder::new(Agent::ClaudeCode, "sess");
        builder.set_project_path(std::env::temp_dir());
        builder.push_text(Role::User, "please write the file", None);
        builder.push_tool_use(
            "Write",
            &json!({"file_path": "src/main.rs", "content": "fn main() {}"}),
            None,
        );
        builder.push_tool_result(Some("Write"), "ok".to_string(), None);
        let session = builder.finish().unwrap();

        assert_eq!(session.conversation.message_count, 3);
        assert_eq!(session.conversation.messages[1].role, Role::Tool);
        assert_eq!(
            session.conversation.messages[1].tool_name.as_deref(),
            Some("Write")
        );
        assert_eq!(session.file_changes.len(), 1);
        assert_eq!(session.file_changes[0].path, "src/main.rs");
        assert_eq!(session.file_changes[0].change_type, ChangeType::Created);
        assert_eq!(session.file_changes[0].language.as_deref(), Some("rs"));
        let activity = session.tool_activity.unwrap();
        assert_eq!(activity[0].tool, ToolClass::Edit);
        assert_eq!(activity[0].count, 1);
    }

    #[test]
    fn test_builder_usage_beats_estimate() {
        let mut builder = CaptureBuilder::new(Agent::Codex, "sess");
        builder.set_project_path(std::env::temp_dir());
        builder.push_text(Role::User, "hi", None);
        builder.add_usage(Some(100), Some(50), Some(25));
        builder.add_usage(Some(10), None, None);
        let session = builder.finish().unwrap();
        assert_eq!(session.conversation.estimated_tokens, 185);
    }
}
