//! Canonical data model for braindump
//!
//! Every supported agent persists sessions in its own on-disk format. The
//! adapter layer normalizes all of them into [`CapturedSession`], the single
//! record the rest of the pipeline (analysis, compression, prompt assembly)
//! consumes.
//!
//! ## Terminology
//!
//! | Term | Definition |
//! |------|------------|
//! | **Agent** | A coding-assistant product whose session state lives on the local filesystem |
//! | **Session** | One continuous conversation recorded by an agent |
//! | **Capture** | Reading a session and normalizing it to the canonical record |
//! | **Handoff** | The end-to-end transformation from captured session to delivered prompt |
//!
//! The canonical record serializes camelCase because `.handoff/session.json`
//! is consumed by non-Rust tooling.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Schema version stamped into every captured session.
pub const SCHEMA_VERSION: &str = "1.0";

// ============================================
// Agent identifiers
// ============================================

/// Supported coding agents (products, not models).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Agent {
    ClaudeCode,
    Cursor,
    Codex,
    Copilot,
    Gemini,
    Opencode,
    Droid,
}

impl Agent {
    /// All seven supported agents, in registry order.
    pub const ALL: [Agent; 7] = [
        Agent::ClaudeCode,
        Agent::Cursor,
        Agent::Codex,
        Agent::Copilot,
        Agent::Gemini,
        Agent::Opencode,
        Agent::Droid,
    ];

    /// Returns the identifier used on the wire and in the CLI
    pub fn as_str(&self) -> &'static str {
        match self {
            Agent::ClaudeCode => "claude-code",
            Agent::Cursor => "cursor",
            Agent::Codex => "codex",
            Agent::Copilot => "copilot",
            Agent::Gemini => "gemini",
            Agent::Opencode => "opencode",
            Agent::Droid => "droid",
        }
    }

    /// Returns the display name for this agent
    pub fn display_name(&self) -> &'static str {
        match self {
            Agent::ClaudeCode => "Claude Code",
            Agent::Cursor => "Cursor",
            Agent::Codex => "Codex",
            Agent::Copilot => "GitHub Copilot CLI",
            Agent::Gemini => "Gemini CLI",
            Agent::Opencode => "OpenCode",
            Agent::Droid => "Factory Droid",
        }
    }
}

impl std::fmt::Display for Agent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Agent {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "claude-code" | "claude_code" | "claude" => Ok(Agent::ClaudeCode),
            "cursor" => Ok(Agent::Cursor),
            "codex" => Ok(Agent::Codex),
            "copilot" => Ok(Agent::Copilot),
            "gemini" => Ok(Agent::Gemini),
            "opencode" => Ok(Agent::Opencode),
            "droid" | "factory" => Ok(Agent::Droid),
            _ => Err(format!("unknown agent: {}", s)),
        }
    }
}

// ============================================
// Session listings
// ============================================

/// Summary of a discoverable session, as returned by `list_sessions`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionInfo {
    /// Session identifier (adapter-specific shape)
    pub id: String,
    /// When the session started, if recorded
    pub started_at: Option<DateTime<Utc>>,
    /// Most recent activity timestamp, if recorded
    pub last_active_at: Option<DateTime<Utc>>,
    /// Number of conversation messages, if cheap to determine
    pub message_count: Option<usize>,
    /// Working directory the session ran in
    pub project_path: Option<PathBuf>,
    /// First-user-message preview, at most 200 printable characters
    pub preview: Option<String>,
}

// ============================================
// Conversation
// ============================================

/// Role of a conversation message author.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
    Tool,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::System => "system",
            Role::Tool => "tool",
        }
    }
}

/// One normalized conversation message.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationMessage {
    pub role: Role,
    /// Message text; may be empty (e.g. tool-only turns)
    #[serde(default)]
    pub content: String,
    /// Present iff role is tool, or a tool-use block was flattened here
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

/// The conversation block of a captured session.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    pub message_count: usize,
    /// Token usage summed from the source log, or a character-based estimate
    pub estimated_tokens: usize,
    pub messages: Vec<ConversationMessage>,
}

// ============================================
// File changes
// ============================================

/// How a file was touched during the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeType {
    Created,
    Modified,
    Deleted,
}

impl ChangeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeType::Created => "created",
            ChangeType::Modified => "modified",
            ChangeType::Deleted => "deleted",
        }
    }
}

/// A file the session created, modified, or deleted.
///
/// File changes are keyed by path; a later tool call on the same path
/// replaces the earlier entry (last write wins).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileChange {
    pub path: String,
    pub change_type: ChangeType,
    /// Diff summary or content excerpt, when the source log carries one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diff: Option<String>,
    /// Language tag inferred from the filename extension
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
}

// ============================================
// Tool activity
// ============================================

/// Canonical tool classes every agent's tool names collapse into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ToolClass {
    Edit,
    Read,
    Bash,
    #[serde(rename = "MCP")]
    Mcp,
    Tool,
}

impl ToolClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            ToolClass::Edit => "Edit",
            ToolClass::Read => "Read",
            ToolClass::Bash => "Bash",
            ToolClass::Mcp => "MCP",
            ToolClass::Tool => "Tool",
        }
    }

    /// Map an agent-specific tool name onto a canonical class.
    pub fn classify(tool_name: &str) -> ToolClass {
        let lower = tool_name.to_lowercase();
        if lower.starts_with("mcp__") || lower.contains("mcp") {
            ToolClass::Mcp
        } else if lower.contains("edit")
            || lower.contains("write")
            || lower.contains("create")
            || lower.contains("patch")
        {
            ToolClass::Edit
        } else if lower.contains("read") || lower.contains("view") || lower.contains("cat") {
            ToolClass::Read
        } else if lower.contains("bash")
            || lower.contains("shell")
            || lower.contains("exec")
            || lower.contains("terminal")
            || lower.contains("command")
        {
            ToolClass::Bash
        } else {
            ToolClass::Tool
        }
    }
}

/// Aggregated usage of one tool class across a session.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolActivity {
    pub tool: ToolClass,
    pub count: usize,
    /// Up to three short argument samples
    pub samples: Vec<String>,
}

// ============================================
// Project context
// ============================================

/// Repository metadata attached by the project enricher.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectInfo {
    pub path: PathBuf,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub git_branch: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub git_status: Option<String>,
    /// Last ten commit one-lines, most recent first
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub git_log: Vec<String>,
    /// Depth-2 directory skeleton, capped at 40 lines
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tree: Option<String>,
    /// Memory-file excerpt, at most 2000 characters
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory: Option<String>,
}

impl ProjectInfo {
    /// A bare project block for a path that could not be enriched.
    pub fn bare(path: PathBuf) -> Self {
        Self {
            path,
            name: None,
            git_branch: None,
            git_status: None,
            git_log: Vec::new(),
            tree: None,
            memory: None,
        }
    }
}

// ============================================
// Task state
// ============================================

/// Heuristically extracted task state.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskState {
    pub description: String,
    pub completed: Vec<String>,
    pub remaining: Vec<String>,
    /// What the session was doing when captured, at most 200 characters
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub in_progress: Option<String>,
    pub blockers: Vec<String>,
}

// ============================================
// Captured session
// ============================================

/// The canonical session record, schema version [`SCHEMA_VERSION`].
///
/// Created by an adapter's capture operation, validated immediately, and
/// immutable for downstream consumers.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CapturedSession {
    pub version: String,
    pub source: Agent,
    pub captured_at: DateTime<Utc>,
    pub session_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_started_at: Option<DateTime<Utc>>,
    pub project: ProjectInfo,
    pub conversation: Conversation,
    pub file_changes: Vec<FileChange>,
    pub decisions: Vec<String>,
    pub blockers: Vec<String>,
    pub task: TaskState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_activity: Option<Vec<ToolActivity>>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_agent_roundtrip() {
        for agent in Agent::ALL {
            assert_eq!(Agent::from_str(agent.as_str()).unwrap(), agent);
        }
        assert!(Agent::from_str("aider").is_err());
    }

    #[test]
    fn test_agent_serde_uses_kebab_case() {
        let json = serde_json::to_string(&Agent::ClaudeCode).unwrap();
        assert_eq!(json, "\"claude-code\"");
        let back: Agent = serde_json::from_str("\"opencode\"").unwrap();
        assert_eq!(back, Agent::Opencode);
    }

    #[test]
    fn test_tool_class_classify() {
        assert_eq!(ToolClass::classify("Write"), ToolClass::Edit);
        assert_eq!(ToolClass::classify("str_replace_editor"), ToolClass::Edit);
        assert_eq!(ToolClass::classify("Read"), ToolClass::Read);
        assert_eq!(ToolClass::classify("run_shell_command"), ToolClass::Bash);
        assert_eq!(ToolClass::classify("mcp__linear__create_issue"), ToolClass::Mcp);
        assert_eq!(ToolClass::classify("WebSearch"), ToolClass::Tool);
    }

    #[test]
    fn test_captured_session_serializes_camel_case() {
        let session = CapturedSession {
            version: SCHEMA_VERSION.to_string(),
            source: Agent::Droid,
            captured_at: Utc::now(),
            session_id: "slug:uuid".to_string(),
            session_started_at: None,
            project: ProjectInfo::bare(PathBuf::from("/tmp/p")),
            conversation: Conversation {
                message_count: 0,
                estimated_tokens: 0,
                messages: vec![],
            },
            file_changes: vec![],
            decisions: vec![],
            blockers: vec![],
            task: TaskState::default(),
            tool_activity: None,
        };
        let value = serde_json::to_value(&session).unwrap();
        assert_eq!(value["sessionId"], "slug:uuid");
        assert!(value["conversation"]["messageCount"].is_number());
        assert_eq!(value["source"], "droid");
    }
}
