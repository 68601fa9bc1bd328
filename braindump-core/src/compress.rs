//! Priority-layer compression engine
//!
//! The handoff document is assembled from eight fixed layers. The three
//! highest-priority layers are always emitted; the rest are packed greedily
//! under the token budget with monotonic inclusion: once a layer overflows,
//! it and every lower-priority layer are dropped.

use crate::registry;
use crate::tokens::estimate_tokens;
use crate::types::{CapturedSession, ConversationMessage};

pub const LAYER_TASK_STATE: &str = "TASK STATE";
pub const LAYER_ACTIVE_FILES: &str = "ACTIVE FILES";
pub const LAYER_DECISIONS: &str = "DECISIONS & BLOCKERS";
pub const LAYER_PROJECT_CONTEXT: &str = "PROJECT CONTEXT";
pub const LAYER_TOOL_ACTIVITY: &str = "TOOL ACTIVITY";
pub const LAYER_SESSION_OVERVIEW: &str = "SESSION OVERVIEW";
pub const LAYER_RECENT_MESSAGES: &str = "RECENT MESSAGES";
pub const LAYER_FULL_HISTORY: &str = "FULL HISTORY";

/// Layers with priority at or below this value are always included.
const ALWAYS_INCLUDED_PRIORITY: f32 = 3.0;
const RECENT_MESSAGE_COUNT: usize = 20;
const RECENT_MESSAGE_CHARS: usize = 400;
const HISTORY_MESSAGE_CHARS: usize = 120;

/// One prioritized section of the handoff document.
#[derive(Debug, Clone)]
pub struct Layer {
    pub name: &'static str,
    pub priority: f32,
    pub content: String,
    pub tokens: usize,
}

impl Layer {
    fn new(name: &'static str, priority: f32, content: String) -> Self {
        let tokens = estimate_tokens(&content);
        Self {
            name,
            priority,
            content,
            tokens,
        }
    }
}

/// Outcome of packing layers under a budget.
#[derive(Debug)]
pub struct CompressionResult {
    /// Included layers, in emission order
    pub layers: Vec<Layer>,
    /// Names of dropped layers, in priority order
    pub dropped: Vec<&'static str>,
    /// Token total across included layers
    pub total_tokens: usize,
    /// The budget the packing ran under
    pub budget: usize,
}

impl CompressionResult {
    pub fn included_names(&self) -> Vec<&'static str> {
        self.layers.iter().map(|l| l.name).collect()
    }
}

/// Build all eight layers for a session.
pub fn build_layers(session: &CapturedSession) -> Vec<Layer> {
    vec![
        Layer::new(LAYER_TASK_STATE, 1.0, task_state_content(session)),
        Layer::new(LAYER_ACTIVE_FILES, 2.0, active_files_content(session)),
        Layer::new(LAYER_DECISIONS, 3.0, decisions_content(session)),
        Layer::new(LAYER_PROJECT_CONTEXT, 4.0, project_content(session)),
        Layer::new(LAYER_TOOL_ACTIVITY, 4.5, tool_activity_content(session)),
        Layer::new(LAYER_SESSION_OVERVIEW, 5.0, overview_content(session)),
        Layer::new(LAYER_RECENT_MESSAGES, 6.0, recent_messages_content(session)),
        Layer::new(LAYER_FULL_HISTORY, 7.0, full_history_content(session)),
    ]
}

/// Pack the session's layers under a token budget.
///
/// Priorities 1-3 are always emitted regardless of budget overrun. The
/// remaining layers are included while they fit; the first overflow drops
/// that layer and every layer below it.
pub fn compress(session: &CapturedSession, budget: usize) -> CompressionResult {
    let mut layers = build_layers(session);
    layers.sort_by(|a, b| a.priority.partial_cmp(&b.priority).expect("finite priorities"));

    let mut included = Vec::new();
    let mut dropped = Vec::new();
    let mut total_tokens = 0usize;
    let mut overflowed = false;

    for layer in layers {
        if layer.priority <= ALWAYS_INCLUDED_PRIORITY {
            total_tokens += layer.tokens;
            included.push(layer);
            continue;
        }
        if overflowed || layer.tokens > budget.saturating_sub(total_tokens) {
            overflowed = true;
            dropped.push(layer.name);
            continue;
        }
        total_tokens += layer.tokens;
        included.push(layer);
    }

    CompressionResult {
        layers: included,
        dropped,
        total_tokens,
        budget,
    }
}

/// Pack for a named target, resolving the budget from the registry unless
/// overridden.
pub fn compress_for_target(
    session: &CapturedSession,
    target: &str,
    budget_override: Option<usize>,
) -> CompressionResult {
    let budget = budget_override.unwrap_or_else(|| registry::budget_for_target(target));
    compress(session, budget)
}

// ============================================
// Layer content builders
// ============================================

fn bullet_list(entries: &[String]) -> String {
    entries
        .iter()
        .map(|e| format!("- {}", e))
        .collect::<Vec<_>>()
        .join("\n")
}

fn task_state_content(session: &CapturedSession) -> String {
    let task = &session.task;
    let mut out = format!("Task: {}", task.description);
    if let Some(ref in_progress) = task.in_progress {
        out.push_str(&format!("\nIn progress: {}", in_progress));
    }
    if !task.completed.is_empty() {
        out.push_str("\n\nCompleted:\n");
        out.push_str(&bullet_list(&task.completed));
    }
    if !task.remaining.is_empty() {
        out.push_str("\n\nRemaining:\n");
        out.push_str(&bullet_list(&task.remaining));
    }
    if !task.blockers.is_empty() {
        out.push_str("\n\nBlockers:\n");
        out.push_str(&bullet_list(&task.blockers));
    }
    out
}

fn active_files_content(session: &CapturedSession) -> String {
    if session.file_changes.is_empty() {
        return "No file changes recorded.".to_string();
    }
    session
        .file_changes
        .iter()
        .map(|change| {
            let mut line = format!("- [{}] {}", change.change_type.as_str(), change.path);
            if let Some(ref language) = change.language {
                line.push_str(&format!(" ({})", language));
            }
            if let Some(ref diff) = change.diff {
                line.push_str(&format!(" {}", diff));
            }
            line
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn decisions_content(session: &CapturedSession) -> String {
    let mut out = String::new();
    if !session.decisions.is_empty() {
        out.push_str("Decisions:\n");
        out.push_str(&bullet_list(&session.decisions));
    }
    if !session.blockers.is_empty() {
        if !out.is_empty() {
            out.push_str("\n\n");
        }
        out.push_str("Blockers:\n");
        out.push_str(&bullet_list(&session.blockers));
    }
    if out.is_empty() {
        out.push_str("No decisions or blockers recorded.");
    }
    out
}

fn project_content(session: &CapturedSession) -> String {
    let project = &session.project;
    let mut out = format!("Path: {}", project.path.display());
    if let Some(ref name) = project.name {
        out.push_str(&format!("\nName: {}", name));
    }
    if let Some(ref branch) = project.git_branch {
        out.push_str(&format!("\nBranch: {}", branch));
    }
    if let Some(ref status) = project.git_status {
        out.push_str(&format!("\n\nGit status:\n{}", status));
    }
    if !project.git_log.is_empty() {
        out.push_str(&format!("\n\nRecent commits:\n{}", project.git_log.join("\n")));
    }
    if let Some(ref tree) = project.tree {
        out.push_str(&format!("\n\nStructure:\n{}", tree));
    }
    if let Some(ref memory) = project.memory {
        out.push_str(&format!("\n\nProject memory:\n{}", memory));
    }
    out
}

fn tool_activity_content(session: &CapturedSession) -> String {
    let Some(ref activity) = session.tool_activity else {
        return "No tool activity recorded.".to_string();
    };
    activity
        .iter()
        .map(|entry| {
            let mut line = format!("- {}: {} calls", entry.tool.as_str(), entry.count);
            if !entry.samples.is_empty() {
                line.push_str(&format!(" (e.g. {})", entry.samples.join("; ")));
            }
            line
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn overview_content(session: &CapturedSession) -> String {
    let mut out = format!(
        "Source: {}\nSession: {}\nMessages: {}\nEstimated tokens: {}",
        session.source.display_name(),
        session.session_id,
        session.conversation.message_count,
        session.conversation.estimated_tokens,
    );
    if let Some(started) = session.session_started_at {
        out.push_str(&format!("\nStarted: {}", started.to_rfc3339()));
    }
    out.push_str(&format!("\nCaptured: {}", session.captured_at.to_rfc3339()));
    out
}

fn format_message(message: &ConversationMessage, max_chars: usize) -> String {
    let text = message.content.replace('\n', " ");
    let text = crate::adapters::util::truncate_with_ellipsis(text.trim(), max_chars);
    match message.tool_name {
        Some(ref tool) => format!("{} [{}]: {}", message.role.as_str(), tool, text),
        None => format!("{}: {}", message.role.as_str(), text),
    }
}

fn recent_messages_content(session: &CapturedSession) -> String {
    let messages = &session.conversation.messages;
    let start = messages.len().saturating_sub(RECENT_MESSAGE_COUNT);
    if messages[start..].is_empty() {
        return "No messages recorded.".to_string();
    }
    messages[start..]
        .iter()
        .map(|m| format_message(m, RECENT_MESSAGE_CHARS))
        .collect::<Vec<_>>()
        .join("\n")
}

fn full_history_content(session: &CapturedSession) -> String {
    let messages = &session.conversation.messages;
    let end = messages.len().saturating_sub(RECENT_MESSAGE_COUNT);
    if messages[..end].is_empty() {
        return "No earlier messages.".to_string();
    }
    messages[..end]
        .iter()
        .map(|m| format_message(m, HISTORY_MESSAGE_CHARS))
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::*;
    use chrono::Utc;
    use std::path::PathBuf;

    fn mock_session() -> CapturedSession {
        let messages: Vec<ConversationMessage> = (0..30)
            .map(|i| ConversationMessage {
                role: if i % 2 == 0 { Role::User } else { Role::Assistant },
                content: format!(
                    "message number {} discussing the widget build, the failing checks, \
                     the retry strategy, and enough surrounding detail that the recent \
                     message layers outweigh a small token budget on their own",
                    i
                ),
                tool_name: None,
                timestamp: None,
            })
            .collect();
        CapturedSession {
            version: SCHEMA_VERSION.to_string(),
            source: Agent::ClaudeCode,
            captured_at: Utc::now(),
            session_id: "mock-1".to_string(),
            session_started_at: None,
            project: ProjectInfo {
                path: PathBuf::from("/tmp/mock"),
                name: Some("mock".to_string()),
                git_branch: Some("main".to_string()),
                git_status: Some("M src/lib.rs".to_string()),
                git_log: vec!["abc123 initial".to_string()],
                tree: Some("src/\n  lib.rs".to_string()),
                memory: None,
            },
            conversation: Conversation {
                message_count: messages.len(),
                estimated_tokens: 1234,
                messages,
            },
            file_changes: vec![FileChange {
                path: "src/lib.rs".to_string(),
                change_type: ChangeType::Modified,
                diff: None,
                language: Some("rs".to_string()),
            }],
            decisions: vec!["decided to keep the trait object registry".to_string()],
            blockers: vec![],
            task: TaskState {
                description: "Build the widget".to_string(),
                completed: vec!["scaffolding".to_string()],
                remaining: vec!["tests".to_string()],
                in_progress: Some("wiring the API".to_string()),
                blockers: vec![],
            },
            tool_activity: Some(vec![ToolActivity {
                tool: ToolClass::Edit,
                count: 4,
                samples: vec!["src/lib.rs".to_string()],
            }]),
        }
    }

    #[test]
    fn test_unbounded_budget_includes_all_eight() {
        let result = compress(&mock_session(), usize::MAX);
        assert_eq!(result.layers.len(), 8);
        assert!(result.dropped.is_empty());
    }

    #[test]
    fn test_zero_budget_keeps_priorities_one_to_three() {
        let result = compress(&mock_session(), 0);
        assert_eq!(
            result.included_names(),
            vec![LAYER_TASK_STATE, LAYER_ACTIVE_FILES, LAYER_DECISIONS]
        );
        assert_eq!(result.dropped.len(), 5);
    }

    #[test]
    fn test_small_budget_drops_layers_but_keeps_task_state() {
        let result = compress(&mock_session(), 600);
        assert!(!result.dropped.is_empty());
        assert!(result.included_names().contains(&LAYER_TASK_STATE));
    }

    #[test]
    fn test_large_budget_includes_everything() {
        let result = compress(&mock_session(), 100_000);
        assert_eq!(result.layers.len(), 8);
        for name in [
            LAYER_TASK_STATE,
            LAYER_ACTIVE_FILES,
            LAYER_DECISIONS,
            LAYER_PROJECT_CONTEXT,
            LAYER_SESSION_OVERVIEW,
            LAYER_RECENT_MESSAGES,
            LAYER_FULL_HISTORY,
        ] {
            assert!(result.included_names().contains(&name), "missing {}", name);
        }
    }

    #[test]
    fn test_inclusion_is_monotone_in_budget() {
        let session = mock_session();
        let mut previous: Option<Vec<&'static str>> = None;
        for budget in [0usize, 100, 300, 600, 1000, 5000, 100_000] {
            let names = compress(&session, budget).included_names();
            if let Some(ref smaller) = previous {
                for name in smaller {
                    assert!(names.contains(name), "budget growth removed {}", name);
                }
            }
            previous = Some(names);
        }
    }

    #[test]
    fn test_included_tokens_respect_budget() {
        let session = mock_session();
        for budget in [0usize, 200, 600, 2000] {
            let result = compress(&session, budget);
            let floor: usize = result
                .layers
                .iter()
                .filter(|l| l.priority <= ALWAYS_INCLUDED_PRIORITY)
                .map(|l| l.tokens)
                .sum();
            assert!(result.total_tokens <= budget.max(floor));
        }
    }

    #[test]
    fn test_drop_is_monotonic_across_priorities() {
        // Force an overflow at PROJECT CONTEXT and require everything below
        // it to be dropped as well.
        let session = mock_session();
        let layers = build_layers(&session);
        let floor: usize = layers.iter().take(3).map(|l| l.tokens).sum();
        let project_tokens = layers
            .iter()
            .find(|l| l.name == LAYER_PROJECT_CONTEXT)
            .unwrap()
            .tokens;
        let result = compress(&session, floor + project_tokens.saturating_sub(1));
        assert_eq!(result.included_names().len(), 3);
        assert_eq!(result.dropped.first(), Some(&LAYER_PROJECT_CONTEXT));
        assert_eq!(result.dropped.len(), 5);
    }
}
