//! Schema validation for captured sessions
//!
//! Every [`CapturedSession`] crossing the pipeline is validated right after
//! capture. Validation is structural: it checks the invariants the schema
//! promises to downstream consumers, not the plausibility of the content.

use crate::error::{Error, Result};
use crate::types::{CapturedSession, SCHEMA_VERSION};
use std::collections::HashSet;

const MAX_IN_PROGRESS_CHARS: usize = 200;
const MAX_MEMORY_CHARS: usize = 2000;

/// Validate a captured session against the `"1.0"` schema.
pub fn validate(session: &CapturedSession) -> Result<()> {
    if session.version != SCHEMA_VERSION {
        return Err(Error::SchemaInvalid(format!(
            "unsupported schema version {:?}, expected {:?}",
            session.version, SCHEMA_VERSION
        )));
    }

    if session.session_id.trim().is_empty() {
        return Err(Error::SchemaInvalid("empty session id".to_string()));
    }

    let conv = &session.conversation;
    if conv.message_count != conv.messages.len() {
        return Err(Error::SchemaInvalid(format!(
            "messageCount {} does not match {} messages",
            conv.message_count,
            conv.messages.len()
        )));
    }

    let mut seen_paths = HashSet::new();
    for change in &session.file_changes {
        if change.path.trim().is_empty() {
            return Err(Error::SchemaInvalid("file change with empty path".to_string()));
        }
        if !seen_paths.insert(change.path.as_str()) {
            return Err(Error::SchemaInvalid(format!(
                "duplicate file change path {:?}",
                change.path
            )));
        }
    }

    check_dedup_list("decisions", &session.decisions)?;
    check_dedup_list("task.remaining", &session.task.remaining)?;

    if let Some(ref in_progress) = session.task.in_progress {
        if in_progress.chars().count() > MAX_IN_PROGRESS_CHARS {
            return Err(Error::SchemaInvalid(format!(
                "task.inProgress exceeds {} characters",
                MAX_IN_PROGRESS_CHARS
            )));
        }
    }

    if let Some(ref memory) = session.project.memory {
        if memory.chars().count() > MAX_MEMORY_CHARS {
            return Err(Error::SchemaInvalid(format!(
                "project.memory exceeds {} characters",
                MAX_MEMORY_CHARS
            )));
        }
    }

    Ok(())
}

/// Deduplicated lists must hold non-blank, trim-unique entries.
fn check_dedup_list(field: &str, entries: &[String]) -> Result<()> {
    let mut seen = HashSet::new();
    for entry in entries {
        let trimmed = entry.trim();
        if trimmed.is_empty() {
            return Err(Error::SchemaInvalid(format!("blank entry in {}", field)));
        }
        if !seen.insert(trimmed) {
            return Err(Error::SchemaInvalid(format!(
                "duplicate entry in {}: {:?}",
                field, trimmed
            )));
        }
    }
    Ok(())
}
