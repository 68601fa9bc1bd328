//! Handoff prompt assembly
//!
//! Renders the included compression layers into the final handoff document:
//! a title banner naming the source session, one `##` section per layer in
//! emission order, and a target-specific footer. Oversized documents are
//! delivered as a short reference prompt pointing at the written file.

use crate::compress::CompressionResult;
use crate::registry;
use crate::types::{Agent, CapturedSession};
use std::path::Path;

/// Documents beyond this size are delivered by reference instead of inline.
pub const MAX_INLINE_PROMPT_CHARS: usize = 50_000;

/// Build the handoff document for a target.
pub fn assemble(session: &CapturedSession, result: &CompressionResult, target: &str) -> String {
    let mut out = format!(
        "# Session Handoff: {} ({})\n\n\
         This document captures an in-progress coding session so another agent\n\
         can continue the work. Read it top to bottom; the most important\n\
         context comes first.\n",
        session.source.display_name(),
        session.session_id,
    );

    for layer in &result.layers {
        out.push_str(&format!("\n## {}\n\n{}\n", layer.name, layer.content));
    }

    out.push_str("\n---\n\n");
    out.push_str(&footer_for(target));
    out.push('\n');
    out
}

/// Target-keyed footer instructions.
fn footer_for(target: &str) -> String {
    match target.parse::<Agent>() {
        Ok(agent) => {
            let spec = registry::spec_for(agent);
            let memory = spec.memory_files.first().copied().unwrap_or("AGENTS.md");
            format!(
                "## Instructions for {}\n\n\
                 Pick up where the session above left off. Start from the task\n\
                 state and the in-progress step, verify the active files match\n\
                 the working tree, and respect the decisions already made.\n\
                 Durable context worth keeping belongs in `{}`.",
                spec.display_name, memory
            )
        }
        Err(_) => "## Instructions\n\n\
                   Pick up where the session above left off. Start from the task\n\
                   state and the in-progress step, verify the active files match\n\
                   the working tree, and respect the decisions already made."
            .to_string(),
    }
}

/// Short prompt instructing the consumer to open the written document.
pub fn reference_prompt(path: &Path) -> String {
    format!(
        "Continue the in-progress coding session described in `{}`.\n\
         Read that file first; it contains the task state, active files, and\n\
         decisions. Then resume from the in-progress step.",
        path.display()
    )
}

/// The text to hand to a launched tool: the document itself, or a reference
/// prompt when it exceeds the inline limit.
pub fn delivery_prompt(document: &str, written_path: &Path) -> String {
    if document.chars().count() > MAX_INLINE_PROMPT_CHARS {
        reference_prompt(written_path)
    } else {
        document.to_string()
    }
}
