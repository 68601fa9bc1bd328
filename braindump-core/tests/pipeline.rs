//! End-to-end pipeline tests: capture -> compress -> assemble -> write.

use braindump_core::adapters::{Adapter, ClaudeCodeAdapter};
use braindump_core::compress::{self, LAYER_FULL_HISTORY, LAYER_TASK_STATE};
use braindump_core::handoff;
use braindump_core::prompt;
use braindump_core::registry::FILE_TARGET_BUDGET;
use std::path::PathBuf;
use tempfile::TempDir;

fn fixture_root(agent: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests/fixtures")
        .join(agent)
}

#[test]
fn test_capture_compress_assemble() {
    let adapter = ClaudeCodeAdapter::with_root(fixture_root("claude-code"));
    let session = adapter.capture("sess-express").unwrap();

    let result = compress::compress_for_target(&session, "claude-code", None);
    assert_eq!(result.budget, 100_000);
    assert!(result.included_names().contains(&LAYER_TASK_STATE));

    let doc = prompt::assemble(&session, &result, "claude-code");
    assert!(doc.starts_with("# Session Handoff: Claude Code (sess-express)"));
    assert!(doc.contains("## TASK STATE"));
    assert!(doc.contains("Set up an Express REST API with a /health endpoint"));
    assert!(doc.contains("src/index.ts"));
    assert!(doc.contains("## Instructions for Claude Code"));
}

#[test]
fn test_budget_override_resolution() {
    let adapter = ClaudeCodeAdapter::with_root(fixture_root("claude-code"));
    let session = adapter.capture("sess-express").unwrap();

    let generic = compress::compress_for_target(&session, "file", None);
    assert_eq!(generic.budget, FILE_TARGET_BUDGET);

    let tight = compress::compress_for_target(&session, "file", Some(10));
    assert_eq!(tight.budget, 10);
    assert!(tight.dropped.contains(&LAYER_FULL_HISTORY));
}

#[test]
fn test_write_session_json_artifact() {
    let adapter = ClaudeCodeAdapter::with_root(fixture_root("claude-code"));
    let mut session = adapter.capture("sess-express").unwrap();

    // point the project at a scratch directory the test owns
    let dir = TempDir::new().unwrap();
    session.project.path = dir.path().to_path_buf();

    let path = handoff::write_session_json(&session).unwrap();
    assert!(path.ends_with(".handoff/session.json"));

    let raw = std::fs::read_to_string(&path).unwrap();
    let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
    assert_eq!(value["version"], "1.0");
    assert_eq!(value["source"], "claude-code");
    assert_eq!(value["sessionId"], "sess-express");
    assert_eq!(value["conversation"]["messageCount"], 10);
}

#[test]
fn test_assembled_document_is_writable_resume() {
    let adapter = ClaudeCodeAdapter::with_root(fixture_root("claude-code"));
    let session = adapter.capture("sess-express").unwrap();
    let result = compress::compress_for_target(&session, "file", None);
    let doc = prompt::assemble(&session, &result, "file");

    let dir = TempDir::new().unwrap();
    let out = dir.path().join(".handoff").join("RESUME.md");
    std::fs::create_dir_all(out.parent().unwrap()).unwrap();
    std::fs::write(&out, &doc).unwrap();

    let read_back = std::fs::read_to_string(&out).unwrap();
    assert_eq!(read_back, doc);
}
