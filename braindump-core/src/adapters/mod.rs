//! Adapter framework
//!
//! Each supported agent persists sessions in its own on-disk format:
//! line-delimited JSON (claude-code, codex, droid), a single JSON document
//! per session (gemini), a structured-text metadata file paired with
//! line-delimited events (copilot), or a relational store (cursor, opencode).
//! An adapter normalizes its format into the canonical [`CapturedSession`].
//!
//! ## Design
//!
//! Adapters expose a small capability set ([`Adapter`]) and are registered in
//! [`create_all_adapters`]. Shared primitives (role/path/timestamp
//! normalization, dedup lists, the capture protocol) live in [`util`] and are
//! composed by each adapter; there is no base type.
//!
//! Adapters never write back to agent storage.

pub mod claude_code;
pub mod codex;
pub mod copilot;
pub mod cursor;
pub mod droid;
pub mod gemini;
pub mod opencode;
pub mod util;

pub use claude_code::ClaudeCodeAdapter;
pub use codex::CodexAdapter;
pub use copilot::CopilotAdapter;
pub use cursor::CursorAdapter;
pub use droid::DroidAdapter;
pub use gemini::GeminiAdapter;
pub use opencode::OpencodeAdapter;

use crate::config::AgentOverrides;
use crate::error::{Error, Result};
use crate::types::{Agent, CapturedSession, SessionInfo};
use std::path::Path;

/// Capability set every agent adapter implements.
pub trait Adapter: Send + Sync {
    /// Which agent this adapter reads
    fn agent(&self) -> Agent;

    /// True when the agent's storage root exists and contains at least one
    /// artifact recognizable as a session.
    fn detect(&self) -> bool;

    /// All discoverable sessions in last-active-descending order, optionally
    /// filtered to those whose recorded working directory path-equals the
    /// argument.
    fn list_sessions(&self, project: Option<&Path>) -> Result<Vec<SessionInfo>>;

    /// Read the full session into the canonical record.
    ///
    /// Fails with [`Error::SessionNotFound`] when the identifier is unknown
    /// and [`Error::ParseFailure`] when the primary artifact cannot be read
    /// or decoded at all; individual malformed records are skipped.
    fn capture(&self, session_id: &str) -> Result<CapturedSession>;

    /// Capture the most recently active session.
    fn capture_latest(&self, project: Option<&Path>) -> Result<CapturedSession> {
        let sessions = self.list_sessions(project)?;
        let first = sessions
            .first()
            .ok_or_else(|| Error::NoSessions(self.agent().to_string()))?;
        self.capture(&first.id)
    }
}

/// Construct the adapter for one agent at its default storage root.
pub fn adapter_for(agent: Agent) -> Box<dyn Adapter> {
    match agent {
        Agent::ClaudeCode => Box::new(ClaudeCodeAdapter::new()),
        Agent::Cursor => Box::new(CursorAdapter::new()),
        Agent::Codex => Box::new(CodexAdapter::new()),
        Agent::Copilot => Box::new(CopilotAdapter::new()),
        Agent::Gemini => Box::new(GeminiAdapter::new()),
        Agent::Opencode => Box::new(OpencodeAdapter::new()),
        Agent::Droid => Box::new(DroidAdapter::new()),
    }
}

/// Construct all seven adapters in registry order.
pub fn create_all_adapters() -> Vec<Box<dyn Adapter>> {
    Agent::ALL.iter().map(|a| adapter_for(*a)).collect()
}

/// Construct the adapter for one agent, honoring a configured storage-root
/// override.
pub fn adapter_for_with_overrides(agent: Agent, overrides: &AgentOverrides) -> Box<dyn Adapter> {
    match overrides.path_for(agent) {
        Some(root) => adapter_with_root(agent, root.clone()),
        None => adapter_for(agent),
    }
}

/// Construct all adapters, honoring configured storage-root overrides.
pub fn create_adapters_with_overrides(overrides: &AgentOverrides) -> Vec<Box<dyn Adapter>> {
    Agent::ALL
        .iter()
        .map(|&agent| adapter_for_with_overrides(agent, overrides))
        .collect()
}

/// Construct an adapter rooted at an explicit storage path.
pub fn adapter_with_root(agent: Agent, root: std::path::PathBuf) -> Box<dyn Adapter> {
    match agent {
        Agent::ClaudeCode => Box::new(ClaudeCodeAdapter::with_root(root)),
        Agent::Cursor => Box::new(CursorAdapter::with_root(root)),
        Agent::Codex => Box::new(CodexAdapter::with_root(root)),
        Agent::Copilot => Box::new(CopilotAdapter::with_root(root)),
        Agent::Gemini => Box::new(GeminiAdapter::with_root(root)),
        Agent::Opencode => Box::new(OpencodeAdapter::with_root(root)),
        Agent::Droid => Box::new(DroidAdapter::with_root(root)),
    }
}

/// Agents whose storage is present on this machine.
pub fn detect_agents(overrides: &AgentOverrides) -> Vec<Agent> {
    create_adapters_with_overrides(overrides)
        .iter()
        .filter(|a| a.detect())
        .map(|a| a.agent())
        .collect()
}

/// The first detected agent that has at least one session, used when the
/// source is not given explicitly.
pub fn detect_source(overrides: &AgentOverrides) -> Result<Agent> {
    for adapter in create_adapters_with_overrides(overrides) {
        if adapter.detect() {
            return Ok(adapter.agent());
        }
    }
    Err(Error::NotDetected(
        "no supported agent has session storage on this machine".to_string(),
    ))
}
