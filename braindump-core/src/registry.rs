//! Agent registry: per-agent metadata and storage locations
//!
//! The registry is process-wide immutable configuration. Storage roots are a
//! pure function of the platform class and the environment, resolved once per
//! adapter instance; tests override them with `with_root`.

use crate::types::Agent;
use std::path::PathBuf;

/// Token budget used for the generic `file` / `clipboard` targets.
pub const FILE_TARGET_BUDGET: usize = 19_000;

/// Platform classes with distinct storage conventions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    Unix,
    MacOs,
    Windows,
}

impl Platform {
    /// The platform class this process is running on.
    pub fn current() -> Self {
        if cfg!(target_os = "macos") {
            Platform::MacOs
        } else if cfg!(windows) {
            Platform::Windows
        } else {
            Platform::Unix
        }
    }
}

/// Static metadata for one supported agent.
#[derive(Debug, Clone, Copy)]
pub struct AgentSpec {
    pub agent: Agent,
    pub display_name: &'static str,
    /// Nominal context window of the agent's default model, in tokens
    pub context_window: usize,
    /// Conservative share of the window reserved for the handoff document
    pub usable_tokens: usize,
    /// Memory files the agent reads from a project root
    pub memory_files: &'static [&'static str],
}

const SPECS: [AgentSpec; 7] = [
    AgentSpec {
        agent: Agent::ClaudeCode,
        display_name: "Claude Code",
        context_window: 200_000,
        usable_tokens: 100_000,
        memory_files: &["CLAUDE.md", ".claude/CLAUDE.md"],
    },
    AgentSpec {
        agent: Agent::Cursor,
        display_name: "Cursor",
        context_window: 128_000,
        usable_tokens: 60_000,
        memory_files: &[".cursorrules"],
    },
    AgentSpec {
        agent: Agent::Codex,
        display_name: "Codex",
        context_window: 200_000,
        usable_tokens: 100_000,
        memory_files: &["AGENTS.md"],
    },
    AgentSpec {
        agent: Agent::Copilot,
        display_name: "GitHub Copilot CLI",
        context_window: 128_000,
        usable_tokens: 60_000,
        memory_files: &[".github/copilot-instructions.md"],
    },
    AgentSpec {
        agent: Agent::Gemini,
        display_name: "Gemini CLI",
        context_window: 1_000_000,
        usable_tokens: 200_000,
        memory_files: &["GEMINI.md"],
    },
    AgentSpec {
        agent: Agent::Opencode,
        display_name: "OpenCode",
        context_window: 200_000,
        usable_tokens: 100_000,
        memory_files: &["AGENTS.md"],
    },
    AgentSpec {
        agent: Agent::Droid,
        display_name: "Factory Droid",
        context_window: 200_000,
        usable_tokens: 100_000,
        memory_files: &["AGENTS.md"],
    },
];

/// All registry entries, in canonical order.
pub fn all_specs() -> &'static [AgentSpec] {
    &SPECS
}

/// Registry entry for one agent.
pub fn spec_for(agent: Agent) -> &'static AgentSpec {
    SPECS
        .iter()
        .find(|s| s.agent == agent)
        .expect("registry covers every agent")
}

/// Token budget for a handoff target.
///
/// Targets are agent identifiers or the generic `"file"` / `"clipboard"`;
/// anything unrecognized gets the generic file budget.
pub fn budget_for_target(target: &str) -> usize {
    target
        .parse::<Agent>()
        .map(|a| spec_for(a).usable_tokens)
        .unwrap_or(FILE_TARGET_BUDGET)
}

/// Returns a best-effort home directory path.
fn home_dir() -> Option<PathBuf> {
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .or_else(dirs::home_dir)
}

/// Default storage root for an agent on the given platform.
///
/// Most agents keep a dot-directory under the home directory on every
/// platform; Cursor follows its editor's per-platform application-support
/// layout, and OpenCode uses the XDG data directory.
pub fn storage_root(agent: Agent, platform: Platform) -> Option<PathBuf> {
    let home = home_dir()?;
    let root = match agent {
        Agent::ClaudeCode => home.join(".claude"),
        Agent::Codex => home.join(".codex"),
        Agent::Copilot => home.join(".copilot"),
        Agent::Gemini => home.join(".gemini"),
        Agent::Droid => home.join(".factory"),
        Agent::Cursor => match platform {
            Platform::Unix => home.join(".config/Cursor/User"),
            Platform::MacOs => home.join("Library/Application Support/Cursor/User"),
            Platform::Windows => std::env::var_os("APPDATA")
                .map(PathBuf::from)
                .unwrap_or_else(|| home.join("AppData/Roaming"))
                .join("Cursor/User"),
        },
        Agent::Opencode => match platform {
            Platform::Unix | Platform::MacOs => std::env::var_os("XDG_DATA_HOME")
                .map(PathBuf::from)
                .unwrap_or_else(|| home.join(".local/share"))
                .join("opencode"),
            Platform::Windows => std::env::var_os("LOCALAPPDATA")
                .map(PathBuf::from)
                .unwrap_or_else(|| home.join("AppData/Local"))
                .join("opencode"),
        },
    };
    Some(root)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_covers_all_agents() {
        assert_eq!(all_specs().len(), Agent::ALL.len());
        for agent in Agent::ALL {
            let spec = spec_for(agent);
            assert_eq!(spec.agent, agent);
            assert!(spec.usable_tokens <= spec.context_window);
            assert!(!spec.memory_files.is_empty());
        }
    }

    #[test]
    fn test_budget_for_target() {
        assert_eq!(budget_for_target("claude-code"), 100_000);
        assert_eq!(budget_for_target("gemini"), 200_000);
        assert_eq!(budget_for_target("file"), FILE_TARGET_BUDGET);
        assert_eq!(budget_for_target("clipboard"), FILE_TARGET_BUDGET);
        assert_eq!(budget_for_target("something-else"), FILE_TARGET_BUDGET);
    }

    #[test]
    fn test_unix_storage_roots_are_dot_dirs() {
        for (agent, suffix) in [
            (Agent::ClaudeCode, ".claude"),
            (Agent::Codex, ".codex"),
            (Agent::Copilot, ".copilot"),
            (Agent::Gemini, ".gemini"),
            (Agent::Droid, ".factory"),
        ] {
            let root = storage_root(agent, Platform::Unix).unwrap();
            assert!(root.ends_with(suffix), "{agent}: {}", root.display());
        }
    }
}
