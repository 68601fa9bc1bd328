//! Configuration loading and management
//!
//! Configuration is loaded from `~/.config/braindump/config.toml`
//!
//! This module follows the XDG Base Directory Specification:
//! - Config: `$XDG_CONFIG_HOME/braindump/` (~/.config/braindump/)
//! - State/Logs: `$XDG_STATE_HOME/braindump/` (~/.local/state/braindump/)

use crate::error::{Error, Result};
use crate::types::Agent;
use serde::Deserialize;
use std::path::PathBuf;

/// Returns a best-effort home directory path.
fn home_dir() -> PathBuf {
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Returns XDG_CONFIG_HOME or ~/.config
fn xdg_config_home() -> PathBuf {
    std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".config"))
}

/// Returns XDG_STATE_HOME or ~/.local/state
fn xdg_state_home() -> PathBuf {
    std::env::var("XDG_STATE_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".local/state"))
}

/// Main configuration struct
#[derive(Debug, Deserialize, Default)]
pub struct Config {
    /// Agent storage-root overrides
    #[serde(default)]
    pub agents: AgentOverrides,

    /// Watcher configuration
    #[serde(default)]
    pub watch: WatchConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Override paths for agent storage directories
#[derive(Debug, Clone, Deserialize, Default)]
pub struct AgentOverrides {
    pub claude_code_path: Option<PathBuf>,
    pub cursor_path: Option<PathBuf>,
    pub codex_path: Option<PathBuf>,
    pub copilot_path: Option<PathBuf>,
    pub gemini_path: Option<PathBuf>,
    pub opencode_path: Option<PathBuf>,
    pub droid_path: Option<PathBuf>,
}

impl AgentOverrides {
    /// Configured override for one agent, if any.
    pub fn path_for(&self, agent: Agent) -> Option<&PathBuf> {
        match agent {
            Agent::ClaudeCode => self.claude_code_path.as_ref(),
            Agent::Cursor => self.cursor_path.as_ref(),
            Agent::Codex => self.codex_path.as_ref(),
            Agent::Copilot => self.copilot_path.as_ref(),
            Agent::Gemini => self.gemini_path.as_ref(),
            Agent::Opencode => self.opencode_path.as_ref(),
            Agent::Droid => self.droid_path.as_ref(),
        }
    }
}

/// Watcher configuration
#[derive(Debug, Deserialize)]
pub struct WatchConfig {
    /// Poll interval in milliseconds
    #[serde(default = "default_watch_interval_ms")]
    pub interval_ms: u64,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_watch_interval_ms(),
        }
    }
}

fn default_watch_interval_ms() -> u64 {
    30_000
}

/// Logging configuration
#[derive(Debug, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Config {
    /// Load configuration from the default path
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path();

        if !config_path.exists() {
            tracing::debug!("No config file found at {:?}, using defaults", config_path);
            return Ok(Config::default());
        }

        Self::load_from(&config_path)
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &PathBuf) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("failed to read config file {:?}: {}", path, e)))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| Error::Config(format!("failed to parse config: {}", e)))?;

        Ok(config)
    }

    /// Returns the default config file path
    ///
    /// `$XDG_CONFIG_HOME/braindump/config.toml`
    pub fn config_path() -> PathBuf {
        xdg_config_home().join("braindump").join("config.toml")
    }

    /// Returns the state directory path (for logs)
    ///
    /// `$XDG_STATE_HOME/braindump/`
    pub fn state_dir() -> PathBuf {
        xdg_state_home().join("braindump")
    }

    /// Returns the log file path
    pub fn log_path() -> PathBuf {
        Self::state_dir().join("braindump.log")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.watch.interval_ms, 30_000);
        assert_eq!(config.logging.level, "info");
        assert!(config.agents.claude_code_path.is_none());
    }

    #[test]
    fn test_parse_config() {
        let toml = r#"
[agents]
claude_code_path = "/tmp/claude"
droid_path = "/tmp/factory"

[watch]
interval_ms = 5000

[logging]
level = "debug"
"#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(
            config.agents.path_for(Agent::ClaudeCode),
            Some(&PathBuf::from("/tmp/claude"))
        );
        assert_eq!(
            config.agents.path_for(Agent::Droid),
            Some(&PathBuf::from("/tmp/factory"))
        );
        assert!(config.agents.path_for(Agent::Gemini).is_none());
        assert_eq!(config.watch.interval_ms, 5000);
        assert_eq!(config.logging.level, "debug");
    }
}
