//! Delivery integrations: clipboard copy and target-tool launch.
//!
//! Both are best-effort shells around platform utilities. A failed clipboard
//! copy is a warning, never a pipeline failure; a failed launch surfaces to
//! the caller.

use anyhow::{anyhow, Context, Result};
use braindump_core::prompt;
use braindump_core::Agent;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

/// Prompts beyond this size are handed over via a reference file.
pub const MAX_LAUNCH_PROMPT_BYTES: usize = 50 * 1024;

/// Reference file written next to the project when the prompt is oversized.
pub const REFERENCE_FILE: &str = ".braindump-handoff.md";

/// Copy text to the system clipboard via the platform utility.
fn clipboard_commands() -> Vec<(&'static str, Vec<&'static str>)> {
    if cfg!(target_os = "macos") {
        vec![("pbcopy", vec![])]
    } else if cfg!(windows) {
        vec![("clip", vec![])]
    } else {
        vec![
            ("wl-copy", vec![]),
            ("xclip", vec!["-selection", "clipboard"]),
            ("xsel", vec!["--clipboard", "--input"]),
        ]
    }
}

pub fn copy_to_clipboard(text: &str) -> Result<()> {
    let mut last_error = anyhow!("no clipboard utility available");

    for (program, args) in clipboard_commands() {
        let spawned = Command::new(program)
            .args(&args)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn();
        let mut child = match spawned {
            Ok(child) => child,
            Err(e) => {
                last_error = anyhow!("{}: {}", program, e);
                continue;
            }
        };
        if let Some(ref mut stdin) = child.stdin {
            if let Err(e) = stdin.write_all(text.as_bytes()) {
                last_error = anyhow!("{}: {}", program, e);
                continue;
            }
        }
        drop(child.stdin.take());
        match child.wait() {
            Ok(status) if status.success() => return Ok(()),
            Ok(status) => last_error = anyhow!("{} exited with {}", program, status),
            Err(e) => last_error = anyhow!("{}: {}", program, e),
        }
    }

    Err(last_error)
}

/// CLI binary for a launch target.
fn launch_binary(agent: Agent) -> &'static str {
    match agent {
        Agent::ClaudeCode => "claude",
        Agent::Cursor => "cursor-agent",
        Agent::Codex => "codex",
        Agent::Copilot => "copilot",
        Agent::Gemini => "gemini",
        Agent::Opencode => "opencode",
        Agent::Droid => "droid",
    }
}

/// Launch the target tool with the resume text as its prompt argument.
///
/// When the text exceeds 50 KB, a reference file is written into the project
/// and the tool is invoked with a short "read this file" prompt instead.
pub fn launch_target(target: &str, resume_text: &str, project: &Path) -> Result<()> {
    let agent: Agent = target
        .parse()
        .map_err(|_| anyhow!("target {:?} is not a launchable agent", target))?;

    let prompt_text = if resume_text.len() > MAX_LAUNCH_PROMPT_BYTES {
        let reference_path: PathBuf = project.join(REFERENCE_FILE);
        std::fs::write(&reference_path, resume_text)
            .with_context(|| format!("failed to write {}", reference_path.display()))?;
        prompt::reference_prompt(&reference_path)
    } else {
        resume_text.to_string()
    };

    let binary = launch_binary(agent);
    tracing::info!(binary, "launching target tool");
    let status = Command::new(binary)
        .arg(prompt_text)
        .current_dir(project)
        .status()
        .with_context(|| format!("failed to launch {}", binary))?;

    if !status.success() {
        return Err(anyhow!("{} exited with {}", binary, status));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_launch_rejects_non_agent_targets() {
        let err = launch_target("file", "text", Path::new("/tmp")).unwrap_err();
        assert!(err.to_string().contains("not a launchable agent"));
    }
}
