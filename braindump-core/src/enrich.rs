//! Project enrichment
//!
//! Collects repository metadata for the project block: package name, git
//! branch/status/log, a shallow directory skeleton, and memory-file
//! contents. Every collector tolerates failure and contributes nothing on
//! error; enrichment never aborts a capture.

use crate::types::ProjectInfo;
use std::path::Path;
use std::process::Command;

const TREE_EXCLUSIONS: &[&str] = &["node_modules", ".git", ".next", "dist", "__pycache__", ".venv"];
const MAX_TREE_LINES: usize = 40;
const MAX_TREE_DEPTH: usize = 2;
const MAX_MEMORY_CHARS: usize = 2000;
const MAX_STATUS_LINES: usize = 20;
const MEMORY_FILES: &[&str] = &["CLAUDE.md", ".claude/CLAUDE.md"];

/// Build the project block for a working directory.
pub fn enrich_project(path: &Path) -> ProjectInfo {
    let mut info = ProjectInfo::bare(path.to_path_buf());

    info.name = package_name(path).or_else(|| {
        path.file_name()
            .and_then(|n| n.to_str())
            .map(str::to_string)
    });

    info.git_branch = git_output(path, &["rev-parse", "--abbrev-ref", "HEAD"])
        .and_then(|out| out.lines().next().map(str::to_string));

    info.git_status = git_output(path, &["status", "--short"]).and_then(|out| {
        let lines: Vec<&str> = out.lines().take(MAX_STATUS_LINES).collect();
        if lines.is_empty() {
            None
        } else {
            Some(lines.join("\n"))
        }
    });

    info.git_log = git_output(path, &["log", "--oneline", "-10"])
        .map(|out| out.lines().map(str::to_string).collect())
        .unwrap_or_default();

    info.tree = directory_tree(path);
    info.memory = memory_excerpt(path);

    info
}

/// Project name from `package.json`, when present and parseable.
fn package_name(path: &Path) -> Option<String> {
    let content = std::fs::read_to_string(path.join("package.json")).ok()?;
    let value: serde_json::Value = serde_json::from_str(&content).ok()?;
    value
        .get("name")
        .and_then(|n| n.as_str())
        .map(str::to_string)
}

/// Run git in the project directory, returning stdout on success.
fn git_output(path: &Path, args: &[&str]) -> Option<String> {
    let output = Command::new("git")
        .arg("-C")
        .arg(path)
        .args(args)
        .output()
        .ok()?;
    if !output.status.success() {
        tracing::debug!(args = ?args, "git invocation failed");
        return None;
    }
    let text = String::from_utf8_lossy(&output.stdout).trim_end().to_string();
    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}

/// Depth-2 directory skeleton: directories before files, both alphabetized,
/// a fixed exclusion set, capped at 40 lines.
fn directory_tree(path: &Path) -> Option<String> {
    let mut lines = Vec::new();
    walk(path, 0, &mut lines);
    if lines.is_empty() {
        None
    } else {
        Some(lines.join("\n"))
    }
}

fn walk(dir: &Path, depth: usize, lines: &mut Vec<String>) {
    if depth >= MAX_TREE_DEPTH || lines.len() >= MAX_TREE_LINES {
        return;
    }
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(_) => return,
    };

    let mut dirs = Vec::new();
    let mut files = Vec::new();
    for entry in entries.flatten() {
        let name = entry.file_name().to_string_lossy().to_string();
        if TREE_EXCLUSIONS.contains(&name.as_str()) {
            continue;
        }
        match entry.file_type() {
            Ok(ft) if ft.is_dir() => dirs.push(name),
            Ok(_) => files.push(name),
            Err(_) => {}
        }
    }
    dirs.sort();
    files.sort();

    let indent = "  ".repeat(depth);
    for name in dirs {
        if lines.len() >= MAX_TREE_LINES {
            return;
        }
        lines.push(format!("{}{}/", indent, name));
        walk(&dir.join(&name), depth + 1, lines);
    }
    for name in files {
        if lines.len() >= MAX_TREE_LINES {
            return;
        }
        lines.push(format!("{}{}", indent, name));
    }
}

/// Concatenated memory-file contents, truncated to 2000 characters.
fn memory_excerpt(path: &Path) -> Option<String> {
    let mut parts = Vec::new();
    for name in MEMORY_FILES {
        if let Ok(content) = std::fs::read_to_string(path.join(name)) {
            let trimmed = content.trim();
            if !trimmed.is_empty() {
                parts.push(trimmed.to_string());
            }
        }
    }
    if parts.is_empty() {
        return None;
    }
    let joined = parts.join("\n\n");
    Some(joined.chars().take(MAX_MEMORY_CHARS).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_enrich_plain_directory() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir(dir.path().join("src")).unwrap();
        std::fs::create_dir(dir.path().join("node_modules")).unwrap();
        std::fs::write(dir.path().join("src/main.rs"), "fn main() {}").unwrap();
        std::fs::write(dir.path().join("README.md"), "# hi").unwrap();

        let info = enrich_project(dir.path());

        assert_eq!(info.path, dir.path());
        assert!(info.name.is_some());
        let tree = info.tree.unwrap();
        assert!(tree.contains("src/"));
        assert!(tree.contains("  main.rs"));
        assert!(tree.contains("README.md"));
        assert!(!tree.contains("node_modules"));
        // not a git repository: collectors contribute nothing
        assert!(info.git_branch.is_none() || !info.git_branch.as_ref().unwrap().is_empty());
    }

    #[test]
    fn test_package_json_name_wins() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join("package.json"),
            r#"{"name": "express-api", "version": "1.0.0"}"#,
        )
        .unwrap();
        let info = enrich_project(dir.path());
        assert_eq!(info.name.as_deref(), Some("express-api"));
    }

    #[test]
    fn test_memory_excerpt_truncates() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("CLAUDE.md"), "m".repeat(3000)).unwrap();
        let info = enrich_project(dir.path());
        assert_eq!(info.memory.unwrap().chars().count(), 2000);
    }

    #[test]
    fn test_memory_concatenates_both_files() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir(dir.path().join(".claude")).unwrap();
        std::fs::write(dir.path().join("CLAUDE.md"), "root memory").unwrap();
        std::fs::write(dir.path().join(".claude/CLAUDE.md"), "nested memory").unwrap();
        let info = enrich_project(dir.path());
        let memory = info.memory.unwrap();
        assert!(memory.contains("root memory"));
        assert!(memory.contains("nested memory"));
    }

    #[test]
    fn test_tree_caps_at_forty_lines() {
        let dir = TempDir::new().unwrap();
        for i in 0..60 {
            std::fs::write(dir.path().join(format!("file-{:02}.txt", i)), "x").unwrap();
        }
        let info = enrich_project(dir.path());
        assert_eq!(info.tree.unwrap().lines().count(), 40);
    }
}
