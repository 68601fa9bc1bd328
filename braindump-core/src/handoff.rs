//! Handoff pipeline orchestration
//!
//! Wires the stages together for one invocation: resolve the source agent
//! (explicit or detected), capture the session, compress under the target's
//! budget, assemble the prompt, and write the output artifacts under
//! `<project>/.handoff/`.

use crate::adapters::{self, Adapter};
use crate::compress;
use crate::config::AgentOverrides;
use crate::error::Result;
use crate::prompt;
use crate::types::{Agent, CapturedSession};
use std::path::{Path, PathBuf};

/// Directory the output artifacts land in, relative to the project root.
pub const HANDOFF_DIR: &str = ".handoff";
/// The handoff document.
pub const RESUME_FILE: &str = "RESUME.md";
/// The serialized canonical record.
pub const SESSION_FILE: &str = "session.json";

/// Options for one handoff run.
#[derive(Debug, Clone)]
pub struct HandoffOptions {
    /// Source agent; detected when absent
    pub source: Option<Agent>,
    /// Target identifier: an agent id, `"file"`, or `"clipboard"`
    pub target: String,
    /// Session to capture; latest when absent
    pub session_id: Option<String>,
    /// Project filter for session selection
    pub project: Option<PathBuf>,
    /// Explicit token budget, overriding the registry
    pub token_budget: Option<usize>,
    /// Explicit output path, overriding `<project>/.handoff/RESUME.md`
    pub output: Option<PathBuf>,
    /// Build everything but write nothing
    pub dry_run: bool,
    /// Configured agent storage-root overrides
    pub overrides: AgentOverrides,
}

impl Default for HandoffOptions {
    fn default() -> Self {
        Self {
            source: None,
            target: "file".to_string(),
            session_id: None,
            project: None,
            token_budget: None,
            output: None,
            dry_run: false,
            overrides: AgentOverrides::default(),
        }
    }
}

/// Outcome of a handoff run.
#[derive(Debug)]
pub struct HandoffReport {
    pub session: CapturedSession,
    pub prompt: String,
    pub included_layers: Vec<&'static str>,
    pub dropped_layers: Vec<&'static str>,
    pub total_tokens: usize,
    pub budget: usize,
    pub output_path: PathBuf,
    /// False on dry runs
    pub written: bool,
}

/// Resolve an adapter for the requested (or detected) source, honoring
/// configured storage-root overrides.
pub fn resolve_adapter(
    source: Option<Agent>,
    overrides: &AgentOverrides,
) -> Result<Box<dyn Adapter>> {
    let agent = match source {
        Some(agent) => agent,
        None => adapters::detect_source(overrides)?,
    };
    Ok(adapters::adapter_for_with_overrides(agent, overrides))
}

/// Capture one session: by id when given, the latest otherwise.
pub fn capture_session(
    source: Option<Agent>,
    session_id: Option<&str>,
    project: Option<&Path>,
    overrides: &AgentOverrides,
) -> Result<CapturedSession> {
    let adapter = resolve_adapter(source, overrides)?;
    match session_id {
        Some(id) => adapter.capture(id),
        None => adapter.capture_latest(project),
    }
}

/// Write the serialized canonical record to `<project>/.handoff/session.json`.
pub fn write_session_json(session: &CapturedSession) -> Result<PathBuf> {
    let dir = session.project.path.join(HANDOFF_DIR);
    std::fs::create_dir_all(&dir)?;
    let path = dir.join(SESSION_FILE);
    let json = serde_json::to_string_pretty(session)?;
    std::fs::write(&path, json)?;
    tracing::info!(path = %path.display(), "wrote canonical session record");
    Ok(path)
}

/// Run the full handoff pipeline.
pub fn run(options: HandoffOptions) -> Result<HandoffReport> {
    let session = capture_session(
        options.source,
        options.session_id.as_deref(),
        options.project.as_deref(),
        &options.overrides,
    )?;

    let result = compress::compress_for_target(&session, &options.target, options.token_budget);
    let document = prompt::assemble(&session, &result, &options.target);

    let output_path = options
        .output
        .clone()
        .unwrap_or_else(|| session.project.path.join(HANDOFF_DIR).join(RESUME_FILE));

    let written = if options.dry_run {
        false
    } else {
        if let Some(parent) = output_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&output_path, &document)?;
        tracing::info!(
            path = %output_path.display(),
            tokens = result.total_tokens,
            "wrote handoff document"
        );
        true
    };

    Ok(HandoffReport {
        included_layers: result.included_names(),
        dropped_layers: result.dropped.clone(),
        total_tokens: result.total_tokens,
        budget: result.budget,
        session,
        prompt: document,
        output_path,
        written,
    })
}
