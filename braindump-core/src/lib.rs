//! # braindump-core
//!
//! Core library for braindump - capture an in-progress coding-agent session
//! from its on-disk storage and distill it into a token-budgeted handoff
//! document another agent can resume from.
//!
//! This library provides:
//! - Adapters that read seven heterogeneous on-disk session formats and
//!   normalize each into a canonical [`CapturedSession`]
//! - Heuristic conversation analysis (task, decisions, blockers)
//! - Project enrichment (git, directory skeleton, memory files)
//! - Priority-layered compression under a token budget
//! - Handoff prompt assembly with a target-specific footer
//! - A polling watcher that diffs session lists into events
//!
//! ## Architecture
//!
//! Data flows through one pipeline per handoff:
//!
//! ```text
//! agent storage ──► adapter capture ──► validation ──► compression ──► prompt
//!                        │
//!                        ├─ conversation analyzer
//!                        └─ project enricher
//! ```
//!
//! The watcher runs independently, invoking only the list operation of each
//! adapter on a timer.
//!
//! ## Example
//!
//! ```rust,no_run
//! use braindump_core::handoff::{self, HandoffOptions};
//!
//! let report = handoff::run(HandoffOptions {
//!     target: "claude-code".to_string(),
//!     ..Default::default()
//! }).expect("handoff failed");
//! println!("wrote {}", report.output_path.display());
//! ```

// Re-export commonly used items at the crate root
pub use config::Config;
pub use error::{Error, Result};
pub use types::*;

// Public modules
pub mod adapters;
pub mod analyze;
pub mod compress;
pub mod config;
pub mod enrich;
pub mod error;
pub mod handoff;
pub mod logging;
pub mod prompt;
pub mod registry;
pub mod tokens;
pub mod types;
pub mod validate;
pub mod watch;
