//! Error types for braindump-core

use thiserror::Error;

/// Main error type for the braindump-core library
#[derive(Error, Debug)]
pub enum Error {
    /// No agent storage could be detected on this machine
    #[error("no agent sessions detected: {0}")]
    NotDetected(String),

    /// The (possibly filtered) session list was empty
    #[error("no sessions found for {0}")]
    NoSessions(String),

    /// A session with the requested identifier does not exist
    #[error("session not found: {0}")]
    SessionNotFound(String),

    /// The session's primary artifact could not be read or decoded
    #[error("parse failure in {agent} session: {message}")]
    ParseFailure { agent: String, message: String },

    /// A captured session failed schema validation
    #[error("captured session is invalid: {0}")]
    SchemaInvalid(String),

    /// A second watcher start without an intervening stop
    #[error("watcher is already running")]
    AlreadyRunning,

    /// Target tool could not be launched
    #[error("launch failed: {0}")]
    Launch(String),

    /// Database error (Cursor / OpenCode stores)
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),
}

/// Result type alias for braindump-core
pub type Result<T> = std::result::Result<T, Error>;
