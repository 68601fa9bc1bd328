//! Watcher lifecycle tests with a scripted adapter.
//!
//! The singleton rule is process-wide, so every lifecycle assertion lives in
//! one test function; the event rules themselves are covered by unit tests
//! on the diff core.

use braindump_core::adapters::Adapter;
use braindump_core::types::{Agent, CapturedSession, SessionInfo};
use braindump_core::watch::{WatchEventKind, WatchOptions, Watcher};
use braindump_core::{Error, Result};
use std::collections::VecDeque;
use std::path::Path;
use std::sync::mpsc;
use std::sync::Mutex;
use std::time::Duration;

/// Adapter whose listings are played back from a script; the last frame
/// repeats once the script runs out.
struct ScriptedAdapter {
    frames: Mutex<VecDeque<Vec<SessionInfo>>>,
    last: Mutex<Vec<SessionInfo>>,
}

impl ScriptedAdapter {
    fn new(frames: Vec<Vec<SessionInfo>>) -> Self {
        Self {
            frames: Mutex::new(frames.into()),
            last: Mutex::new(Vec::new()),
        }
    }
}

fn info(id: &str, count: usize) -> SessionInfo {
    SessionInfo {
        id: id.to_string(),
        started_at: None,
        last_active_at: None,
        message_count: Some(count),
        project_path: None,
        preview: None,
    }
}

impl Adapter for ScriptedAdapter {
    fn agent(&self) -> Agent {
        Agent::ClaudeCode
    }

    fn detect(&self) -> bool {
        true
    }

    fn list_sessions(&self, _project: Option<&Path>) -> Result<Vec<SessionInfo>> {
        let mut frames = self.frames.lock().unwrap();
        match frames.pop_front() {
            Some(frame) => {
                *self.last.lock().unwrap() = frame.clone();
                Ok(frame)
            }
            None => Ok(self.last.lock().unwrap().clone()),
        }
    }

    fn capture(&self, session_id: &str) -> Result<CapturedSession> {
        Err(Error::SessionNotFound(session_id.to_string()))
    }
}

#[test]
fn test_watcher_lifecycle_singleton_and_events() {
    let script = vec![
        vec![info("sess-A", 3)],  // tick 1: new-session
        vec![info("sess-A", 3)],  // tick 2: stall -> rate-limit
        vec![info("sess-A", 3)],  // tick 3: stall already reported
        vec![info("sess-A", 5)],  // tick 4: growth -> session-update
    ];
    let adapter: Box<dyn Adapter> = Box::new(ScriptedAdapter::new(script));

    let (tx, rx) = mpsc::channel();
    let options = WatchOptions {
        interval: Duration::from_millis(30),
        ..Default::default()
    };

    let mut watcher = Watcher::start_with_adapters(options.clone(), vec![adapter], move |event| {
        let _ = tx.send(event);
    })
    .expect("first start succeeds");

    // second start without an intervening stop is refused
    let second = Watcher::start_with_adapters(
        options.clone(),
        vec![Box::new(ScriptedAdapter::new(vec![]))],
        |_| {},
    );
    assert!(matches!(second, Err(Error::AlreadyRunning)));

    // collect the scripted episode
    let mut kinds = Vec::new();
    let deadline = std::time::Instant::now() + Duration::from_secs(3);
    while kinds.len() < 3 && std::time::Instant::now() < deadline {
        if let Ok(event) = rx.recv_timeout(Duration::from_millis(200)) {
            kinds.push(event.kind);
        }
    }
    assert_eq!(
        kinds,
        vec![
            WatchEventKind::NewSession,
            WatchEventKind::RateLimit,
            WatchEventKind::SessionUpdate,
        ]
    );

    let state = watcher.get_state();
    assert!(state.running);
    assert_eq!(state.agents, vec![Agent::ClaudeCode]);
    assert!(state.active_sessions.contains_key("claude-code:sess-A"));

    watcher.stop();

    // the slot is free again after stop
    let mut third = Watcher::start_with_adapters(
        options,
        vec![Box::new(ScriptedAdapter::new(vec![vec![info("sess-B", 1)]]))],
        |_| {},
    )
    .expect("restart after stop succeeds");
    third.stop();
}
