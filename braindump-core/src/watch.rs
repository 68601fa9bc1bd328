//! Session watcher
//!
//! Polls the list operation of each watched adapter on a timer and diffs
//! successive snapshots into events: `new-session` on first observation of a
//! `(agent, sessionId)` key, `session-update` when its message count grows,
//! and `rate-limit` when a session has stopped advancing for two consecutive
//! observations (at most once per stall episode, reset on growth).
//!
//! The watcher is a per-process singleton: a second `start` without an
//! intervening `stop` fails with [`Error::AlreadyRunning`]. Cancellation is
//! cooperative: the tick in progress completes, and `stop` returns after the
//! polling thread has been joined.

use crate::adapters::{self, Adapter};
use crate::config::AgentOverrides;
use crate::error::{Error, Result};
use crate::types::{Agent, SessionInfo};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

/// Default polling interval.
pub const DEFAULT_INTERVAL: Duration = Duration::from_millis(30_000);

/// Consecutive unchanged observations before a stall is reported.
const STALL_OBSERVATIONS: u32 = 2;

/// Process-wide ownership flag backing the singleton rule.
static WATCHER_ACTIVE: AtomicBool = AtomicBool::new(false);

/// Options for starting the watcher.
#[derive(Debug, Clone)]
pub struct WatchOptions {
    /// Agents to watch; defaults to every adapter whose `detect` returns true
    pub agents: Option<Vec<Agent>>,
    /// Polling interval
    pub interval: Duration,
    /// Restrict listings to sessions recorded in this project
    pub project: Option<PathBuf>,
    /// Configured agent storage-root overrides
    pub overrides: AgentOverrides,
}

impl Default for WatchOptions {
    fn default() -> Self {
        Self {
            agents: None,
            interval: DEFAULT_INTERVAL,
            project: None,
            overrides: AgentOverrides::default(),
        }
    }
}

/// Kinds of watcher events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum WatchEventKind {
    NewSession,
    SessionUpdate,
    RateLimit,
}

/// One observed change in an agent's session list.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WatchEvent {
    pub kind: WatchEventKind,
    pub agent: Agent,
    pub session_id: String,
    pub message_count: Option<usize>,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

/// Per-session snapshot state.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionState {
    pub message_count: Option<usize>,
    pub last_checked_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_changed_at: Option<DateTime<Utc>>,
    /// Consecutive observations with an unchanged message count
    #[serde(skip)]
    stable_observations: u32,
    /// A stall has already been reported for this episode
    #[serde(skip)]
    rate_limited: bool,
}

/// Public view of the watcher's state.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WatcherState {
    pub timestamp: DateTime<Utc>,
    pub agents: Vec<Agent>,
    /// Keyed by `"<agent>:<sessionId>"`
    pub active_sessions: BTreeMap<String, SessionState>,
    pub running: bool,
}

/// One agent's listing for a tick; `None` means the listing failed and the
/// agent's previous entries are carried forward unchanged.
pub type TickListing = (Agent, Option<Vec<SessionInfo>>);

/// Snapshot-diffing core, independent of the polling thread so the event
/// rules are directly testable.
#[derive(Debug, Default)]
pub struct WatchCore {
    previous: BTreeMap<(Agent, String), SessionState>,
}

impl WatchCore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one tick's listings into the snapshot, emitting events for keys
    /// that appeared, grew, or stalled.
    pub fn observe(&mut self, listings: &[TickListing], now: DateTime<Utc>) -> Vec<WatchEvent> {
        let mut current: BTreeMap<(Agent, String), SessionState> = BTreeMap::new();
        let mut events = Vec::new();

        for (agent, listing) in listings {
            let Some(sessions) = listing else {
                // Failed listing: keep what we knew, count no observation.
                for ((a, id), state) in &self.previous {
                    if a == agent {
                        current.insert((*a, id.clone()), state.clone());
                    }
                }
                continue;
            };

            for info in sessions {
                let key = (*agent, info.id.clone());
                match self.previous.get(&key) {
                    None => {
                        events.push(WatchEvent {
                            kind: WatchEventKind::NewSession,
                            agent: *agent,
                            session_id: info.id.clone(),
                            message_count: info.message_count,
                            timestamp: now,
                            details: None,
                        });
                        current.insert(
                            key,
                            SessionState {
                                message_count: info.message_count,
                                last_checked_at: now,
                                last_changed_at: Some(now),
                                stable_observations: 1,
                                rate_limited: false,
                            },
                        );
                    }
                    Some(prev) => {
                        let grew = matches!(
                            (prev.message_count, info.message_count),
                            (Some(p), Some(c)) if c > p
                        );
                        if grew {
                            events.push(WatchEvent {
                                kind: WatchEventKind::SessionUpdate,
                                agent: *agent,
                                session_id: info.id.clone(),
                                message_count: info.message_count,
                                timestamp: now,
                                details: None,
                            });
                            current.insert(
                                key,
                                SessionState {
                                    message_count: info.message_count,
                                    last_checked_at: now,
                                    last_changed_at: Some(now),
                                    stable_observations: 1,
                                    rate_limited: false,
                                },
                            );
                        } else {
                            let stable_observations = prev.stable_observations.saturating_add(1);
                            let mut rate_limited = prev.rate_limited;
                            if stable_observations >= STALL_OBSERVATIONS && !rate_limited {
                                events.push(WatchEvent {
                                    kind: WatchEventKind::RateLimit,
                                    agent: *agent,
                                    session_id: info.id.clone(),
                                    message_count: info.message_count,
                                    timestamp: now,
                                    details: Some(format!(
                                        "no new messages for {} consecutive checks; the agent may \
                                         be rate-limited or waiting on input",
                                        stable_observations
                                    )),
                                });
                                rate_limited = true;
                            }
                            current.insert(
                                key,
                                SessionState {
                                    message_count: info.message_count.or(prev.message_count),
                                    last_checked_at: now,
                                    last_changed_at: prev.last_changed_at,
                                    stable_observations,
                                    rate_limited,
                                },
                            );
                        }
                    }
                }
            }
        }

        self.previous = current;
        events
    }

    fn snapshot(&self) -> BTreeMap<String, SessionState> {
        self.previous
            .iter()
            .map(|((agent, id), state)| (format!("{}:{}", agent, id), state.clone()))
            .collect()
    }
}

struct Shared {
    stop: AtomicBool,
    core: Mutex<WatchCore>,
    agents: Vec<Agent>,
}

/// Handle to the running watcher. Dropping it stops the polling thread and
/// releases the singleton slot.
pub struct Watcher {
    shared: Arc<Shared>,
    handle: Option<JoinHandle<()>>,
}

impl Watcher {
    /// Start watching. Fails with [`Error::AlreadyRunning`] when another
    /// watcher is active in this process.
    pub fn start<F>(options: WatchOptions, on_event: F) -> Result<Watcher>
    where
        F: Fn(WatchEvent) + Send + 'static,
    {
        let adapters = resolve_adapters(&options);
        Self::start_with_adapters(options, adapters, on_event)
    }

    /// Start with explicit adapters; tests inject fakes through this.
    pub fn start_with_adapters<F>(
        options: WatchOptions,
        adapters: Vec<Box<dyn Adapter>>,
        on_event: F,
    ) -> Result<Watcher>
    where
        F: Fn(WatchEvent) + Send + 'static,
    {
        if WATCHER_ACTIVE
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(Error::AlreadyRunning);
        }

        let shared = Arc::new(Shared {
            stop: AtomicBool::new(false),
            core: Mutex::new(WatchCore::new()),
            agents: adapters.iter().map(|a| a.agent()).collect(),
        });

        let thread_shared = Arc::clone(&shared);
        let project = options.project.clone();
        let interval = options.interval;

        let handle = std::thread::spawn(move || {
            tracing::info!(agents = ?thread_shared.agents, "watcher started");
            loop {
                let listings = list_all(&adapters, project.as_deref());
                let events = {
                    let mut core = thread_shared.core.lock().expect("watcher state poisoned");
                    core.observe(&listings, Utc::now())
                };
                for event in events {
                    on_event(event);
                }

                // Sleep in short steps so stop() stays responsive.
                let mut waited = Duration::ZERO;
                let step = Duration::from_millis(100);
                while waited < interval {
                    if thread_shared.stop.load(Ordering::SeqCst) {
                        tracing::info!("watcher stopping");
                        return;
                    }
                    std::thread::sleep(step.min(interval - waited));
                    waited += step;
                }
                if thread_shared.stop.load(Ordering::SeqCst) {
                    tracing::info!("watcher stopping");
                    return;
                }
            }
        });

        Ok(Watcher {
            shared,
            handle: Some(handle),
        })
    }

    /// Stop the watcher: the tick in progress completes, the polling thread
    /// is joined, and the singleton slot is released.
    pub fn stop(&mut self) {
        self.shared.stop.store(true, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
            WATCHER_ACTIVE.store(false, Ordering::SeqCst);
        }
    }

    /// Current watcher state.
    pub fn get_state(&self) -> WatcherState {
        let core = self.shared.core.lock().expect("watcher state poisoned");
        WatcherState {
            timestamp: Utc::now(),
            agents: self.shared.agents.clone(),
            active_sessions: core.snapshot(),
            running: self.handle.is_some() && !self.shared.stop.load(Ordering::SeqCst),
        }
    }
}

impl Drop for Watcher {
    fn drop(&mut self) {
        self.stop();
    }
}

fn resolve_adapters(options: &WatchOptions) -> Vec<Box<dyn Adapter>> {
    match options.agents {
        Some(ref agents) => agents
            .iter()
            .map(|&a| adapters::adapter_for_with_overrides(a, &options.overrides))
            .collect(),
        None => adapters::create_adapters_with_overrides(&options.overrides)
            .into_iter()
            .filter(|a| a.detect())
            .collect(),
    }
}

fn list_all(adapters: &[Box<dyn Adapter>], project: Option<&std::path::Path>) -> Vec<TickListing> {
    adapters
        .iter()
        .map(|adapter| {
            let listing = match adapter.list_sessions(project) {
                Ok(sessions) => Some(sessions),
                Err(e) => {
                    tracing::warn!(agent = %adapter.agent(), error = %e, "watcher tick listing failed");
                    None
                }
            };
            (adapter.agent(), listing)
        })
        .collect()
}

/// One-shot snapshot of the watched agents' session lists. Safe to call
/// whether a watcher is running or idle.
pub fn take_snapshot(options: &WatchOptions) -> WatcherState {
    let adapters = resolve_adapters(options);
    let listings = list_all(&adapters, options.project.as_deref());
    let mut core = WatchCore::new();
    core.observe(&listings, Utc::now());
    WatcherState {
        timestamp: Utc::now(),
        agents: adapters.iter().map(|a| a.agent()).collect(),
        active_sessions: core.snapshot(),
        running: false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

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

    fn tick(core: &mut WatchCore, sessions: Vec<SessionInfo>) -> Vec<WatchEvent> {
        core.observe(&[(Agent::ClaudeCode, Some(sessions))], Utc::now())
    }

    #[test]
    fn test_new_session_emitted_exactly_once() {
        let mut core = WatchCore::new();
        let events = tick(&mut core, vec![info("sess-A", 3)]);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, WatchEventKind::NewSession);

        let events = tick(&mut core, vec![info("sess-A", 4)]);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, WatchEventKind::SessionUpdate);
    }

    #[test]
    fn test_rate_limit_fires_once_per_stall_episode() {
        let mut core = WatchCore::new();

        // tick 1: first observation
        let events = tick(&mut core, vec![info("sess-A", 5)]);
        assert_eq!(events[0].kind, WatchEventKind::NewSession);

        // tick 2: second consecutive unchanged observation -> rate-limit
        let events = tick(&mut core, vec![info("sess-A", 5)]);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, WatchEventKind::RateLimit);
        assert!(events[0].details.is_some());

        // tick 3: still stalled, already reported
        let events = tick(&mut core, vec![info("sess-A", 5)]);
        assert!(events.is_empty());

        // tick 4: growth resets the episode
        let events = tick(&mut core, vec![info("sess-A", 6)]);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, WatchEventKind::SessionUpdate);

        // a new stall episode reports again
        let events = tick(&mut core, vec![info("sess-A", 6)]);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, WatchEventKind::RateLimit);
    }

    #[test]
    fn test_failed_listing_carries_previous_entries() {
        let mut core = WatchCore::new();
        tick(&mut core, vec![info("sess-A", 2)]);

        // listing failure: no events, no forgotten sessions
        let events = core.observe(&[(Agent::ClaudeCode, None)], Utc::now());
        assert!(events.is_empty());

        // recovery does not re-announce the session
        let events = tick(&mut core, vec![info("sess-A", 2)]);
        assert!(events.iter().all(|e| e.kind != WatchEventKind::NewSession));
    }

    #[test]
    fn test_events_keyed_per_agent() {
        let mut core = WatchCore::new();
        let events = core.observe(
            &[
                (Agent::ClaudeCode, Some(vec![info("sess-A", 1)])),
                (Agent::Droid, Some(vec![info("sess-A", 1)])),
            ],
            Utc::now(),
        );
        assert_eq!(events.len(), 2);
        assert!(events.iter().all(|e| e.kind == WatchEventKind::NewSession));
    }

    #[test]
    fn test_snapshot_keys_are_composite() {
        let mut core = WatchCore::new();
        tick(&mut core, vec![info("sess-A", 1)]);
        let snapshot = core.snapshot();
        assert!(snapshot.contains_key("claude-code:sess-A"));
    }
}
