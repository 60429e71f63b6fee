use crate::process::is_process_alive;
use crate::store::{SessionId, SessionStore};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

pub const DEFAULT_WAIT_POLL_INTERVAL: Duration = Duration::from_secs(2);
pub const DEFAULT_WAIT_TIMEOUT: Duration = Duration::from_secs(600);

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Running,
    Done,
    NotFound,
}

/// Backend-agnostic view of one session.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SessionStatus {
    pub state: SessionState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pid: Option<u32>,
    pub log: String,
}

/// Reads the pid marker and probes the process. Never writes anything.
pub fn session_status(store: &SessionStore, session_id: &SessionId) -> SessionStatus {
    let log = store.display_path(&store.paths_for(session_id).log);
    if !store.has_pid_marker(session_id) {
        return SessionStatus {
            state: SessionState::NotFound,
            pid: None,
            log,
        };
    }

    let pid = store.read_pid(session_id);
    let state = match pid {
        Some(pid) if is_process_alive(pid) => SessionState::Running,
        Some(_) => SessionState::Done,
        None => {
            tracing::warn!(session_id = %session_id, "pid marker is unreadable; reporting done");
            SessionState::Done
        }
    };
    SessionStatus { state, pid, log }
}

pub fn snapshot(
    store: &SessionStore,
    session_ids: &[SessionId],
) -> BTreeMap<SessionId, SessionStatus> {
    session_ids
        .iter()
        .map(|id| (id.clone(), session_status(store, id)))
        .collect()
}

/// Polls until at least one session is done, or nothing is left running,
/// or `timeout` elapses. Always returns the status of every queried session.
pub async fn wait_for_any(
    store: &SessionStore,
    session_ids: &[SessionId],
    poll_interval: Duration,
    timeout: Duration,
) -> BTreeMap<SessionId, SessionStatus> {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        let statuses = snapshot(store, session_ids);
        let any_done = statuses.values().any(|s| s.state == SessionState::Done);
        let any_running = statuses.values().any(|s| s.state == SessionState::Running);
        if any_done || !any_running {
            return statuses;
        }

        let now = tokio::time::Instant::now();
        if now >= deadline {
            tracing::info!(
                sessions = session_ids.len(),
                timeout_secs = timeout.as_secs(),
                "Wait timed out with every session still running"
            );
            return statuses;
        }
        tokio::time::sleep(poll_interval.min(deadline - now)).await;
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
